//! In-memory bibliographic source for tests and offline sessions

use super::BibliographicSource;
use async_trait::async_trait;
use citegraph_common::errors::{AppError, Result};
use citegraph_common::PaperRecord;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Fixed answers keyed by query title and paper id.
///
/// Unknown queries and ids answer with no results. Papers marked with
/// [`StaticBibliography::failing`] answer citation and reference fetches
/// with `ServiceUnavailable`.
#[derive(Default)]
pub struct StaticBibliography {
    search: HashMap<String, PaperRecord>,
    citations: HashMap<String, Vec<PaperRecord>>,
    references: HashMap<String, Vec<PaperRecord>>,
    failing: HashSet<String>,
    calls: AtomicUsize,
}

impl StaticBibliography {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `query` with `hit`
    pub fn with_search_hit(mut self, query: &str, hit: PaperRecord) -> Self {
        self.search.insert(query.to_string(), hit);
        self
    }

    pub fn with_citations(mut self, paper_id: &str, citing: Vec<PaperRecord>) -> Self {
        self.citations.insert(paper_id.to_string(), citing);
        self
    }

    pub fn with_references(mut self, paper_id: &str, cited: Vec<PaperRecord>) -> Self {
        self.references.insert(paper_id.to_string(), cited);
        self
    }

    pub fn failing(mut self, paper_id: &str) -> Self {
        self.failing.insert(paper_id.to_string());
        self
    }

    /// Number of lookups served so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn lookup(&self, table: &HashMap<String, Vec<PaperRecord>>, paper_id: &str) -> Result<Vec<PaperRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(paper_id) {
            return Err(AppError::ServiceUnavailable {
                message: format!("fixture failure for {}", paper_id),
            });
        }
        Ok(table.get(paper_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl BibliographicSource for StaticBibliography {
    async fn search_by_title(&self, title: &str) -> Result<Option<PaperRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.search.get(title).cloned())
    }

    async fn fetch_citations(&self, paper_id: &str) -> Result<Vec<PaperRecord>> {
        self.lookup(&self.citations, paper_id)
    }

    async fn fetch_references(&self, paper_id: &str) -> Result<Vec<PaperRecord>> {
        self.lookup(&self.references, paper_id)
    }
}
