//! Bibliographic source abstraction
//!
//! Three idempotent reads against a paper-search and citation API:
//! - Title search (top hit only)
//! - Papers citing a paper
//! - Papers cited by a paper
//!
//! Implementations make exactly one attempt per call. The upstream is
//! rate-limited, so failures surface as
//! [`AppError::ServiceUnavailable`](citegraph_common::AppError) and are
//! never retried here.

mod fixture;
mod semantic_scholar;

pub use fixture::StaticBibliography;
pub use semantic_scholar::SemanticScholarClient;

use async_trait::async_trait;
use citegraph_common::{PaperRecord, Result};

/// Fields requested for every paper record
pub const PAPER_FIELDS: &str = "title,citationCount,influentialCitationCount,fieldsOfStudy";

/// Trait for bibliographic lookups
#[async_trait]
pub trait BibliographicSource: Send + Sync {
    /// Closest search hit for a title, if any
    async fn search_by_title(&self, title: &str) -> Result<Option<PaperRecord>>;

    /// Papers citing `paper_id`, capped at the configured page size
    async fn fetch_citations(&self, paper_id: &str) -> Result<Vec<PaperRecord>>;

    /// Papers cited by `paper_id`, capped at the configured page size
    async fn fetch_references(&self, paper_id: &str) -> Result<Vec<PaperRecord>>;
}
