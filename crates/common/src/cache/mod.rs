//! Depth cache
//!
//! Provides:
//! - Per-paper, per-depth storage of built graphs
//! - Additive, first-write-wins merge into stored entries
//! - An in-memory implementation living for the process lifetime
//!
//! There is no eviction and no TTL: a session explores a bounded
//! neighbourhood and the cache only grows with distinct papers visited.

use crate::errors::{AppError, Result};
use crate::metrics;
use crate::models::GraphData;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use tracing::debug;

/// Traversal depth (number of citation/reference hops from the root)
pub type Depth = u32;

/// Cache occupancy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub papers: usize,
    pub entries: usize,
}

/// Storage of built graphs keyed by root paper and depth
#[async_trait]
pub trait DepthCache: Send + Sync {
    /// Whether a completed build for `(paper_id, depth)` is stored
    async fn has(&self, paper_id: &str, depth: Depth) -> bool;

    /// Stored graph for `(paper_id, depth)`.
    ///
    /// Calling this for an absent key is a programming error and returns
    /// [`AppError::CacheMisuse`].
    async fn get(&self, paper_id: &str, depth: Depth) -> Result<GraphData>;

    /// Unconditionally store `data`
    async fn set(&self, paper_id: &str, depth: Depth, data: GraphData);

    /// Append the nodes and links of `delta` that the stored entry lacks,
    /// starting from an empty entry if the key is absent. Returns how many
    /// were added.
    async fn merge(&self, paper_id: &str, depth: Depth, delta: GraphData) -> usize;

    /// Cached depths for a paper, ascending
    async fn depths(&self, paper_id: &str) -> Vec<Depth>;

    async fn stats(&self) -> CacheStats;
}

/// Process-wide in-memory depth cache
#[derive(Default)]
pub struct InMemoryDepthCache {
    entries: RwLock<HashMap<String, BTreeMap<Depth, GraphData>>>,
}

impl InMemoryDepthCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DepthCache for InMemoryDepthCache {
    async fn has(&self, paper_id: &str, depth: Depth) -> bool {
        let entries = self.entries.read().await;
        let hit = entries
            .get(paper_id)
            .is_some_and(|by_depth| by_depth.contains_key(&depth));

        metrics::record_cache(hit, "depth");
        debug!(paper_id, depth, hit, "Depth cache lookup");
        hit
    }

    async fn get(&self, paper_id: &str, depth: Depth) -> Result<GraphData> {
        let entries = self.entries.read().await;
        entries
            .get(paper_id)
            .and_then(|by_depth| by_depth.get(&depth))
            .cloned()
            .ok_or_else(|| AppError::CacheMisuse {
                paper_id: paper_id.to_string(),
                depth,
            })
    }

    async fn set(&self, paper_id: &str, depth: Depth, data: GraphData) {
        let mut entries = self.entries.write().await;
        debug!(
            paper_id,
            depth,
            nodes = data.node_count(),
            links = data.link_count(),
            "Depth cache set"
        );
        entries
            .entry(paper_id.to_string())
            .or_default()
            .insert(depth, data);
    }

    async fn merge(&self, paper_id: &str, depth: Depth, delta: GraphData) -> usize {
        let mut entries = self.entries.write().await;
        let by_depth = entries.entry(paper_id.to_string()).or_default();

        let added = by_depth.entry(depth).or_default().absorb(delta);

        debug!(paper_id, depth, added, "Depth cache merge");
        added
    }

    async fn depths(&self, paper_id: &str) -> Vec<Depth> {
        let entries = self.entries.read().await;
        entries
            .get(paper_id)
            .map(|by_depth| by_depth.keys().copied().collect())
            .unwrap_or_default()
    }

    async fn stats(&self) -> CacheStats {
        let entries = self.entries.read().await;
        CacheStats {
            papers: entries.len(),
            entries: entries.values().map(BTreeMap::len).sum(),
        }
    }
}
