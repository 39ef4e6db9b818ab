//! Graph builder
//!
//! Resolves the open document to a bibliographic record, builds the depth-1
//! graph around it, and moves the live graph between depths:
//! - Shrinking rebuilds upward from the cached depth-1 graph
//! - Growing into cached depths replays them one depth at a time
//! - Growing past the cache expands the frontier from the API
//!
//! Shrinking never removes nodes incrementally. Cached depths are
//! cumulative, so resetting to depth 1 and replaying up to the target
//! depth yields exactly the target graph.

mod expansion;

use crate::bibliography::BibliographicSource;
use crate::document::Document;
use crate::similarity::TitleMatcher;
use crate::sink::{LiveGraph, RevealToken};
use citegraph_common::cache::{Depth, DepthCache};
use citegraph_common::config::GraphConfig;
use citegraph_common::errors::{AppError, Result};
use citegraph_common::{metrics, GraphData, PaperRecord, ROOT_DEPTH};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, instrument, warn};

/// The paper matching the open document and its depth-1 graph
#[derive(Debug, Clone, Serialize)]
pub struct RootGraph {
    pub paper: PaperRecord,
    pub graph: GraphData,
    /// Served from the depth cache without any citation fetch
    pub cached: bool,
}

/// Result of [`GraphBuilder::change_depth`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DepthChange {
    /// Requested depth equals the displayed depth
    Unchanged,
    /// The live graph now shows `depth`
    Applied { depth: Depth, nodes: usize, links: usize },
    /// A newer depth change took over the live graph
    Superseded,
}

/// Builds citation graphs and keeps the live graph in step with the cache
pub struct GraphBuilder {
    source: Arc<dyn BibliographicSource>,
    cache: Arc<dyn DepthCache>,
    matcher: TitleMatcher,
    max_concurrent_fetches: usize,
    max_depth: Depth,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl GraphBuilder {
    pub fn new(
        source: Arc<dyn BibliographicSource>,
        cache: Arc<dyn DepthCache>,
        config: &GraphConfig,
    ) -> Self {
        Self {
            source,
            cache,
            matcher: TitleMatcher::new(config.similarity_threshold),
            max_concurrent_fetches: config.max_concurrent_fetches.max(1),
            max_depth: config.max_depth.max(ROOT_DEPTH),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn max_depth(&self) -> Depth {
        self.max_depth
    }

    /// Identify the document's paper and return its depth-1 graph.
    ///
    /// Fails with `TitleUnavailable` (before any network call) when the
    /// document declares no title, and with `NoConfidentMatch` when search
    /// finds nothing or finds a paper whose title is not similar enough.
    #[instrument(skip(self, document))]
    pub async fn resolve_root_graph(&self, document: &dyn Document) -> Result<RootGraph> {
        let title = document
            .metadata()
            .title
            .filter(|t| !t.trim().is_empty())
            .ok_or(AppError::TitleUnavailable)?;

        let paper = match self.source.search_by_title(&title).await? {
            Some(hit) if hit.has_id() && self.matcher.matches(&hit.title, &title) => hit,
            Some(hit) => {
                warn!(title = %title, candidate = %hit.title, "Search hit is not the same paper");
                return Err(AppError::NoConfidentMatch {
                    title,
                    candidate: Some(hit.title),
                });
            }
            None => {
                return Err(AppError::NoConfidentMatch {
                    title,
                    candidate: None,
                })
            }
        };

        let lock = self.paper_lock(&paper.paper_id);
        let _guard = lock.lock().await;

        if self.cache.has(&paper.paper_id, ROOT_DEPTH).await {
            let graph = self.cache.get(&paper.paper_id, ROOT_DEPTH).await?;
            return Ok(RootGraph {
                paper,
                graph,
                cached: true,
            });
        }

        let mut graph = GraphData::with_root(&paper);
        graph.absorb(self.fetch_neighbourhood(&paper.paper_id).await?);
        self.cache.set(&paper.paper_id, ROOT_DEPTH, graph.clone()).await;
        metrics::record_graph_build(ROOT_DEPTH);

        info!(
            paper_id = %paper.paper_id,
            nodes = graph.node_count(),
            links = graph.link_count(),
            "Root graph built"
        );

        Ok(RootGraph {
            paper,
            graph,
            cached: false,
        })
    }

    /// [`resolve_root_graph`](Self::resolve_root_graph) with the
    /// "no graph for this document" outcomes mapped to `None`
    pub async fn try_resolve_root_graph(&self, document: &dyn Document) -> Result<Option<RootGraph>> {
        match self.resolve_root_graph(document).await {
            Ok(root) => Ok(Some(root)),
            Err(e) if e.is_no_graph() => {
                info!(reason = %e, "No graph for document");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Move the live graph for `paper_id` from depth `old` to `selected`.
    ///
    /// Calls for the same paper run one at a time. Each call supersedes any
    /// reveal still running on `live`, including calls still waiting for
    /// their turn.
    #[instrument(skip(self, live))]
    pub async fn change_depth(
        &self,
        live: &LiveGraph,
        paper_id: &str,
        selected: Depth,
        old: Depth,
    ) -> Result<DepthChange> {
        self.check_depth(selected)?;
        if selected == old {
            return Ok(DepthChange::Unchanged);
        }
        self.change_depth_with(live, live.begin(), paper_id, selected).await
    }

    /// [`change_depth`](Self::change_depth) under a token the caller took
    /// when the change was requested, so changes take effect in request
    /// order however their tasks are scheduled.
    ///
    /// Starts from the depth `live` last settled on. When an earlier change
    /// was cut short the live graph is rebuilt from the root graph. On
    /// failure the live graph goes back to what it showed before the call.
    #[instrument(skip(self, live, token))]
    pub async fn change_depth_with(
        &self,
        live: &LiveGraph,
        token: RevealToken,
        paper_id: &str,
        selected: Depth,
    ) -> Result<DepthChange> {
        self.check_depth(selected)?;

        let lock = self.paper_lock(paper_id);
        let _guard = lock.lock().await;

        if !live.is_current(&token) {
            return Ok(DepthChange::Superseded);
        }

        let shown = live.depth();
        if shown == Some(selected) {
            return Ok(DepthChange::Unchanged);
        }

        let before = live.snapshot();
        live.settle(None, &token);
        let result = match shown {
            Some(old) => self.apply_depth(live, paper_id, selected, old, &token).await,
            None => self.rebuild(live, paper_id, selected, &token).await,
        };

        let current = match result {
            Ok(current) => current,
            Err(e) => {
                // Lower depths may already be revealed; put back what was shown
                if live.reset(before, &token) {
                    live.settle(shown, &token);
                    warn!(paper_id, to = selected, "Depth change failed, live graph restored");
                }
                return Err(e);
            }
        };

        if !current || !live.settle(Some(selected), &token) {
            info!(paper_id, selected, "Depth change superseded");
            return Ok(DepthChange::Superseded);
        }

        let graph = live.snapshot();
        info!(
            paper_id,
            from = ?shown,
            to = selected,
            nodes = graph.node_count(),
            "Depth change applied"
        );
        Ok(DepthChange::Applied {
            depth: selected,
            nodes: graph.node_count(),
            links: graph.link_count(),
        })
    }

    fn check_depth(&self, selected: Depth) -> Result<()> {
        if selected < ROOT_DEPTH || selected > self.max_depth {
            return Err(AppError::Validation {
                message: format!("depth must be between {} and {}", ROOT_DEPTH, self.max_depth),
                field: Some("depth".to_string()),
            });
        }
        Ok(())
    }

    async fn apply_depth(
        &self,
        live: &LiveGraph,
        paper_id: &str,
        selected: Depth,
        old: Depth,
        token: &RevealToken,
    ) -> Result<bool> {
        if selected < old {
            return self.shrink(live, paper_id, selected, token).await;
        }
        if self.cache.has(paper_id, selected).await {
            return self.replay(live, paper_id, old + 1, selected, token).await;
        }

        let current = self.expand(live, paper_id, selected, old, token).await?;
        if current {
            // The live graph is a subset of the built depth, so this only
            // ever adds what the reveal attached beyond the cache.
            self.cache.merge(paper_id, selected, live.snapshot()).await;
        }
        Ok(current)
    }

    /// Reset to the cached root graph, then grow to `selected`
    async fn rebuild(
        &self,
        live: &LiveGraph,
        paper_id: &str,
        selected: Depth,
        token: &RevealToken,
    ) -> Result<bool> {
        let base = self.cache.get(paper_id, ROOT_DEPTH).await?;
        if !live.reset(base, token) {
            return Ok(false);
        }
        self.apply_depth(live, paper_id, selected, ROOT_DEPTH, token).await
    }

    /// Reset to the cached root graph, then replay depths up to `selected`
    async fn shrink(
        &self,
        live: &LiveGraph,
        paper_id: &str,
        selected: Depth,
        token: &RevealToken,
    ) -> Result<bool> {
        let base = self.cache.get(paper_id, ROOT_DEPTH).await?;
        if !live.reset(base, token) {
            return Ok(false);
        }
        self.replay(live, paper_id, ROOT_DEPTH + 1, selected, token).await
    }

    /// Reveal each cached depth in `from..=to` in order
    async fn replay(
        &self,
        live: &LiveGraph,
        paper_id: &str,
        from: Depth,
        to: Depth,
        token: &RevealToken,
    ) -> Result<bool> {
        for depth in from..=to {
            if !self.cache.has(paper_id, depth).await {
                continue;
            }
            let data = self.cache.get(paper_id, depth).await?;
            if live.reveal(&data, token).await.superseded {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn paper_lock(&self, paper_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(paper_id.to_string()).or_default().clone()
    }
}
