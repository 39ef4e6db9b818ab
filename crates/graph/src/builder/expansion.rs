//! Frontier expansion
//!
//! Depth `d` is depth `d-1` plus the citations and references of the
//! frontier: the papers that first appeared at depth `d-1`. Every fetch for
//! a depth is joined before anything is written, so a failed fetch leaves
//! no trace of that depth in the cache or on the live graph.

use super::GraphBuilder;
use crate::sink::{LiveGraph, RevealToken};
use citegraph_common::cache::Depth;
use citegraph_common::errors::{AppError, Result};
use citegraph_common::{metrics, GraphData, Link, Node, ROOT_DEPTH};
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt, TryStreamExt};
use std::collections::HashSet;
use tracing::{debug, info};

impl GraphBuilder {
    /// Nodes and links for the citations and references of one paper
    pub(crate) async fn fetch_neighbourhood(&self, paper_id: &str) -> Result<GraphData> {
        let (citations, references) = tokio::try_join!(
            self.source.fetch_citations(paper_id),
            self.source.fetch_references(paper_id),
        )?;

        let mut delta = GraphData::new();
        for citing in citations.iter().filter(|p| p.has_id() && p.paper_id != paper_id) {
            delta.push_node(Node::from(citing));
            delta.push_link(Link::citation(paper_id, &citing.paper_id));
        }
        for cited in references.iter().filter(|p| p.has_id() && p.paper_id != paper_id) {
            delta.push_node(Node::from(cited));
            delta.push_link(Link::reference(paper_id, &cited.paper_id));
        }

        debug!(
            paper_id,
            citations = citations.len(),
            references = references.len(),
            "Fetched neighbourhood"
        );
        Ok(delta)
    }

    /// Build `depth` (building lower missing depths first) and reveal every
    /// depth above `old` on the live graph. Returns false once superseded.
    pub(super) fn expand<'a>(
        &'a self,
        live: &'a LiveGraph,
        paper_id: &'a str,
        depth: Depth,
        old: Depth,
        token: &'a RevealToken,
    ) -> BoxFuture<'a, Result<bool>> {
        async move {
            let previous = depth - 1;

            if self.cache.has(paper_id, previous).await {
                for gap in (old + 1)..depth {
                    if !self.replay(live, paper_id, gap, gap, token).await? {
                        return Ok(false);
                    }
                }
            } else if previous > ROOT_DEPTH {
                if !self.expand(live, paper_id, previous, old, token).await? {
                    return Ok(false);
                }
            } else {
                // Depth 1 only comes from resolving the document
                return Err(AppError::CacheMisuse {
                    paper_id: paper_id.to_string(),
                    depth: previous,
                });
            }

            let built = self.build_depth(paper_id, depth).await?;
            let outcome = live.reveal(&built, token).await;
            Ok(!outcome.superseded)
        }
        .boxed()
    }

    /// Fetch the frontier of `depth - 1` and store the cumulative `depth` graph
    async fn build_depth(&self, paper_id: &str, depth: Depth) -> Result<GraphData> {
        let previous = depth - 1;
        let base = self.cache.get(paper_id, previous).await?;

        let has_earlier = previous > ROOT_DEPTH && self.cache.has(paper_id, previous - 1).await;
        let earlier: HashSet<String> = if has_earlier {
            self.cache
                .get(paper_id, previous - 1)
                .await?
                .nodes
                .into_iter()
                .map(|n| n.id)
                .collect()
        } else {
            HashSet::new()
        };

        let frontier: Vec<String> = base
            .nodes
            .iter()
            .map(|n| n.id.clone())
            .filter(|id| id != paper_id && !earlier.contains(id))
            .collect();

        info!(paper_id, depth, frontier = frontier.len(), "Expanding frontier");

        let deltas: Vec<GraphData> = futures::stream::iter(frontier)
            .map(|id| async move { self.fetch_neighbourhood(&id).await })
            .buffered(self.max_concurrent_fetches)
            .try_collect()
            .await?;

        let known: HashSet<String> = base.nodes.iter().map(|n| n.id.clone()).collect();
        let mut level = base;
        for delta in deltas {
            level.absorb(GraphData {
                nodes: delta.nodes.into_iter().filter(|n| !known.contains(&n.id)).collect(),
                links: delta.links,
            });
        }

        self.cache.merge(paper_id, depth, level).await;
        metrics::record_graph_build(depth);

        self.cache.get(paper_id, depth).await
    }
}
