//! Live graph and display sink
//!
//! The display surface is an opaque sink that accepts full snapshots. The
//! [`LiveGraph`] owns the snapshot currently shown and applies cached graph
//! data to it, one node at a time when a reveal delay is configured.
//!
//! Every depth change takes a [`RevealToken`]. Taking a token supersedes all
//! earlier ones: a reveal holding a stale token stops before its next
//! append, and its writes are refused.

use citegraph_common::metrics;
use citegraph_common::{Depth, GraphData, LinkKey};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// Consumer of full graph snapshots
pub trait GraphSink: Send + Sync {
    /// Replace the displayed graph. Called once per reveal step.
    fn set_graph_data(&self, data: &GraphData);
}

/// Sink publishing the latest snapshot on a watch channel
pub struct WatchSink {
    tx: watch::Sender<GraphData>,
}

impl WatchSink {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(GraphData::default());
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<GraphData> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> GraphData {
        self.tx.borrow().clone()
    }
}

impl Default for WatchSink {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphSink for WatchSink {
    fn set_graph_data(&self, data: &GraphData) {
        self.tx.send_replace(data.clone());
    }
}

/// Sink keeping every snapshot it receives
#[derive(Default)]
pub struct RecordingSink {
    snapshots: Mutex<Vec<GraphData>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshots(&self) -> Vec<GraphData> {
        lock(&self.snapshots).clone()
    }

    pub fn last(&self) -> Option<GraphData> {
        lock(&self.snapshots).last().cloned()
    }
}

impl GraphSink for RecordingSink {
    fn set_graph_data(&self, data: &GraphData) {
        lock(&self.snapshots).push(data.clone());
    }
}

/// Permission to write to a [`LiveGraph`], valid until the next one is issued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevealToken {
    generation: u64,
}

/// Result of applying graph data to the live graph
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RevealOutcome {
    pub nodes_added: usize,
    pub links_added: usize,
    /// Target links with an endpoint that never became live
    pub links_dropped: usize,
    pub superseded: bool,
}

/// The graph currently shown, and the sink it is shown on
pub struct LiveGraph {
    snapshot: Mutex<GraphData>,
    depth: Mutex<Option<Depth>>,
    sink: Arc<dyn GraphSink>,
    generation: AtomicU64,
    reveal_delay: Duration,
}

impl LiveGraph {
    pub fn new(sink: Arc<dyn GraphSink>, reveal_delay: Duration) -> Self {
        Self {
            snapshot: Mutex::new(GraphData::default()),
            depth: Mutex::new(None),
            sink,
            generation: AtomicU64::new(0),
            reveal_delay,
        }
    }

    /// Copy of the displayed graph
    pub fn snapshot(&self) -> GraphData {
        lock(&self.snapshot).clone()
    }

    /// Depth shown in full. `None` while a depth change is running, or
    /// after one was cut short.
    pub fn depth(&self) -> Option<Depth> {
        *lock(&self.depth)
    }

    /// Record the depth now shown in full. Returns false if `token` is stale.
    pub fn settle(&self, depth: Option<Depth>, token: &RevealToken) -> bool {
        let _snapshot = lock(&self.snapshot);
        if !self.is_current(token) {
            return false;
        }
        *lock(&self.depth) = depth;
        true
    }

    /// Issue a token, superseding every earlier one
    pub fn begin(&self) -> RevealToken {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        RevealToken { generation }
    }

    pub fn is_current(&self, token: &RevealToken) -> bool {
        self.generation.load(Ordering::SeqCst) == token.generation
    }

    /// Replace the displayed graph. Returns false if `token` is stale.
    pub fn reset(&self, data: GraphData, token: &RevealToken) -> bool {
        self.publish(&data, token)
    }

    /// Add every node and link of `target` missing from the live graph.
    ///
    /// Nodes are appended in `target` order, one snapshot per node, pausing
    /// for the reveal delay between nodes. A link is attached as soon as
    /// both of its endpoints are live, so a link whose endpoint comes later
    /// in `target` waits for it instead of being lost. Links between nodes
    /// that are already live go out with the first snapshot.
    pub async fn reveal(&self, target: &GraphData, token: &RevealToken) -> RevealOutcome {
        let mut outcome = RevealOutcome::default();
        let mut live = self.snapshot();

        let mut present: HashSet<String> = live.nodes.iter().map(|n| n.id.clone()).collect();
        let known_links: HashSet<LinkKey> = live.links.iter().map(|l| l.id.clone()).collect();
        let mut pending: Vec<_> = target
            .links
            .iter()
            .filter(|l| !known_links.contains(&l.id))
            .collect();

        outcome.links_added += attach_ready(&mut live, &mut pending, &present);

        let candidates: Vec<_> = target
            .nodes
            .iter()
            .filter(|n| !present.contains(&n.id))
            .collect();

        if candidates.is_empty() {
            if outcome.links_added > 0 && !self.publish(&live, token) {
                outcome.superseded = true;
            }
            outcome.links_dropped = pending.len();
            return self.finish(outcome, &live);
        }

        for (step, node) in candidates.iter().enumerate() {
            if step > 0 && !self.reveal_delay.is_zero() {
                tokio::time::sleep(self.reveal_delay).await;
            }

            present.insert(node.id.clone());
            live.nodes.push((*node).clone());
            let links = attach_ready(&mut live, &mut pending, &present);

            if !self.publish(&live, token) {
                outcome.superseded = true;
                break;
            }
            outcome.nodes_added += 1;
            outcome.links_added += links;
        }

        if !outcome.superseded {
            outcome.links_dropped = pending.len();
        }
        self.finish(outcome, &live)
    }

    fn finish(&self, outcome: RevealOutcome, live: &GraphData) -> RevealOutcome {
        if outcome.links_dropped > 0 {
            debug!(dropped = outcome.links_dropped, "Links without live endpoints discarded");
        }
        metrics::record_reveal(outcome.nodes_added, outcome.superseded, live.node_count());
        outcome
    }

    /// Store and display `data` if `token` is still current
    fn publish(&self, data: &GraphData, token: &RevealToken) -> bool {
        let mut snapshot = lock(&self.snapshot);
        if !self.is_current(token) {
            return false;
        }
        *snapshot = data.clone();
        self.sink.set_graph_data(&snapshot);
        true
    }
}

/// Move every pending link whose endpoints are both present into `live`
fn attach_ready(
    live: &mut GraphData,
    pending: &mut Vec<&citegraph_common::Link>,
    present: &HashSet<String>,
) -> usize {
    let before = live.links.len();
    pending.retain(|link| {
        if present.contains(&link.source) && present.contains(&link.target) {
            live.links.push((*link).clone());
            false
        } else {
            true
        }
    });
    live.links.len() - before
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use citegraph_common::{Link, Node};

    fn node(id: &str) -> Node {
        Node {
            id: id.to_string(),
            label: id.to_string(),
            fields_of_study: vec![],
        }
    }

    fn graph(ids: &[&str], links: Vec<Link>) -> GraphData {
        GraphData {
            nodes: ids.iter().map(|id| node(id)).collect(),
            links,
        }
    }

    fn live_graph() -> (Arc<RecordingSink>, LiveGraph) {
        let sink = Arc::new(RecordingSink::new());
        let live = LiveGraph::new(sink.clone(), Duration::ZERO);
        (sink, live)
    }

    #[test]
    fn test_settle_refuses_stale_token() {
        let (_sink, live) = live_graph();
        assert_eq!(live.depth(), None);

        let stale = live.begin();
        let token = live.begin();
        assert!(live.settle(Some(2), &token));
        assert!(!live.settle(None, &stale));

        assert_eq!(live.depth(), Some(2));
    }

    #[tokio::test]
    async fn test_reveal_pushes_one_snapshot_per_node() {
        let (sink, live) = live_graph();
        let token = live.begin();
        live.reset(graph(&["A"], vec![]), &token);

        let target = graph(
            &["A", "B", "C"],
            vec![Link::citation("A", "B"), Link::reference("A", "C")],
        );
        let outcome = live.reveal(&target, &token).await;

        assert_eq!(outcome.nodes_added, 2);
        assert_eq!(outcome.links_added, 2);
        assert!(!outcome.superseded);

        let snapshots = sink.snapshots();
        assert_eq!(snapshots.len(), 3);
        assert_eq!(snapshots[1].node_count(), 2);
        assert_eq!(snapshots[1].link_count(), 1);
        assert_eq!(snapshots[2], live.snapshot());
        assert_eq!(live.snapshot().node_count(), 3);
    }

    #[tokio::test]
    async fn test_out_of_order_link_is_deferred_not_dropped() {
        let (_sink, live) = live_graph();
        let token = live.begin();
        live.reset(graph(&["A"], vec![]), &token);

        // D is listed before its parent B
        let target = graph(
            &["A", "D", "B"],
            vec![Link::citation("B", "D"), Link::citation("A", "B")],
        );
        let outcome = live.reveal(&target, &token).await;

        assert_eq!(outcome.links_added, 2);
        assert_eq!(outcome.links_dropped, 0);
        assert_eq!(live.snapshot().link_count(), 2);
    }

    #[tokio::test]
    async fn test_links_between_live_nodes_are_attached() {
        let (sink, live) = live_graph();
        let token = live.begin();
        live.reset(graph(&["A", "B"], vec![]), &token);

        let outcome = live
            .reveal(&graph(&["A", "B"], vec![Link::citation("A", "B")]), &token)
            .await;

        assert_eq!(outcome.nodes_added, 0);
        assert_eq!(outcome.links_added, 1);
        assert_eq!(sink.last().unwrap().link_count(), 1);
    }

    #[tokio::test]
    async fn test_link_to_unknown_node_is_dropped() {
        let (_sink, live) = live_graph();
        let token = live.begin();
        live.reset(graph(&["A"], vec![]), &token);

        let outcome = live
            .reveal(&graph(&["B"], vec![Link::citation("Z", "B")]), &token)
            .await;

        assert_eq!(outcome.nodes_added, 1);
        assert_eq!(outcome.links_dropped, 1);
        assert_eq!(live.snapshot().link_count(), 0);
    }

    #[tokio::test]
    async fn test_stale_token_cannot_write() {
        let (sink, live) = live_graph();
        let old = live.begin();
        let new = live.begin();

        assert!(!live.is_current(&old));
        assert!(!live.reset(graph(&["A"], vec![]), &old));
        assert!(live.reset(graph(&["B"], vec![]), &new));

        let outcome = live.reveal(&graph(&["B", "C"], vec![]), &old).await;
        assert!(outcome.superseded);
        assert_eq!(outcome.nodes_added, 0);
        assert_eq!(sink.snapshots().len(), 1);
        assert!(live.snapshot().contains_node("B"));
        assert!(!live.snapshot().contains_node("C"));
    }

    #[tokio::test]
    async fn test_superseded_mid_reveal_stops_appending() {
        let sink = Arc::new(RecordingSink::new());
        let live = Arc::new(LiveGraph::new(sink.clone(), Duration::from_millis(50)));
        let token = live.begin();
        live.reset(graph(&["A"], vec![]), &token);

        let target = graph(&["A", "B", "C", "D", "E"], vec![]);
        let revealing = {
            let live = live.clone();
            tokio::spawn(async move { live.reveal(&target, &token).await })
        };

        tokio::time::sleep(Duration::from_millis(75)).await;
        let newer = live.begin();
        let outcome = revealing.await.unwrap();

        assert!(outcome.superseded);
        assert!(outcome.nodes_added < 4);
        assert!(live.is_current(&newer));
        assert_eq!(live.snapshot().node_count(), 1 + outcome.nodes_added);
    }

    #[test]
    fn test_watch_sink_keeps_latest() {
        let sink = WatchSink::new();
        let rx = sink.subscribe();
        sink.set_graph_data(&graph(&["A"], vec![]));
        sink.set_graph_data(&graph(&["A", "B"], vec![]));

        assert_eq!(sink.current().node_count(), 2);
        assert_eq!(rx.borrow().node_count(), 2);
    }
}
