//! Shared gateway state

use chrono::{DateTime, Utc};
use citegraph_common::{config::AppConfig, Depth, PaperRecord, ROOT_DEPTH};
use citegraph_graph::{GraphBuilder, LiveGraph, WatchSink};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub builder: Arc<GraphBuilder>,
    pub live: Arc<LiveGraph>,
    /// Display surface the live graph publishes to
    pub sink: Arc<WatchSink>,
    pub session: Arc<RwLock<Option<Session>>>,
    /// Absent when another recorder is installed (tests)
    pub prometheus: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(
        config: Arc<AppConfig>,
        builder: Arc<GraphBuilder>,
        live: Arc<LiveGraph>,
        sink: Arc<WatchSink>,
        prometheus: Option<PrometheusHandle>,
    ) -> Self {
        Self {
            config,
            builder,
            live,
            sink,
            session: Arc::new(RwLock::new(None)),
            prometheus,
        }
    }
}

/// The open document's paper and the depth last requested for it
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub paper: PaperRecord,
    pub depth: Depth,
    /// Depth changes requested so far; identifies the latest one
    pub changes: u64,
    pub resolved_at: DateTime<Utc>,
    /// Error from the last failed depth change, cleared by the next request
    pub last_error: Option<String>,
}

impl Session {
    pub fn new(paper: PaperRecord) -> Self {
        Self {
            paper,
            depth: ROOT_DEPTH,
            changes: 0,
            resolved_at: Utc::now(),
            last_error: None,
        }
    }
}
