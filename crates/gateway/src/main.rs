//! CiteGraph API Gateway
//!
//! HTTP surface over the graph engine.
//! Handles:
//! - Opening documents and resolving their paper
//! - Depth changes, revealed on the live graph in the background
//! - Live graph snapshots and server-sent updates
//! - Observability (logging, metrics, request tracing)

mod handlers;
mod state;

use axum::{
    routing::{get, post, put},
    Router,
};
use citegraph_common::{
    config::{AppConfig, ObservabilityConfig},
    metrics::{self, UPSTREAM_BUCKETS},
    InMemoryDepthCache,
};
use citegraph_graph::{GraphBuilder, LiveGraph, SemanticScholarClient, WatchSink};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Arc::new(AppConfig::load()?);

    init_tracing(&config.observability);

    info!("Starting CiteGraph gateway v{}", citegraph_common::VERSION);

    // Recorder first, so the descriptions land in it
    let prometheus = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            UPSTREAM_BUCKETS,
        )?
        .install_recorder()?;
    metrics::register_metrics();

    let source = Arc::new(SemanticScholarClient::new(&config.bibliographic)?);
    let cache = Arc::new(InMemoryDepthCache::new());
    let builder = Arc::new(GraphBuilder::new(source, cache, &config.graph));
    let sink = Arc::new(WatchSink::new());
    let live = Arc::new(LiveGraph::new(sink.clone(), config.reveal_delay()));

    let state = AppState::new(config.clone(), builder, live, sink, Some(prometheus));

    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let fmt = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.json_logging {
        fmt.json().init();
    } else {
        fmt.init();
    }
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let api_routes = Router::new()
        .route("/documents", post(handlers::documents::open_document))
        .route("/graph", get(handlers::graph::get_graph))
        .route("/graph/depth", put(handlers::graph::set_depth))
        .route("/graph/events", get(handlers::graph::graph_events));

    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/metrics", get(handlers::health::metrics))
        .nest("/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body, BodyDataStream};
    use axum::http::{Request, StatusCode};
    use citegraph_common::{config::GraphConfig, PaperRecord};
    use citegraph_graph::StaticBibliography;
    use futures::StreamExt;
    use serde_json::{json, Value};
    use std::io::Write;
    use std::time::Duration;
    use tower::ServiceExt;

    const TITLE: &str = "Citation Graphs in Practice";

    fn paper(id: &str, title: &str) -> PaperRecord {
        PaperRecord {
            paper_id: id.to_string(),
            title: title.to_string(),
            citation_count: 0,
            influential_citation_count: 0,
            fields_of_study: vec![],
        }
    }

    fn bibliography() -> StaticBibliography {
        StaticBibliography::new()
            .with_search_hit(TITLE, paper("A", TITLE))
            .with_citations("A", vec![paper("B", "B"), paper("C", "C")])
            .with_citations("B", vec![paper("D", "D")])
            .with_citations("D", vec![paper("E", "E")])
    }

    fn test_state(source: StaticBibliography) -> AppState {
        let config = Arc::new(AppConfig {
            graph: GraphConfig {
                reveal_delay_ms: 0,
                ..GraphConfig::default()
            },
            ..AppConfig::default()
        });
        let builder = Arc::new(GraphBuilder::new(
            Arc::new(source),
            Arc::new(InMemoryDepthCache::new()),
            &config.graph,
        ));
        let sink = Arc::new(WatchSink::new());
        let live = Arc::new(LiveGraph::new(sink.clone(), config.reveal_delay()));
        AppState::new(config, builder, live, sink, None)
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn wait_for_graph(app: &Router, done: impl Fn(&Value) -> bool) -> Value {
        for _ in 0..200 {
            let (_, body) = send(app, "GET", "/v1/graph", None).await;
            if done(&body) {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("live graph never reached the expected state");
    }

    /// Reads `graph` events off a server-sent event body
    struct GraphEvents {
        body: BodyDataStream,
        buffer: String,
    }

    impl GraphEvents {
        async fn open(app: &Router) -> Self {
            let request = Request::builder()
                .uri("/v1/graph/events")
                .body(Body::empty())
                .unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(response.headers()["content-type"], "text/event-stream");

            Self {
                body: response.into_body().into_data_stream(),
                buffer: String::new(),
            }
        }

        async fn next(&mut self) -> Value {
            loop {
                if let Some(end) = self.buffer.find("\n\n") {
                    let event: String = self.buffer.drain(..end + 2).collect();
                    if !event.lines().any(|l| l == "event: graph" || l == "event:graph") {
                        continue;
                    }
                    let data = event
                        .lines()
                        .find_map(|l| l.strip_prefix("data:"))
                        .expect("graph event without data");
                    return serde_json::from_str(data.trim_start()).unwrap();
                }

                let chunk = tokio::time::timeout(Duration::from_secs(5), self.body.next())
                    .await
                    .expect("no graph event within 5s")
                    .expect("event stream ended")
                    .unwrap();
                self.buffer.push_str(&String::from_utf8_lossy(&chunk));
            }
        }
    }

    fn pdf(title: Option<&str>) -> tempfile::NamedTempFile {
        use lopdf::{dictionary, Document, Object};

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.add_object(dictionary! {
            "Type" => "Pages",
            "Kids" => Vec::<Object>::new(),
            "Count" => 0,
        });
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        if let Some(title) = title {
            let info_id = doc.add_object(dictionary! { "Title" => Object::string_literal(title) });
            doc.trailer.set("Info", info_id);
        }

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&bytes).unwrap();
        file
    }

    #[tokio::test]
    async fn test_health() {
        let app = create_router(test_state(bibliography()));
        let (status, body) = send(&app, "GET", "/health", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["version"], citegraph_common::VERSION);
    }

    #[tokio::test]
    async fn test_graph_before_any_document() {
        let app = create_router(test_state(bibliography()));
        let (status, body) = send(&app, "GET", "/v1/graph", None).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body["paper_id"].is_null());
        assert_eq!(body["graph"]["nodes"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_depth_change_requires_document() {
        let app = create_router(test_state(bibliography()));
        let (status, _) = send(&app, "PUT", "/v1/graph/depth", Some(json!({ "depth": 2 }))).await;

        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_open_document_by_title() {
        let state = test_state(bibliography());
        let app = create_router(state.clone());

        let (status, body) = send(&app, "POST", "/v1/documents", Some(json!({ "title": TITLE }))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["paper"]["paperId"], "A");
        assert_eq!(body["depth"], 1);
        assert_eq!(body["cached"], false);
        assert_eq!(body["graph"]["nodes"].as_array().unwrap().len(), 3);
        assert_eq!(state.sink.current().node_count(), 3);

        let (_, graph) = send(&app, "GET", "/v1/graph", None).await;
        assert_eq!(graph["paper_id"], "A");
        assert_eq!(graph["depth"], 1);
    }

    #[tokio::test]
    async fn test_open_document_needs_path_or_title() {
        let app = create_router(test_state(bibliography()));
        let (status, _) = send(&app, "POST", "/v1/documents", Some(json!({}))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unmatched_title_is_not_found() {
        let app = create_router(test_state(bibliography()));
        let (status, body) =
            send(&app, "POST", "/v1/documents", Some(json!({ "title": "Unknown Work" }))).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"]["message"].is_string());

        let (_, graph) = send(&app, "GET", "/v1/graph", None).await;
        assert!(graph["paper_id"].is_null());
    }

    #[tokio::test]
    async fn test_open_pdf_document() {
        let app = create_router(test_state(bibliography()));

        let titled = pdf(Some(TITLE));
        let path = titled.path().to_string_lossy().to_string();
        let (status, body) = send(&app, "POST", "/v1/documents", Some(json!({ "path": path }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["paper"]["paperId"], "A");

        let untitled = pdf(None);
        let path = untitled.path().to_string_lossy().to_string();
        let (status, _) = send(&app, "POST", "/v1/documents", Some(json!({ "path": path }))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_depth_change_reveals_in_background() {
        let app = create_router(test_state(bibliography()));
        send(&app, "POST", "/v1/documents", Some(json!({ "title": TITLE }))).await;

        let (status, body) = send(&app, "PUT", "/v1/graph/depth", Some(json!({ "depth": 2 }))).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body, json!({ "paper_id": "A", "from": 1, "to": 2 }));

        let graph = wait_for_graph(&app, |g| {
            g["graph"]["nodes"].as_array().map(|n| n.len()) == Some(4)
        })
        .await;
        assert_eq!(graph["depth"], 2);
        assert_eq!(graph["graph"]["links"].as_array().unwrap().len(), 3);
        assert!(graph["last_error"].is_null());
    }

    #[tokio::test]
    async fn test_depth_out_of_range_is_rejected() {
        let app = create_router(test_state(bibliography()));
        send(&app, "POST", "/v1/documents", Some(json!({ "title": TITLE }))).await;

        for depth in [0, 99] {
            let (status, _) =
                send(&app, "PUT", "/v1/graph/depth", Some(json!({ "depth": depth }))).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }
    }

    #[tokio::test]
    async fn test_failed_depth_change_is_reported() {
        let app = create_router(test_state(bibliography().failing("C")));
        send(&app, "POST", "/v1/documents", Some(json!({ "title": TITLE }))).await;

        let (status, _) = send(&app, "PUT", "/v1/graph/depth", Some(json!({ "depth": 2 }))).await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let graph = wait_for_graph(&app, |g| g["last_error"].is_string()).await;
        assert_eq!(graph["depth"], 1);
        assert_eq!(graph["graph"]["nodes"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_failed_multi_level_change_restores_root_graph() {
        let app = create_router(test_state(bibliography().failing("D")));
        send(&app, "POST", "/v1/documents", Some(json!({ "title": TITLE }))).await;

        let (status, _) = send(&app, "PUT", "/v1/graph/depth", Some(json!({ "depth": 3 }))).await;
        assert_eq!(status, StatusCode::ACCEPTED);

        // Depth 2 builds, depth 3 fails on D
        let graph = wait_for_graph(&app, |g| g["last_error"].is_string()).await;
        assert_eq!(graph["depth"], 1);
        assert_eq!(graph["shown_depth"], 1);
        assert_eq!(graph["graph"]["nodes"].as_array().unwrap().len(), 3);

        let (_, body) = send(&app, "PUT", "/v1/graph/depth", Some(json!({ "depth": 2 }))).await;
        assert_eq!(body["from"], 1);
        let graph = wait_for_graph(&app, |g| g["shown_depth"] == 2).await;
        assert_eq!(graph["graph"]["nodes"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_rapid_depth_changes_settle_on_latest() {
        let app = create_router(test_state(bibliography()));
        send(&app, "POST", "/v1/documents", Some(json!({ "title": TITLE }))).await;

        let (_, first) = send(&app, "PUT", "/v1/graph/depth", Some(json!({ "depth": 3 }))).await;
        let (_, second) = send(&app, "PUT", "/v1/graph/depth", Some(json!({ "depth": 2 }))).await;
        assert_eq!(first["to"], 3);
        assert_eq!(second["from"], 3);

        let graph = wait_for_graph(&app, |g| g["shown_depth"] == 2).await;
        assert_eq!(graph["depth"], 2);
        assert_eq!(graph["graph"]["nodes"].as_array().unwrap().len(), 4);

        // Nothing from the superseded change lands afterwards
        tokio::time::sleep(Duration::from_millis(50)).await;
        let (_, later) = send(&app, "PUT", "/v1/graph/depth", Some(json!({ "depth": 2 }))).await;
        assert_eq!(later["from"], 2);
        let (_, graph) = send(&app, "GET", "/v1/graph", None).await;
        assert_eq!(graph["shown_depth"], 2);
        assert_eq!(graph["graph"]["nodes"].as_array().unwrap().len(), 4);
        assert!(graph["last_error"].is_null());
    }

    #[tokio::test]
    async fn test_graph_events_start_with_current_snapshot() {
        let app = create_router(test_state(bibliography()));
        send(&app, "POST", "/v1/documents", Some(json!({ "title": TITLE }))).await;
        let (_, current) = send(&app, "GET", "/v1/graph", None).await;

        let mut events = GraphEvents::open(&app).await;
        let first = events.next().await;
        assert_eq!(first, current["graph"]);
        assert_eq!(first["nodes"].as_array().unwrap().len(), 3);

        send(&app, "PUT", "/v1/graph/depth", Some(json!({ "depth": 2 }))).await;
        loop {
            let graph = events.next().await;
            let nodes = graph["nodes"].as_array().unwrap().len();
            assert!((3..=4).contains(&nodes));
            if nodes == 4 {
                break;
            }
        }
    }

    #[tokio::test]
    async fn test_metrics_endpoint_without_recorder() {
        let app = create_router(test_state(bibliography()));
        let (status, _) = send(&app, "GET", "/metrics", None).await;

        assert_eq!(status, StatusCode::OK);
    }
}
