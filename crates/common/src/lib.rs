//! CiteGraph Common Library
//!
//! Shared code for the CiteGraph crates including:
//! - Paper, node, link and graph data models
//! - The per-paper, per-depth graph cache
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod cache;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod models;

// Re-export commonly used types
pub use cache::{CacheStats, Depth, DepthCache, InMemoryDepthCache};
pub use config::AppConfig;
pub use errors::{AppError, Result};
pub use models::{GraphData, Link, LinkKey, Node, PaperRecord};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Depth of the graph built when a document is first resolved
pub const ROOT_DEPTH: Depth = 1;
