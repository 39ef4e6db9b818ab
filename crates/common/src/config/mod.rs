//! Configuration management for CiteGraph
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Bibliographic API configuration
    #[serde(default)]
    pub bibliographic: BibliographicConfig,

    /// Graph building configuration
    #[serde(default)]
    pub graph: GraphConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BibliographicConfig {
    /// API base URL (no trailing slash)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Optional API key, sent as `x-api-key`
    pub api_key: Option<String>,

    /// Citations/references returned per paper. This is an API tier
    /// limit, not a property of the graph.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Outbound request pacing
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GraphConfig {
    /// Title similarity above which a search hit is accepted
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    /// Pause between revealed nodes, 0 disables staggering
    #[serde(default = "default_reveal_delay")]
    pub reveal_delay_ms: u64,

    /// Frontier papers fetched in parallel
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,

    /// Deepest traversal a caller may request
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log filter directive (e.g. "info", "citegraph_graph=debug")
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Service name reported in logs
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_base_url() -> String { "https://api.semanticscholar.org/graph/v1".to_string() }
fn default_page_size() -> u32 { 1 }
fn default_timeout() -> u64 { 30 }
fn default_requests_per_second() -> u32 { 1 }
fn default_similarity_threshold() -> f64 { 0.78 }
fn default_reveal_delay() -> u64 { 500 }
fn default_max_concurrent_fetches() -> usize { 4 }
fn default_max_depth() -> u32 { 5 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_service_name() -> String { "citegraph".to_string() }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for BibliographicConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            page_size: default_page_size(),
            timeout_secs: default_timeout(),
            requests_per_second: default_requests_per_second(),
        }
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            reveal_delay_ms: default_reveal_delay(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
            max_depth: default_max_depth(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            service_name: default_service_name(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            bibliographic: BibliographicConfig::default(),
            graph: GraphConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl BibliographicConfig {
    /// Per-request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g., APP__GRAPH__REVEAL_DELAY_MS=0
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get the reveal pause as Duration
    pub fn reveal_delay(&self) -> Duration {
        Duration::from_millis(self.graph.reveal_delay_ms)
    }
}
