//! Semantic Scholar Graph API client

use super::{BibliographicSource, PAPER_FIELDS};
use async_trait::async_trait;
use citegraph_common::config::BibliographicConfig;
use citegraph_common::errors::{AppError, Result};
use citegraph_common::metrics::UpstreamTimer;
use citegraph_common::PaperRecord;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Option<Vec<PaperRecord>>,
}

#[derive(Deserialize)]
struct CitationPage {
    #[serde(default)]
    data: Option<Vec<CitationEntry>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CitationEntry {
    #[serde(default)]
    citing_paper: Option<PaperRecord>,
    #[serde(default)]
    cited_paper: Option<PaperRecord>,
}

/// HTTP client for the Semantic Scholar Graph API
pub struct SemanticScholarClient {
    client: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
    page_size: u32,
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
}

impl SemanticScholarClient {
    /// Create a client from configuration
    pub fn new(config: &BibliographicConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        let base_url = Url::parse(config.base_url.trim_end_matches('/'))
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| AppError::Configuration {
                message: format!("Invalid bibliographic base URL: {}", config.base_url),
            })?;

        // Zero disables pacing
        let limiter = NonZeroU32::new(config.requests_per_second)
            .map(|rps| Arc::new(RateLimiter::direct(Quota::per_second(rps))));

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key.clone(),
            page_size: config.page_size,
            limiter,
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = self.endpoint(segments)?;

        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }

        let timer = UpstreamTimer::start(operation);
        let result = self.send(url.clone(), query).await;
        timer.finish(result.is_ok());

        if let Err(e) = &result {
            warn!(operation, url = %url, error = %e, "Bibliographic request failed");
        }
        result
    }

    async fn send<T: DeserializeOwned>(&self, url: Url, query: &[(&str, String)]) -> Result<T> {
        debug!(url = %url, "Bibliographic request");

        let mut request = self.client.get(url).query(query);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::ServiceUnavailable {
                message: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ServiceUnavailable {
                message: format!("API error {}: {}", status, body),
            });
        }

        response
            .json()
            .await
            .map_err(|e| AppError::ServiceUnavailable {
                message: format!("Failed to parse response: {}", e),
            })
    }

    /// Base URL extended by `segments`, each percent-encoded as one path segment
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::Configuration {
                message: format!("Bibliographic base URL cannot take a path: {}", self.base_url),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn page_query(&self) -> [(&'static str, String); 2] {
        [
            ("fields", PAPER_FIELDS.to_string()),
            ("limit", self.page_size.to_string()),
        ]
    }
}

#[async_trait]
impl BibliographicSource for SemanticScholarClient {
    async fn search_by_title(&self, title: &str) -> Result<Option<PaperRecord>> {
        let query = [
            ("query", title.to_string()),
            ("limit", "1".to_string()),
            ("fields", PAPER_FIELDS.to_string()),
        ];
        let response: SearchResponse = self.get_json("search", &["paper", "search"], &query).await?;
        Ok(response.data.unwrap_or_default().into_iter().next())
    }

    async fn fetch_citations(&self, paper_id: &str) -> Result<Vec<PaperRecord>> {
        let segments = ["paper", paper_id, "citations"];
        let page: CitationPage = self.get_json("citations", &segments, &self.page_query()).await?;
        Ok(page
            .data
            .unwrap_or_default()
            .into_iter()
            .filter_map(|entry| entry.citing_paper)
            .collect())
    }

    async fn fetch_references(&self, paper_id: &str) -> Result<Vec<PaperRecord>> {
        let segments = ["paper", paper_id, "references"];
        let page: CitationPage = self.get_json("references", &segments, &self.page_query()).await?;
        Ok(page
            .data
            .unwrap_or_default()
            .into_iter()
            .filter_map(|entry| entry.cited_paper)
            .collect())
    }
}
