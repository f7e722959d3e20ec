//! Search API client consumed by the verifier.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use conductor_core::defaults::{SEARCH_URL, VERIFY_SEARCH_LIMIT};
use conductor_core::{Error, Result};

/// Search request sent to the deployment's search endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SearchRequest {
    pub query: String,
    pub limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_type_filter: Option<String>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            limit: VERIFY_SEARCH_LIMIT,
            source_type_filter: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// One source returned by the search API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchSource {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub excerpt: String,
    #[serde(default)]
    pub confidence: f64,
}

/// Search API response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub sources: Vec<SearchSource>,
    #[serde(default)]
    pub total: usize,
    #[serde(default)]
    pub latency_ms: u64,
}

/// Interface the verifier consumes search results through. Trait-shaped
/// so tests can substitute a canned provider.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, request: SearchRequest) -> Result<SearchResponse>;

    /// Cheap reachability probe used by precondition checks.
    async fn healthy(&self) -> bool;
}

/// HTTP client for the deployment search endpoint.
pub struct HttpSearchClient {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpSearchClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
        }
    }
}

impl Default for HttpSearchClient {
    fn default() -> Self {
        Self::new(SEARCH_URL)
    }
}

#[async_trait]
impl SearchProvider for HttpSearchClient {
    async fn search(&self, request: SearchRequest) -> Result<SearchResponse> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Search(format!("Search endpoint unreachable: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Search(format!(
                "Search endpoint returned {}",
                response.status()
            )));
        }

        Ok(response.json().await?)
    }

    async fn healthy(&self) -> bool {
        self.search(SearchRequest::new("health-check").with_limit(1))
            .await
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization_omits_empty_filter() {
        let request = SearchRequest::new("invoice").with_limit(3);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["query"], "invoice");
        assert_eq!(json["limit"], 3);
        assert!(json.get("source_type_filter").is_none());
    }

    #[test]
    fn test_response_tolerates_missing_fields() {
        let response: SearchResponse =
            serde_json::from_str(r#"{"sources": [{"path": "/a/b.txt"}]}"#).unwrap();
        assert_eq!(response.sources.len(), 1);
        assert_eq!(response.sources[0].path, "/a/b.txt");
        assert_eq!(response.sources[0].confidence, 0.0);
        assert_eq!(response.total, 0);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_reports_unhealthy() {
        let client = HttpSearchClient::new("http://127.0.0.1:1/api/search");
        assert!(!client.healthy().await);
    }
}
