//! Similarity search collaborator
//!
//! The vector index and embedding service sit behind `SimilaritySearch`.
//! `HttpSearchClient` posts the query to a JSON endpoint and expects
//! `{ "results": [ { "id", "score", "metadata" } ] }` ordered by score.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::SearchConfig;
use crate::errors::{ChatError, Result};
use crate::types::{RetrievalCandidate, RetrievalFilter};

/// One similarity query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchRequest {
    pub query: String,
    pub top_k: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<RetrievalFilter>,
}

/// Black-box similarity search
#[async_trait]
pub trait SimilaritySearch: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<RetrievalCandidate>>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<RetrievalCandidate>,
}

/// JSON-over-HTTP search client
#[derive(Debug, Clone)]
pub struct HttpSearchClient {
    client: Client,
    endpoint: String,
}

impl HttpSearchClient {
    pub fn with_config(config: &SearchConfig) -> Result<Self> {
        // Per-request deadline is enforced by the retriever; this one only bounds stuck sockets.
        let client = Client::builder()
            .timeout(config.timeout() * 2)
            .build()
            .map_err(ChatError::HttpError)?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl SimilaritySearch for HttpSearchClient {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<RetrievalCandidate>> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| ChatError::SearchError(format!("Failed to send request: {}", e)))?;

        if !response.status().is_success() {
            return Err(ChatError::SearchError(format!(
                "Search endpoint returned HTTP {}",
                response.status()
            )));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| ChatError::SearchError(format!("Failed to parse response: {}", e)))?;

        Ok(parsed.results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_request_serialization() {
        let request = SearchRequest {
            query: "3 bed homes".to_string(),
            top_k: 10,
            filter: Some(RetrievalFilter {
                beds_min: Some(3.0),
                ..Default::default()
            }),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["top_k"], 10);
        assert_eq!(json["filter"]["beds_min"], 3.0);
        assert!(json["filter"].get("price_min").is_none());
    }

    #[test]
    fn test_response_parsing_tolerates_missing_metadata() {
        let body = r#"{"results":[{"id":"a","score":0.8},{"id":"b","score":0.5,"metadata":{"price":350000,"city":"Austin"}}]}"#;
        let parsed: SearchResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.results.len(), 2);
        assert_eq!(parsed.results[1].metadata.price, Some(350_000.0));
        assert_eq!(parsed.results[1].metadata.city.as_deref(), Some("Austin"));
    }
}
