//! Embedding service client / 向量服务客户端
//!
//! `POST {url}/embed` with `{"text", "prefix"}` answers `{"embedding": [f32]}`.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use super::http_status_error;
use crate::config::EmbeddingConfig;
use crate::error::{BackendError, SearchError};

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    text: &'a str,
    prefix: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

/// Embedding client / 向量客户端
#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    client: Client,
    endpoint: Url,
    prefix: String,
}

impl EmbeddingClient {
    pub fn new(config: &EmbeddingConfig, timeout: Duration) -> Result<Self, SearchError> {
        let endpoint = Url::parse(&format!("{}/embed", config.url.trim_end_matches('/')))
            .map_err(|e| SearchError::BackendUnavailable(format!("Invalid embedding url {}: {}", config.url, e)))?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SearchError::BackendUnavailable(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint,
            prefix: config.prefix.clone(),
        })
    }

    /// Embed query text with the configured model prefix
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, BackendError> {
        let resp = self
            .client
            .post(self.endpoint.clone())
            .json(&EmbedRequest {
                text,
                prefix: &self.prefix,
            })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(http_status_error(status, &body));
        }

        let body: EmbedResponse = resp.json().await?;
        if body.embedding.is_empty() {
            return Err(BackendError::Decode("empty embedding".to_string()));
        }
        Ok(body.embedding)
    }

    /// Embedding, or `None` with a warning so callers can fall back to keyword search
    pub async fn embed_or_warn(&self, text: &str) -> Option<Vec<f32>> {
        match self.embed(text).await {
            Ok(vector) => Some(vector),
            Err(e) => {
                tracing::warn!("Embedding unavailable, using keyword search only: {}", e);
                None
            }
        }
    }
}

/// pgvector text literal, six decimals per component
pub fn vector_literal(vector: &[f32]) -> String {
    let parts: Vec<String> = vector.iter().map(|x| format!("{:.6}", x)).collect();
    format!("[{}]", parts.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_literal() {
        assert_eq!(vector_literal(&[0.5, -1.0, 0.1234567]), "[0.500000,-1.000000,0.123457]");
        assert_eq!(vector_literal(&[]), "[]");
    }

    #[test]
    fn test_endpoint_join() {
        let config = EmbeddingConfig {
            url: "http://embed:5000/".to_string(),
            prefix: "query: ".to_string(),
        };
        let client = EmbeddingClient::new(&config, Duration::from_secs(1)).unwrap();
        assert_eq!(client.endpoint.as_str(), "http://embed:5000/embed");
    }

    #[test]
    fn test_invalid_url() {
        let config = EmbeddingConfig {
            url: "not a url".to_string(),
            prefix: String::new(),
        };
        assert!(EmbeddingClient::new(&config, Duration::from_secs(1)).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_service_degrades() {
        let config = EmbeddingConfig {
            url: "http://127.0.0.1:9".to_string(),
            prefix: "query: ".to_string(),
        };
        let client = EmbeddingClient::new(&config, Duration::from_millis(500)).unwrap();
        assert!(client.embed_or_warn("aloha").await.is_none());
    }

    #[test]
    fn test_response_shape() {
        let body: EmbedResponse = serde_json::from_str(r#"{"embedding":[0.1,0.2]}"#).unwrap();
        assert_eq!(body.embedding.len(), 2);
    }
}
