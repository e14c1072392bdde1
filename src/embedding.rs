//! Embedding providers.
//!
//! - **[`DisabledEmbedder`]**: every call is `Unavailable`; used when
//!   `embedding.provider = "disabled"` or no API key is set.
//! - **[`OpenAIEmbedder`]**: calls `POST {url}/embeddings` with retry and
//!   backoff.
//!
//! Also provides the BLOB encoding used for the `restaurants.embedding`
//! column: [`vec_to_blob`] and [`blob_to_vec`].
//!
//! # Retry Strategy
//!
//! `embedding.max_retries` extra attempts are made for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, … (capped at 32s)

use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;

use belly_buzz_core::traits::{guard_embedding_input, DisabledEmbedder, Embedder};
use belly_buzz_core::CollaboratorError;

use crate::config::{secret, EmbeddingConfig, OPENAI_KEY_ENV};
use crate::http;

/// Embedder backed by the OpenAI embeddings API.
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
    dims: usize,
    timeout_secs: u64,
    max_retries: u32,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbeddingConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            client: http::client(config.timeout_secs, http::USER_AGENT)?,
            api_key,
            endpoint: format!("{}/embeddings", config.url.trim_end_matches('/')),
            model: config.model.clone(),
            dims: config.dims,
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, CollaboratorError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": guard_embedding_input(text),
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(http::backoff(attempt)).await;
            }

            let resp = self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| http::transport_error(e, self.timeout_secs))?;
                        return parse_embedding_response(&json, self.dims);
                    }
                    let err = http::api_error(response).await;
                    if !http::is_retryable(status) {
                        return Err(err);
                    }
                    last_err = Some(err);
                }
                Err(e) => last_err = Some(http::transport_error(e, self.timeout_secs)),
            }
        }

        Err(last_err
            .unwrap_or_else(|| CollaboratorError::Network("embedding failed after retries".into())))
    }
}

/// Extract `data[0].embedding` and check its width.
fn parse_embedding_response(
    json: &serde_json::Value,
    dims: usize,
) -> Result<Vec<f32>, CollaboratorError> {
    let embedding = json
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|d| d.first())
        .and_then(|item| item.get("embedding"))
        .and_then(|e| e.as_array())
        .ok_or_else(|| CollaboratorError::Parse("missing data[0].embedding".to_string()))?;

    let vec: Vec<f32> = embedding
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect();

    if vec.len() != dims {
        return Err(CollaboratorError::Parse(format!(
            "expected {} dimensions, got {}",
            dims,
            vec.len()
        )));
    }
    Ok(vec)
}

/// Build the embedder named by the config.
///
/// A missing `OPENAI_API_KEY` degrades to [`DisabledEmbedder`] with a
/// warning rather than failing the run.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>> {
    match config.provider.as_str() {
        "openai" => match secret(OPENAI_KEY_ENV) {
            Some(key) => Ok(Box::new(OpenAIEmbedder::new(config, key)?)),
            None => {
                warn!("{} not set; embeddings disabled for this run", OPENAI_KEY_ENV);
                Ok(Box::new(DisabledEmbedder))
            }
        },
        "disabled" => Ok(Box::new(DisabledEmbedder)),
        other => anyhow::bail!("Unknown embedding provider: {}", other),
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// ```rust
/// use belly_buzz::embedding::{blob_to_vec, vec_to_blob};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode a BLOB written by [`vec_to_blob`]. Trailing partial floats are dropped.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_embedding_response() {
        let body = json!({ "data": [ { "index": 0, "embedding": [0.25, -1.0, 0.5] } ] });
        assert_eq!(
            parse_embedding_response(&body, 3).unwrap(),
            vec![0.25, -1.0, 0.5]
        );
    }

    #[test]
    fn test_parse_rejects_wrong_width() {
        let body = json!({ "data": [ { "embedding": [0.1, 0.2] } ] });
        let err = parse_embedding_response(&body, 1536).unwrap_err();
        assert!(matches!(err, CollaboratorError::Parse(_)));
    }

    #[test]
    fn test_parse_rejects_missing_data() {
        let err = parse_embedding_response(&json!({ "error": "nope" }), 3).unwrap_err();
        assert!(matches!(err, CollaboratorError::Parse(_)));
    }

    #[test]
    fn test_blob_ignores_partial_tail() {
        let mut blob = vec_to_blob(&[1.5]);
        blob.push(0xff);
        assert_eq!(blob_to_vec(&blob), vec![1.5]);
    }

    #[test]
    fn test_disabled_provider() {
        let config = EmbeddingConfig::default();
        let embedder = create_embedder(&config).unwrap();
        assert_eq!(embedder.model_name(), "disabled");
    }
}
