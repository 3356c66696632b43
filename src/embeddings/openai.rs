use crate::cache::EmbeddingCache;
use crate::config::EmbeddingsConfig;
use crate::error::{GraphReaderError, Result};
use futures_util::future::BoxFuture;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::Embedder;

/// OpenAI rejects larger batches.
const MAX_BATCH_SIZE: usize = 2048;

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

/// A failed request and whether it is worth repeating.
struct RequestFailure {
    retryable: bool,
    error: GraphReaderError,
}

impl RequestFailure {
    fn fatal(error: GraphReaderError) -> Self {
        Self { retryable: false, error }
    }
}

pub(crate) fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// OpenAI embeddings client
///
/// Batches requests, retries 429/5xx with exponential backoff and optionally
/// caches single-text embeddings.
pub struct OpenAIEmbedder {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    batch_size: usize,
    dimensions: Option<usize>,
    max_retries: usize,
    cache: Option<Arc<EmbeddingCache>>,
}

impl OpenAIEmbedder {
    pub fn new(api_key: String, model: String, batch_size: usize) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| GraphReaderError::Embedding(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            base_url: "https://api.openai.com/v1".to_string(),
            model,
            batch_size: batch_size.clamp(1, MAX_BATCH_SIZE),
            dimensions: None,
            max_retries: 3,
            cache: None,
        })
    }

    /// Build from the `[embeddings]` config section.
    pub fn from_config(
        config: &EmbeddingsConfig,
        api_key: String,
        cache: Option<Arc<EmbeddingCache>>,
    ) -> Result<Self> {
        let mut embedder = Self::new(api_key, config.model.clone(), config.batch_size)?;
        embedder.base_url = config.base_url.trim_end_matches('/').to_string();
        embedder.dimensions = Some(config.dimensions);
        embedder.cache = cache;
        Ok(embedder)
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    async fn request(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, RequestFailure> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
            dimensions: self.dimensions,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| RequestFailure {
                retryable: e.is_timeout() || e.is_connect(),
                error: GraphReaderError::Embedding(format!("Network error: {}", e)),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(RequestFailure {
                retryable: is_retryable(status),
                error: GraphReaderError::Embedding(format!("OpenAI API error {}: {}", status, body)),
            });
        }

        let mut result: EmbeddingResponse = response.json().await.map_err(|e| {
            RequestFailure::fatal(GraphReaderError::Embedding(format!("Failed to parse response: {}", e)))
        })?;

        if result.data.len() != texts.len() {
            return Err(RequestFailure::fatal(GraphReaderError::Embedding(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                result.data.len()
            ))));
        }
        result.data.sort_by_key(|d| d.index);
        Ok(result.data.into_iter().map(|d| d.embedding).collect())
    }

    async fn request_with_retry(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let start = std::time::Instant::now();
        let mut attempt = 0;
        let mut delay = Duration::from_secs(1);

        loop {
            match self.request(texts).await {
                Ok(embeddings) => {
                    log::debug!(
                        "Embedding API call for {} texts took {:?} (attempt {})",
                        texts.len(),
                        start.elapsed(),
                        attempt + 1
                    );
                    return Ok(embeddings);
                }
                Err(failure) if failure.retryable && attempt < self.max_retries => {
                    log::warn!("Retry {}/{} after error: {}", attempt + 1, self.max_retries, failure.error);
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(failure) => return Err(failure.error),
            }
        }
    }

    async fn embed_cached(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get(text) {
                log::debug!("Embedding cache hit ({} chars)", text.len());
                return Ok(cached);
            }
        }

        let mut embeddings = self.request_with_retry(&[text.to_string()]).await?;
        let embedding = embeddings
            .pop()
            .ok_or_else(|| GraphReaderError::Embedding("Empty response from OpenAI API".to_string()))?;

        if let Some(cache) = &self.cache {
            cache.put(text.to_string(), embedding.clone());
        }
        Ok(embedding)
    }

    async fn embed_all(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut all_embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            all_embeddings.extend(self.request_with_retry(batch).await?);

            // Small pause between full batches keeps us under rate limits
            if batch.len() == self.batch_size {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
        Ok(all_embeddings)
    }
}

impl Embedder for OpenAIEmbedder {
    fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<f32>>> {
        Box::pin(self.embed_cached(text))
    }

    fn embed_batch<'a>(&'a self, texts: &'a [String]) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
        Box::pin(self.embed_all(texts))
    }
}
