//! Embedding providers - text to vector through a remote API
//!
//! The knowledge index and every query must go through the same provider,
//! otherwise similarities are meaningless.
//!
//! ## Usage
//! ```rust,ignore
//! let embedder = create_embedder(&config.embedding)?;
//! let embedding = embedder.embed("When are you open?").await?;
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::{api_key, http_client, EmbeddingConfig, ProviderKind};
use crate::error::ProviderError;

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// Text embedding interface.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;

    /// Embed many texts, preserving order. Default: one call per text.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Output dimension.
    fn dimension(&self) -> usize;

    /// Provider/model name for logs.
    fn name(&self) -> &str;
}

// ============================================================================
// Rate Limiter
// ============================================================================

/// Sliding-window request limiter with a minimum gap between calls.
#[derive(Debug)]
pub(crate) struct RateLimiter {
    requests: Vec<Instant>,
    max_requests: u32,
    window: Duration,
    min_delay: Duration,
    last_request: Option<Instant>,
}

impl RateLimiter {
    pub(crate) fn new(max_requests: u32, window: Duration) -> Self {
        let min_delay = window / max_requests.max(1);
        Self {
            requests: Vec::new(),
            max_requests,
            window,
            min_delay,
            last_request: None,
        }
    }

    pub(crate) fn per_minute(rpm: u32) -> Self {
        Self::new(rpm, Duration::from_secs(60))
    }

    /// Wait until one more request fits the budget, then record it.
    pub(crate) async fn acquire(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_delay {
                let wait_time = self.min_delay - elapsed;
                tracing::debug!("Min delay: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        let now = Instant::now();
        self.requests.retain(|&t| now.duration_since(t) < self.window);

        if self.requests.len() >= self.max_requests as usize {
            if let Some(&oldest) = self.requests.first() {
                let wait_time = self.window.saturating_sub(now.duration_since(oldest));
                if !wait_time.is_zero() {
                    tracing::debug!("Rate limit reached, waiting {:?}", wait_time);
                    tokio::time::sleep(wait_time).await;
                }
                let now = Instant::now();
                self.requests.retain(|&t| now.duration_since(t) < self.window);
            }
        }

        let now = Instant::now();
        self.requests.push(now);
        self.last_request = Some(now);
    }
}

async fn throttle(limiter: &Option<Arc<Mutex<RateLimiter>>>) {
    if let Some(limiter) = limiter {
        limiter.lock().await.acquire().await;
    }
}

// ============================================================================
// OpenAI Embedding
// ============================================================================

const OPENAI_PROVIDER: &str = "openai-embedding";
const OPENAI_DEFAULT_ENDPOINT: &str = "https://api.openai.com";
const OPENAI_DEFAULT_MODEL: &str = "text-embedding-ada-002";
const OPENAI_DEFAULT_DIMENSION: usize = 1536;

/// OpenAI `/v1/embeddings` client. Batches are sent as one `input` array.
#[derive(Debug)]
pub struct OpenAiEmbedding {
    api_key: String,
    client: reqwest::Client,
    url: String,
    model: String,
    dimension: usize,
    /// Only sent when configured; older models reject the parameter.
    requested_dimensions: Option<usize>,
    batch_size: usize,
    rate_limiter: Option<Arc<Mutex<RateLimiter>>>,
}

impl OpenAiEmbedding {
    pub fn new(api_key: String, config: &EmbeddingConfig) -> Result<Self, ProviderError> {
        let endpoint = config
            .endpoint
            .as_deref()
            .unwrap_or(OPENAI_DEFAULT_ENDPOINT)
            .trim_end_matches('/');
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(ProviderError::InvalidConfig {
                provider: OPENAI_PROVIDER,
                reason: format!("endpoint must start with http:// or https://: {}", endpoint),
            });
        }

        Ok(Self {
            api_key,
            client: http_client(config.timeout_secs, OPENAI_PROVIDER)?,
            url: format!("{}/v1/embeddings", endpoint),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| OPENAI_DEFAULT_MODEL.to_string()),
            dimension: config.dims.unwrap_or(OPENAI_DEFAULT_DIMENSION),
            requested_dimensions: config.dims,
            batch_size: config.batch_size.max(1),
            rate_limiter: config
                .requests_per_minute
                .map(|rpm| Arc::new(Mutex::new(RateLimiter::per_minute(rpm)))),
        })
    }

    async fn request(&self, input: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        throttle(&self.rate_limiter).await;

        let body = OpenAiEmbedRequest {
            model: &self.model,
            input,
            dimensions: self.requested_dimensions,
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::transport(OPENAI_PROVIDER, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::transport(OPENAI_PROVIDER, e))?;

        if !status.is_success() {
            return Err(ProviderError::Status {
                provider: OPENAI_PROVIDER,
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: OpenAiEmbedResponse =
            serde_json::from_str(&text).map_err(|e| ProviderError::decode(OPENAI_PROVIDER, e))?;
        order_by_index(parsed.data, input.len())
    }
}

#[derive(Debug, Serialize)]
struct OpenAiEmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbedResponse {
    data: Vec<OpenAiEmbedData>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbedData {
    index: usize,
    embedding: Vec<f32>,
}

/// The API may return items out of order; put them back by `index`.
fn order_by_index(
    mut data: Vec<OpenAiEmbedData>,
    expected: usize,
) -> Result<Vec<Vec<f32>>, ProviderError> {
    if data.len() != expected {
        return Err(ProviderError::decode(
            OPENAI_PROVIDER,
            format!("expected {} embeddings, got {}", expected, data.len()),
        ));
    }
    data.sort_by_key(|d| d.index);
    Ok(data.into_iter().map(|d| d.embedding).collect())
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }
        let mut vectors = self.request(&[text.to_string()]).await?;
        vectors.pop().ok_or(ProviderError::Empty {
            provider: OPENAI_PROVIDER,
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let mut results = Vec::with_capacity(texts.len());
        for (i, batch) in texts.chunks(self.batch_size).enumerate() {
            tracing::debug!(
                "Embedding batch {} ({} texts) with {}",
                i + 1,
                batch.len(),
                self.model
            );
            results.extend(self.request(batch).await?);
        }
        Ok(results)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Google Gemini Embedding
// ============================================================================

const GEMINI_PROVIDER: &str = "gemini-embedding";
const GEMINI_DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
const GEMINI_DEFAULT_MODEL: &str = "gemini-embedding-001";
const GEMINI_DEFAULT_DIMENSION: usize = 768;

/// Gemini `embedContent` client. The API has no batch call, so batches are
/// sent one text at a time.
#[derive(Debug)]
pub struct GeminiEmbedding {
    api_key: String,
    client: reqwest::Client,
    url: String,
    model: String,
    dimension: usize,
    rate_limiter: Option<Arc<Mutex<RateLimiter>>>,
}

impl GeminiEmbedding {
    pub fn new(api_key: String, config: &EmbeddingConfig) -> Result<Self, ProviderError> {
        let dimension = config.dims.unwrap_or(GEMINI_DEFAULT_DIMENSION);
        if ![768, 1536, 3072].contains(&dimension) {
            return Err(ProviderError::InvalidConfig {
                provider: GEMINI_PROVIDER,
                reason: format!("Invalid dimension: {}. Must be 768, 1536, or 3072", dimension),
            });
        }

        let model = config
            .model
            .clone()
            .unwrap_or_else(|| GEMINI_DEFAULT_MODEL.to_string());
        let endpoint = config
            .endpoint
            .as_deref()
            .unwrap_or(GEMINI_DEFAULT_ENDPOINT)
            .trim_end_matches('/');

        Ok(Self {
            api_key,
            client: http_client(config.timeout_secs, GEMINI_PROVIDER)?,
            url: format!("{}/models/{}:embedContent", endpoint, model),
            model,
            dimension,
            rate_limiter: config
                .requests_per_minute
                .map(|rpm| Arc::new(Mutex::new(RateLimiter::per_minute(rpm)))),
        })
    }
}

#[derive(Debug, Serialize)]
struct GeminiEmbedRequest {
    model: String,
    content: GeminiContent,
    #[serde(rename = "outputDimensionality")]
    output_dimensionality: usize,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GeminiEmbedResponse {
    embedding: GeminiValues,
}

#[derive(Debug, Deserialize)]
struct GeminiValues {
    values: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }

        throttle(&self.rate_limiter).await;

        let request = GeminiEmbedRequest {
            model: format!("models/{}", self.model),
            content: GeminiContent {
                parts: vec![GeminiPart {
                    text: text.to_string(),
                }],
            },
            output_dimensionality: self.dimension,
        };

        // key goes in a header, never in the URL
        let response = self
            .client
            .post(&self.url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::transport(GEMINI_PROVIDER, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::transport(GEMINI_PROVIDER, e))?;

        if !status.is_success() {
            return Err(ProviderError::Status {
                provider: GEMINI_PROVIDER,
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GeminiEmbedResponse =
            serde_json::from_str(&body).map_err(|e| ProviderError::decode(GEMINI_PROVIDER, e))?;
        Ok(parsed.embedding.values)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Factory Function
// ============================================================================

/// Build the configured embedding provider, reading its API key from the
/// environment.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>, ProviderError> {
    let key = api_key(config.provider.key_vars())?;
    let embedder: Arc<dyn EmbeddingProvider> = match config.provider {
        ProviderKind::OpenAi => Arc::new(OpenAiEmbedding::new(key, config)?),
        ProviderKind::Gemini => Arc::new(GeminiEmbedding::new(key, config)?),
    };
    tracing::info!(
        "Using {} embeddings (dimension: {})",
        embedder.name(),
        embedder.dimension()
    );
    Ok(embedder)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn gemini_config(dims: Option<usize>) -> EmbeddingConfig {
        EmbeddingConfig {
            provider: ProviderKind::Gemini,
            dims,
            ..Default::default()
        }
    }

    #[test]
    fn test_gemini_invalid_dimension() {
        let result = GeminiEmbedding::new("fake_key".to_string(), &gemini_config(Some(999)));
        let err = result.err().map(|e| e.to_string()).unwrap_or_default();
        assert!(err.contains("Invalid dimension"));
    }

    #[test]
    fn test_gemini_valid_dimensions() {
        for dim in [768, 1536, 3072] {
            let embedder = GeminiEmbedding::new("fake_key".to_string(), &gemini_config(Some(dim)));
            assert_eq!(embedder.map(|e| e.dimension()).ok(), Some(dim));
        }
    }

    #[test]
    fn test_openai_rejects_bad_endpoint() {
        let config = EmbeddingConfig {
            endpoint: Some("api.openai.com".to_string()),
            ..Default::default()
        };
        assert!(OpenAiEmbedding::new("k".to_string(), &config).is_err());
    }

    #[test]
    fn test_openai_url_and_defaults() {
        let config = EmbeddingConfig {
            endpoint: Some("http://localhost:8080/".to_string()),
            ..Default::default()
        };
        let embedder = OpenAiEmbedding::new("k".to_string(), &config).unwrap();
        assert_eq!(embedder.url, "http://localhost:8080/v1/embeddings");
        assert_eq!(embedder.dimension(), 1536);
        assert_eq!(embedder.name(), "text-embedding-ada-002");
    }

    #[tokio::test]
    async fn test_empty_text_skips_the_network() {
        let config = EmbeddingConfig {
            endpoint: Some("http://127.0.0.1:9".to_string()),
            dims: Some(8),
            ..Default::default()
        };
        let embedder = OpenAiEmbedding::new("k".to_string(), &config).unwrap();
        let vector = embedder.embed("   ").await.unwrap();
        assert_eq!(vector, vec![0.0; 8]);
    }

    #[test]
    fn test_order_by_index() {
        let data = vec![
            OpenAiEmbedData {
                index: 1,
                embedding: vec![2.0],
            },
            OpenAiEmbedData {
                index: 0,
                embedding: vec![1.0],
            },
        ];
        assert_eq!(order_by_index(data, 2).unwrap(), vec![vec![1.0], vec![2.0]]);
        assert!(order_by_index(vec![], 1).is_err());
    }

    #[tokio::test]
    async fn test_rate_limiter_spaces_requests() {
        let mut limiter = RateLimiter::new(2, Duration::from_millis(100));
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        // min gap is window / max_requests = 50ms
        assert!(start.elapsed() >= Duration::from_millis(100));
    }
}
