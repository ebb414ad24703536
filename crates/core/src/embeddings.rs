use crate::error::{EmbeddingError, IngestError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::warn;
use url::Url;

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_HASHING_DIMENSIONS: usize = 128;

const API_KEY_HEADER: &str = "x-goog-api-key";
const NORM_EPSILON: f64 = 1e-12;
const MAX_BACKOFF_DOUBLINGS: u32 = 5;

/// Boundary to the external embedding model. Implementations return the raw vector;
/// normalization belongs to [`EmbeddingClient`].
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn embed_raw(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

#[derive(Clone)]
pub struct GeminiEmbeddingService {
    client: Client,
    endpoint: Url,
    model: String,
    api_key: String,
}

impl fmt::Debug for GeminiEmbeddingService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiEmbeddingService")
            .field("endpoint", &self.endpoint.as_str())
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
struct EmbedContentRequest<'a> {
    model: &'a str,
    content: Content<'a>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: ContentEmbedding,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

impl GeminiEmbeddingService {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: &str,
        timeout: Duration,
    ) -> Result<Self, IngestError> {
        let model = model.trim();
        let model_path = model.strip_prefix("models/").unwrap_or(model);
        if model_path.is_empty() {
            return Err(IngestError::Config(
                "embedding model identifier is empty".to_string(),
            ));
        }

        // The key travels in a header so it never shows up in a logged request url.
        let endpoint = Url::parse(&format!(
            "{}/v1beta/models/{model_path}:embedContent",
            base_url.trim_end_matches('/')
        ))?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| IngestError::Config(format!("failed to build http client: {error}")))?;

        Ok(Self {
            client,
            endpoint,
            model: format!("models/{model_path}"),
            api_key: api_key.trim().to_string(),
        })
    }
}

#[async_trait]
impl EmbeddingService for GeminiEmbeddingService {
    async fn embed_raw(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let payload = EmbedContentRequest {
            model: &self.model,
            content: Content {
                parts: [Part { text }],
            },
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .header(API_KEY_HEADER, &self.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            let message = format!("{} returned {status}: {body}", self.model);
            return Err(if is_retryable_status(status) {
                EmbeddingError::Transient(message)
            } else {
                EmbeddingError::Permanent(message)
            });
        }

        let parsed: EmbedContentResponse = response.json().await?;
        Ok(parsed.embedding.values)
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Offline character-trigram hashing embedder. Deterministic, needs no credential.
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbeddingService {
    pub dimensions: usize,
}

impl Default for HashingEmbeddingService {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_HASHING_DIMENSIONS,
        }
    }
}

impl HashingEmbeddingService {
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let chars: Vec<char> = text.to_lowercase().chars().collect();

        for window in chars.windows(3) {
            let mut hash = 1469598103934665603u64;
            for ch in window {
                let mut buf = [0u8; 4];
                for byte in ch.encode_utf8(&mut buf).bytes() {
                    hash ^= byte as u64;
                    hash = hash.wrapping_mul(1099511628211);
                }
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        // Texts shorter than a trigram still get a non-zero direction.
        if chars.len() < 3 {
            let slot = chars.len() % vector.len();
            vector[slot] += 1.0;
        }

        vector
    }
}

#[async_trait]
impl EmbeddingService for HashingEmbeddingService {
    async fn embed_raw(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.embed_sync(text))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. Zero disables retrying.
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: crate::models::DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (1-based): `base * 2^(attempt - 1)`, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let doublings = attempt.saturating_sub(1).min(MAX_BACKOFF_DOUBLINGS);
        self.base_delay.saturating_mul(1 << doublings)
    }
}

/// Calls an [`EmbeddingService`], retries transient failures and returns unit vectors.
#[derive(Debug, Clone)]
pub struct EmbeddingClient<S> {
    service: S,
    retry: RetryPolicy,
}

impl<S: EmbeddingService> EmbeddingClient<S> {
    pub fn new(service: S, retry: RetryPolicy) -> Self {
        Self { service, retry }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut attempt = 0u32;
        loop {
            match self.service.embed_raw(text).await {
                Ok(raw) => return normalize_checked(raw),
                Err(error) if error.is_transient() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        attempt,
                        max_retries = self.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        %error,
                        "retrying embedding request"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

fn normalize_checked(raw: Vec<f32>) -> Result<Vec<f32>, EmbeddingError> {
    if raw.is_empty() {
        return Err(EmbeddingError::Malformed(
            "service returned an empty vector".to_string(),
        ));
    }
    if let Some(position) = raw.iter().position(|value| !value.is_finite()) {
        return Err(EmbeddingError::Malformed(format!(
            "component {position} is not a finite number"
        )));
    }
    Ok(l2_normalize(&raw))
}

/// `v / (||v||_2 + 1e-12)`, accumulated in f64.
pub fn l2_normalize(vector: &[f32]) -> Vec<f32> {
    let denominator = l2_norm(vector) + NORM_EPSILON;
    vector
        .iter()
        .map(|value| (f64::from(*value) / denominator) as f32)
        .collect()
}

pub fn l2_norm(vector: &[f32]) -> f64 {
    vector
        .iter()
        .map(|value| f64::from(*value) * f64::from(*value))
        .sum::<f64>()
        .sqrt()
}
