//! Answer generation: generative model boundary with retry and timeout

use crate::error::GenerationError;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bounded exponential backoff for transient generation failures.
///
/// Defaults: 3 retries on top of the initial attempt, 500 ms base delay
/// doubling per retry (500 ms, 1 s, 2 s).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum retries after the initial attempt
    pub max_retries: u32,
    /// Base backoff delay in milliseconds, doubled per retry
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
        }
    }
}

impl RetryPolicy {
    /// Backoff delay before the given retry (0-indexed)
    #[must_use]
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        Duration::from_millis(self.base_delay_ms.saturating_mul(1u64 << retry.min(16)))
    }
}

/// Trait for answer generators wrapping a generative language model
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// Generate an answer for the assembled prompt.
    ///
    /// A single attempt: failures are classified as transient or fatal
    /// via [`GenerationError`]; retrying is the caller's concern.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Identifier of the backing model
    fn model_id(&self) -> &str;
}

/// Drive a generator with bounded retries.
///
/// Transient failures are retried with exponential backoff up to the
/// policy bound, then surface as `GenerationUnavailable`. Fatal failures
/// surface immediately, never retried.
pub async fn generate_with_retry(
    generator: &dyn AnswerGenerator,
    prompt: &str,
    policy: &RetryPolicy,
) -> Result<String> {
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        match generator.generate(prompt).await {
            Ok(text) => return Ok(text),
            Err(e) if e.is_transient() => {
                if attempts > policy.max_retries {
                    tracing::warn!(attempts, "generation retries exhausted");
                    return Err(Error::GenerationUnavailable { attempts });
                }
                let delay = policy.backoff_delay(attempts - 1);
                tracing::warn!(
                    attempt = attempts,
                    delay_ms = delay.as_millis() as u64,
                    "transient generation failure, backing off"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

// ============================================================================
// Gemini HTTP generator
// ============================================================================

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// Configuration for the Gemini generator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// API key
    pub api_key: String,
    /// Model name (e.g. "gemini-1.5-flash")
    pub model: String,
    /// API base URL
    pub api_base: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Maximum output tokens
    pub max_output_tokens: Option<u32>,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: std::env::var("GEMINI_API_KEY").unwrap_or_default(),
            model: DEFAULT_MODEL.to_string(),
            api_base: GEMINI_API_BASE.to_string(),
            timeout_secs: 30,
            temperature: Some(0.2),
            max_output_tokens: Some(1024),
        }
    }
}

#[derive(Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GeminiGenerationConfig>,
}

#[derive(Serialize, Deserialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize)]
struct GeminiPart {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

/// Answer generator backed by the Gemini API.
///
/// Each request carries the configured timeout; failures are classified
/// per status: 408/429/5xx and connection or timeout errors are
/// transient, other client errors are fatal.
pub struct GeminiGenerator {
    config: GeminiConfig,
    client: reqwest::Client,
}

impl std::fmt::Debug for GeminiGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiGenerator")
            .field("model", &self.config.model)
            .field("timeout_secs", &self.config.timeout_secs)
            .finish_non_exhaustive()
    }
}

impl GeminiGenerator {
    /// Create a new Gemini generator
    ///
    /// # Errors
    /// Fails with a configuration error when the API key is empty or the
    /// HTTP client cannot be constructed.
    pub fn new(config: GeminiConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(Error::Configuration(
                "Gemini API key is required; set GEMINI_API_KEY".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Create from the `GEMINI_API_KEY` environment variable
    ///
    /// # Errors
    /// Fails with a configuration error when the variable is unset.
    pub fn from_env() -> Result<Self> {
        Self::new(GeminiConfig::default())
    }

    fn classify_send_error(e: &reqwest::Error) -> GenerationError {
        if e.is_timeout() || e.is_connect() {
            GenerationError::Transient(format!("request failed: {e}"))
        } else {
            GenerationError::Fatal(format!("request failed: {e}"))
        }
    }

    fn classify_status(status: reqwest::StatusCode, body: &str) -> GenerationError {
        if status == reqwest::StatusCode::REQUEST_TIMEOUT
            || status == reqwest::StatusCode::TOO_MANY_REQUESTS
            || status.is_server_error()
        {
            GenerationError::Transient(format!("API error ({status}): {body}"))
        } else {
            GenerationError::Fatal(format!("API error ({status}): {body}"))
        }
    }
}

#[async_trait]
impl AnswerGenerator for GeminiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: Some(GeminiGenerationConfig {
                temperature: self.config.temperature,
                max_output_tokens: self.config.max_output_tokens,
            }),
        };

        let url = format!(
            "{}/models/{}:generateContent",
            self.config.api_base, self.config.model
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Generation(Self::classify_send_error(&e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(Error::Generation(Self::classify_status(status, &body)));
        }

        let parsed: GeminiResponse = response.json().await.map_err(|e| {
            Error::Generation(GenerationError::Fatal(format!(
                "failed to parse API response: {e}"
            )))
        })?;

        let text = parsed
            .candidates
            .unwrap_or_default()
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .map(|p| p.text)
            .collect::<Vec<_>>()
            .join("");

        if text.is_empty() {
            return Err(Error::Generation(GenerationError::Fatal(
                "API response contained no answer text".to_string(),
            )));
        }

        Ok(text)
    }

    fn model_id(&self) -> &str {
        &self.config.model
    }
}

// ============================================================================
// Test doubles
// ============================================================================

/// Deterministic generator returning a canned answer; for tests and
/// offline demos
#[derive(Debug, Clone)]
pub struct MockGenerator {
    response: String,
}

impl MockGenerator {
    /// Create a mock generator with a canned response
    #[must_use]
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
        }
    }
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new("This answer was produced without a generative model.")
    }
}

#[async_trait]
impl AnswerGenerator for MockGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        Ok(self.response.clone())
    }

    fn model_id(&self) -> &str {
        "mock-generator"
    }
}

/// Generator that fails a configured number of times before succeeding;
/// exercises the retry path
#[derive(Debug)]
pub struct FlakyGenerator {
    remaining_failures: std::sync::atomic::AtomicU32,
    error: GenerationError,
    calls: std::sync::atomic::AtomicU32,
}

impl FlakyGenerator {
    /// Create a generator that fails `failures` times with `error`, then
    /// answers successfully
    #[must_use]
    pub fn new(failures: u32, error: GenerationError) -> Self {
        Self {
            remaining_failures: std::sync::atomic::AtomicU32::new(failures),
            error,
            calls: std::sync::atomic::AtomicU32::new(0),
        }
    }

    /// Total generate calls observed
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl AnswerGenerator for FlakyGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        use std::sync::atomic::Ordering;

        self.calls.fetch_add(1, Ordering::SeqCst);

        let remaining = self.remaining_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.remaining_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::Generation(self.error.clone()));
        }

        Ok("recovered answer".to_string())
    }

    fn model_id(&self) -> &str {
        "flaky-generator"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay_ms: 1,
        }
    }

    // ============ RetryPolicy Tests ============

    #[test]
    fn test_retry_policy_default() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.base_delay_ms, 500);
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay_ms: 100,
        };

        assert_eq!(policy.backoff_delay(0), Duration::from_millis(100));
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(200));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(400));
    }

    // ============ MockGenerator Tests ============

    #[tokio::test]
    async fn test_mock_generator() {
        let generator = MockGenerator::new("canned answer");
        let answer = generator.generate("any prompt").await.unwrap();
        assert_eq!(answer, "canned answer");
        assert_eq!(generator.model_id(), "mock-generator");
    }

    // ============ Retry Driver Tests ============

    #[tokio::test]
    async fn test_retry_succeeds_first_attempt() {
        let generator = MockGenerator::new("ok");
        let answer = generate_with_retry(&generator, "prompt", &fast_policy(3))
            .await
            .unwrap();
        assert_eq!(answer, "ok");
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient() {
        let generator = FlakyGenerator::new(2, GenerationError::Transient("503".to_string()));
        let answer = generate_with_retry(&generator, "prompt", &fast_policy(3))
            .await
            .unwrap();

        assert_eq!(answer, "recovered answer");
        assert_eq!(generator.calls(), 3);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_yields_unavailable() {
        let generator = FlakyGenerator::new(10, GenerationError::Transient("429".to_string()));
        let result = generate_with_retry(&generator, "prompt", &fast_policy(3)).await;

        match result {
            Err(Error::GenerationUnavailable { attempts }) => {
                // Initial attempt plus exactly max_retries retries
                assert_eq!(attempts, 4);
            }
            other => panic!("expected GenerationUnavailable, got {other:?}"),
        }
        assert_eq!(generator.calls(), 4);
    }

    #[tokio::test]
    async fn test_fatal_never_retried() {
        let generator = FlakyGenerator::new(10, GenerationError::Fatal("401".to_string()));
        let result = generate_with_retry(&generator, "prompt", &fast_policy(3)).await;

        assert!(matches!(
            result,
            Err(Error::Generation(GenerationError::Fatal(_)))
        ));
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn test_zero_retries_fails_immediately_as_unavailable() {
        let generator = FlakyGenerator::new(10, GenerationError::Transient("503".to_string()));
        let result = generate_with_retry(&generator, "prompt", &fast_policy(0)).await;

        match result {
            Err(Error::GenerationUnavailable { attempts }) => assert_eq!(attempts, 1),
            other => panic!("expected GenerationUnavailable, got {other:?}"),
        }
        assert_eq!(generator.calls(), 1);
    }

    // ============ Gemini Classification Tests ============

    #[test]
    fn test_gemini_requires_api_key() {
        let config = GeminiConfig {
            api_key: String::new(),
            ..Default::default()
        };
        assert!(matches!(
            GeminiGenerator::new(config),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_gemini_status_classification() {
        use reqwest::StatusCode;

        assert!(matches!(
            GeminiGenerator::classify_status(StatusCode::TOO_MANY_REQUESTS, "rate limited"),
            GenerationError::Transient(_)
        ));
        assert!(matches!(
            GeminiGenerator::classify_status(StatusCode::SERVICE_UNAVAILABLE, "down"),
            GenerationError::Transient(_)
        ));
        assert!(matches!(
            GeminiGenerator::classify_status(StatusCode::REQUEST_TIMEOUT, "slow"),
            GenerationError::Transient(_)
        ));
        assert!(matches!(
            GeminiGenerator::classify_status(StatusCode::UNAUTHORIZED, "bad key"),
            GenerationError::Fatal(_)
        ));
        assert!(matches!(
            GeminiGenerator::classify_status(StatusCode::BAD_REQUEST, "malformed"),
            GenerationError::Fatal(_)
        ));
    }

    #[test]
    fn test_gemini_request_serialization() {
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: "prompt text".to_string(),
                }],
            }],
            generation_config: Some(GeminiGenerationConfig {
                temperature: Some(0.2),
                max_output_tokens: Some(256),
            }),
        };

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"contents\""));
        assert!(json.contains("\"generationConfig\""));
        assert!(json.contains("\"maxOutputTokens\":256"));
        assert!(json.contains("prompt text"));
    }

    #[test]
    fn test_gemini_response_parsing() {
        let json = r#"{
            "candidates": [
                {"content": {"parts": [{"text": "Hello "}, {"text": "world"}]}}
            ]
        }"#;

        let parsed: GeminiResponse = serde_json::from_str(json).unwrap();
        let text: String = parsed
            .candidates
            .unwrap()
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .map(|p| p.text)
            .collect();
        assert_eq!(text, "Hello world");
    }

    #[test]
    fn test_gemini_response_empty_candidates() {
        let parsed: GeminiResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.candidates.is_none());
    }
}
