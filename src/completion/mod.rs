//! Completion providers - prompt in, generated text out
//!
//! One non-streaming call per prompt at a fixed temperature. Failures are
//! returned as-is; there is no retry here, callers decide on fallbacks.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{api_key, http_client, CompletionConfig, ProviderKind};
use crate::error::ProviderError;

// ============================================================================
// CompletionProvider Trait
// ============================================================================

/// Text completion interface.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Generate text for `prompt`.
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError>;

    /// Provider/model name for logs.
    fn name(&self) -> &str;
}

// ============================================================================
// OpenAI Chat Completions
// ============================================================================

const OPENAI_PROVIDER: &str = "openai";
const OPENAI_DEFAULT_ENDPOINT: &str = "https://api.openai.com";
const OPENAI_DEFAULT_MODEL: &str = "gpt-4o-mini";

/// OpenAI `/v1/chat/completions` client. The prompt is sent as a single
/// user message.
#[derive(Debug)]
pub struct OpenAiCompletion {
    api_key: String,
    client: reqwest::Client,
    url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiCompletion {
    pub fn new(api_key: String, config: &CompletionConfig) -> Result<Self, ProviderError> {
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
            url: format!("{}/v1/chat/completions", endpoint),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| OPENAI_DEFAULT_MODEL.to_string()),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

fn first_choice(response: ChatResponse) -> Result<String, ProviderError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or(ProviderError::Empty {
            provider: OPENAI_PROVIDER,
        })
}

#[async_trait]
impl CompletionProvider for OpenAiCompletion {
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        tracing::debug!(model = %self.model, prompt_len = prompt.len(), "POST {}", self.url);

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::transport(OPENAI_PROVIDER, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::transport(OPENAI_PROVIDER, e))?;

        if !status.is_success() {
            return Err(ProviderError::Status {
                provider: OPENAI_PROVIDER,
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = serde_json::from_str(&body).map_err(|e| {
            ProviderError::decode(
                OPENAI_PROVIDER,
                format!("{e}; expected `choices[0].message.content`"),
            )
        })?;
        first_choice(parsed)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Google Gemini generateContent
// ============================================================================

const GEMINI_PROVIDER: &str = "gemini";
const GEMINI_DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
const GEMINI_DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Gemini `generateContent` client.
#[derive(Debug)]
pub struct GeminiCompletion {
    api_key: String,
    client: reqwest::Client,
    url: String,
    model: String,
    generation_config: GenerationConfig,
}

impl GeminiCompletion {
    pub fn new(api_key: String, config: &CompletionConfig) -> Result<Self, ProviderError> {
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
            url: format!("{}/models/{}:generateContent", endpoint, model),
            model,
            generation_config: GenerationConfig {
                temperature: config.temperature,
                max_output_tokens: config.max_tokens,
            },
        })
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<GenerateContent<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: &'a GenerationConfig,
}

#[derive(Debug, Serialize)]
struct GenerateContent<'a> {
    parts: Vec<GeneratePart<'a>>,
}

#[derive(Debug, Serialize)]
struct GeneratePart<'a> {
    text: &'a str,
}

#[derive(Debug, Clone, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<TextPart>,
}

#[derive(Debug, Deserialize)]
struct TextPart {
    #[serde(default)]
    text: String,
}

/// Concatenate the text parts of the first candidate.
fn candidate_text(response: GenerateResponse) -> Result<String, ProviderError> {
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .map(|c| c.content.parts.into_iter().map(|p| p.text).collect())
        .unwrap_or_default();

    if text.is_empty() {
        return Err(ProviderError::Empty {
            provider: GEMINI_PROVIDER,
        });
    }
    Ok(text)
}

#[async_trait]
impl CompletionProvider for GeminiCompletion {
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        let request = GenerateRequest {
            contents: vec![GenerateContent {
                parts: vec![GeneratePart { text: prompt }],
            }],
            generation_config: &self.generation_config,
        };

        tracing::debug!(model = %self.model, prompt_len = prompt.len(), "POST {}", self.url);

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

        let parsed: GenerateResponse =
            serde_json::from_str(&body).map_err(|e| ProviderError::decode(GEMINI_PROVIDER, e))?;
        candidate_text(parsed)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Factory Function
// ============================================================================

/// Build the configured completion provider, reading its API key from the
/// environment.
pub fn create_completer(
    config: &CompletionConfig,
) -> Result<Arc<dyn CompletionProvider>, ProviderError> {
    let key = api_key(config.provider.key_vars())?;
    let completer: Arc<dyn CompletionProvider> = match config.provider {
        ProviderKind::OpenAi => Arc::new(OpenAiCompletion::new(key, config)?),
        ProviderKind::Gemini => Arc::new(GeminiCompletion::new(key, config)?),
    };
    tracing::info!(
        "Using {} for completions (temperature: {})",
        completer.name(),
        config.temperature
    );
    Ok(completer)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_first_choice() {
        let parsed: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"We open at 9."}}]}"#,
        )
        .unwrap();
        assert_eq!(first_choice(parsed).unwrap(), "We open at 9.");

        let parsed: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(
            first_choice(parsed),
            Err(ProviderError::Empty { .. })
        ));
    }

    #[test]
    fn test_gemini_candidate_text_joins_parts() {
        let parsed: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"bill"},{"text":"ing"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(candidate_text(parsed).unwrap(), "billing");

        let parsed: GenerateResponse = serde_json::from_str(r#"{}"#).unwrap();
        assert!(candidate_text(parsed).is_err());
    }

    #[test]
    fn test_gemini_request_shape() {
        let config = GenerationConfig {
            temperature: 0.3,
            max_output_tokens: 256,
        };
        let request = GenerateRequest {
            contents: vec![GenerateContent {
                parts: vec![GeneratePart { text: "hi" }],
            }],
            generation_config: &config,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "hi");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 256);
    }

    #[test]
    fn test_openai_urls() {
        let config = CompletionConfig::default();
        let completer = OpenAiCompletion::new("k".to_string(), &config).unwrap();
        assert_eq!(completer.url, "https://api.openai.com/v1/chat/completions");
        assert_eq!(completer.temperature, 0.3);

        let config = CompletionConfig {
            provider: ProviderKind::Gemini,
            model: Some("gemini-1.5-pro".to_string()),
            ..Default::default()
        };
        let completer = GeminiCompletion::new("k".to_string(), &config).unwrap();
        assert!(completer.url.ends_with("/models/gemini-1.5-pro:generateContent"));
    }
}
