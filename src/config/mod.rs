//! Configuration
//!
//! Settings come from an optional TOML file; every section and key has a
//! default so the service starts with no file at all. API keys are never
//! read from the file, only from the environment (see [`api_key`]).

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub knowledge: KnowledgeConfig,
    pub completion: CompletionConfig,
    pub embedding: EmbeddingConfig,
    pub voice: VoiceConfig,
    pub faq: FaqConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KnowledgeConfig {
    /// Directory holding the knowledge base text files.
    pub dir: PathBuf,
    /// File names (relative to `dir`) loaded on every rebuild, in order.
    pub files: Vec<String>,
    /// File new FAQ entries are appended to.
    pub faq_file: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data/knowledge_base"),
            files: vec![
                "faq.txt".to_string(),
                "products.txt".to_string(),
                "support.txt".to_string(),
            ],
            faq_file: "faq.txt".to_string(),
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

impl KnowledgeConfig {
    pub fn file_paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|f| self.dir.join(f)).collect()
    }

    pub fn faq_path(&self) -> PathBuf {
        self.dir.join(&self.faq_file)
    }
}

/// Remote AI provider family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    OpenAi,
    Gemini,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    pub provider: ProviderKind,
    /// Model name; provider default when unset.
    pub model: Option<String>,
    /// Base URL override (e.g. an OpenAI-compatible gateway).
    pub endpoint: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::OpenAi,
            model: None,
            endpoint: None,
            temperature: 0.3,
            max_tokens: 512,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: ProviderKind,
    pub model: Option<String>,
    pub endpoint: Option<String>,
    /// Output dimension; provider default when unset.
    pub dims: Option<usize>,
    pub batch_size: usize,
    /// Client-side request budget. Unlimited when unset.
    pub requests_per_minute: Option<u32>,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::OpenAi,
            model: None,
            endpoint: None,
            dims: None,
            batch_size: 64,
            requests_per_minute: None,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub endpoint: String,
    pub voice_id: String,
    pub model_id: String,
    pub stability: f32,
    pub similarity_boost: f32,
    pub style: f32,
    pub use_speaker_boost: bool,
    pub timeout_secs: u64,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.elevenlabs.io/v1".to_string(),
            voice_id: "21m00Tcm4TlvDq8ikWAM".to_string(),
            model_id: "eleven_monolingual_v1".to_string(),
            stability: 0.5,
            similarity_boost: 0.75,
            style: 0.0,
            use_speaker_boost: true,
            timeout_secs: 60,
        }
    }
}

pub const DEFAULT_BUSINESS_INFO: &str = "We are a small business focused on providing excellent customer service.
Our business hours are Monday-Friday 9AM-5PM.
We aim to respond to all inquiries within 24 hours.
For urgent matters, please call our support line.";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FaqConfig {
    /// Static business description injected into every answer prompt.
    pub business_info: String,
    /// Ask the completion service for a question category before answering.
    pub classify_questions: bool,
}

impl Default for FaqConfig {
    fn default() -> Self {
        Self {
            business_info: DEFAULT_BUSINESS_INFO.to_string(),
            classify_questions: true,
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

impl Config {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, or use defaults when no path is given.
    ///
    /// `HOST`/`PORT` and `ELEVENLABS_VOICE_ID` from the environment override
    /// the file.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {}", path.display()))?;
                Self::from_toml_str(&content)?
            }
            None => Config::default(),
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        let host = non_empty_env("HOST");
        let port = non_empty_env("PORT");
        if host.is_some() || port.is_some() {
            let (default_host, default_port) = self
                .server
                .bind
                .rsplit_once(':')
                .map(|(h, p)| (h.to_string(), p.to_string()))
                .unwrap_or_else(|| ("0.0.0.0".to_string(), "8000".to_string()));
            self.server.bind = format!(
                "{}:{}",
                host.unwrap_or(default_host),
                port.unwrap_or(default_port)
            );
        }

        if let Some(voice_id) = non_empty_env("ELEVENLABS_VOICE_ID") {
            self.voice.voice_id = voice_id;
        }
    }

    pub fn validate(&self) -> Result<()> {
        let k = &self.knowledge;
        if k.chunk_size == 0 {
            bail!("knowledge.chunk_size must be > 0");
        }
        if k.chunk_overlap >= k.chunk_size {
            bail!(
                "knowledge.chunk_overlap ({}) must be smaller than knowledge.chunk_size ({})",
                k.chunk_overlap,
                k.chunk_size
            );
        }
        if k.files.is_empty() {
            bail!("knowledge.files must list at least one file");
        }
        if !k.files.contains(&k.faq_file) {
            bail!(
                "knowledge.faq_file ({}) must be one of knowledge.files, or added entries are never indexed",
                k.faq_file
            );
        }

        if !(0.0..=2.0).contains(&self.completion.temperature) {
            bail!("completion.temperature must be in [0.0, 2.0]");
        }
        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }
        if self.embedding.dims == Some(0) {
            bail!("embedding.dims must be > 0 when set");
        }
        if self.embedding.requests_per_minute == Some(0) {
            bail!("embedding.requests_per_minute must be > 0 when set");
        }

        let v = &self.voice;
        for (name, value) in [
            ("voice.stability", v.stability),
            ("voice.similarity_boost", v.similarity_boost),
            ("voice.style", v.style),
        ] {
            if !(0.0..=1.0).contains(&value) {
                bail!("{} must be in [0.0, 1.0]", name);
            }
        }
        if v.voice_id.trim().is_empty() {
            bail!("voice.voice_id must not be empty");
        }

        Ok(())
    }
}

// ============================================================================
// API Key Management
// ============================================================================

/// Read the first non-empty variable among `vars`.
///
/// The error names the first variable, which is the one users should set.
pub fn api_key(vars: &[&'static str]) -> std::result::Result<String, ProviderError> {
    for var in vars {
        if let Some(key) = non_empty_env(var) {
            tracing::debug!("Using API key from {}", var);
            return Ok(key);
        }
    }
    Err(ProviderError::MissingApiKey(vars.first().copied().unwrap_or("API key")))
}

pub const OPENAI_KEY_VARS: &[&str] = &["OPENAI_API_KEY"];
pub const GEMINI_KEY_VARS: &[&str] = &["GEMINI_API_KEY", "GOOGLE_AI_API_KEY"];
pub const ELEVENLABS_KEY_VARS: &[&str] = &["ELEVENLABS_API_KEY"];

impl ProviderKind {
    pub fn key_vars(self) -> &'static [&'static str] {
        match self {
            ProviderKind::OpenAi => OPENAI_KEY_VARS,
            ProviderKind::Gemini => GEMINI_KEY_VARS,
        }
    }

    pub fn has_api_key(self) -> bool {
        self.key_vars().iter().any(|v| non_empty_env(v).is_some())
    }
}

/// HTTP client shared by the provider clients, with a whole-request timeout.
pub(crate) fn http_client(
    timeout_secs: u64,
    provider: &'static str,
) -> std::result::Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ProviderError::transport(provider, e))
}

fn non_empty_env(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.is_empty())
}

// ============================================================================
// Tests
// ============================================================================
