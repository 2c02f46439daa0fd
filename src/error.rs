//! Error types shared across the crate.
//!
//! Remote-service failures are normalised into [`ProviderError`] so the
//! pipelines can tell a missing key from a timeout from a malformed body,
//! even though the user-facing fallback text is the same for all of them.

use std::path::PathBuf;

use thiserror::Error;

/// Failure talking to a remote AI service (completion, embedding, voice).
#[derive(Debug, Error)]
pub enum ProviderError {
    /// API key environment variable is missing or empty.
    #[error("API key not found. Set {0}")]
    MissingApiKey(&'static str),

    /// The provider could not be constructed from its configuration.
    #[error("{provider}: invalid configuration: {reason}")]
    InvalidConfig {
        provider: &'static str,
        reason: String,
    },

    /// Network/transport level failure (DNS, connect, timeout, ...).
    #[error("{provider}: request failed: {source}")]
    Transport {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// Non-2xx HTTP status.
    #[error("{provider}: API error ({status}): {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },

    /// The response body did not have the expected shape.
    #[error("{provider}: failed to parse response: {reason}")]
    Decode {
        provider: &'static str,
        reason: String,
    },

    /// A well-formed response that carried no content.
    #[error("{provider}: empty response")]
    Empty { provider: &'static str },
}

impl ProviderError {
    pub(crate) fn transport(provider: &'static str, source: reqwest::Error) -> Self {
        Self::Transport { provider, source }
    }

    pub(crate) fn decode(provider: &'static str, reason: impl ToString) -> Self {
        Self::Decode {
            provider,
            reason: reason.to_string(),
        }
    }

    /// True for failures caused by local setup rather than the remote side.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::MissingApiKey(_) | Self::InvalidConfig { .. })
    }
}

/// Failure while loading or rebuilding the knowledge base.
#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to embed knowledge base chunks: {0}")]
    Embedding(#[from] ProviderError),

    #[error("invalid chunking configuration: {0}")]
    InvalidChunking(String),

    #[error("embedding provider returned {got} vectors for {expected} chunks")]
    EmbeddingCount { expected: usize, got: usize },
}

/// Failure inside one FAQ request.
///
/// Classification failures never surface here: they fall back to
/// `general` and the request continues.
#[derive(Debug, Error)]
pub enum FaqError {
    #[error("context retrieval failed: {0}")]
    Retrieval(#[source] ProviderError),

    #[error("answer generation failed: {0}")]
    Completion(#[source] ProviderError),
}

impl FaqError {
    /// Short machine-readable tag, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Retrieval(_) => "retrieval",
            Self::Completion(_) => "completion",
        }
    }
}
