//! FAQ module - retrieval-augmented answers to customer questions
//!
//! Flow per request: classify → retrieve → fill prompt → complete →
//! score confidence → pick related questions. See [`FaqPipeline`].

mod confidence;
mod pipeline;
mod prompt;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use confidence::{confidence, DEGRADED_CONFIDENCE, NO_KNOWLEDGE_BASE};
pub use pipeline::{related_questions, FaqPipeline, APOLOGY, ANSWER_K, MAX_RELATED, RELATED_K};
pub use prompt::{
    fill_answer_prompt, fill_classification_prompt, render, ANSWER_TEMPLATE,
    CLASSIFICATION_TEMPLATE,
};

// ============================================================================
// Types
// ============================================================================

/// A customer question plus optional caller-supplied context
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Query {
    pub question: String,
    #[serde(default)]
    pub context: Option<String>,
}

impl Query {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Caller context, `None` when absent or empty.
    pub fn caller_context(&self) -> Option<&str> {
        self.context.as_deref().filter(|c| !c.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerSource {
    KnowledgeBase,
    Error,
}

impl AnswerSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::KnowledgeBase => "knowledge_base",
            Self::Error => "error",
        }
    }
}

/// Answer returned to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerResult {
    pub answer: String,
    pub confidence: f64,
    pub source: AnswerSource,
    pub related_questions: Vec<String>,
}

impl AnswerResult {
    /// The apology returned for any failed request.
    pub fn fallback() -> Self {
        Self {
            answer: APOLOGY.to_string(),
            confidence: 0.0,
            source: AnswerSource::Error,
            related_questions: vec![],
        }
    }
}

/// Question category picked by the completion service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionCategory {
    ProductInfo,
    Support,
    Billing,
    General,
}

impl QuestionCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ProductInfo => "product_info",
            Self::Support => "support",
            Self::Billing => "billing",
            Self::General => "general",
        }
    }

    /// Parse a model reply such as `"Billing\n"` or `"support."`.
    pub fn parse(reply: &str) -> Option<Self> {
        let label = reply
            .trim()
            .trim_matches(|c: char| !c.is_alphanumeric() && c != '_')
            .to_lowercase();
        match label.as_str() {
            "product_info" => Some(Self::ProductInfo),
            "support" => Some(Self::Support),
            "billing" => Some(Self::Billing),
            "general" => Some(Self::General),
            _ => None,
        }
    }
}

impl fmt::Display for QuestionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Successful pipeline output: the public result plus the classification
/// that does not go over the wire.
#[derive(Debug, Clone)]
pub struct AnsweredQuestion {
    pub result: AnswerResult,
    pub category: QuestionCategory,
}
