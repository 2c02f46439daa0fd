//! Call module - summaries of phone-call transcripts
//!
//! Speech-to-text happens elsewhere; this module takes the transcript text,
//! classifies the call and asks the completion service for a JSON summary.

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::completion::CompletionProvider;
use crate::error::ProviderError;
use crate::faq::render;

const CALL_CLASSIFICATION_TEMPLATE: &str = "Classify this phone call into one of these categories:
- customer_support: Customer needs help or has issues
- sales_inquiry: Potential customer interested in products/services
- complaint: Customer complaint or dissatisfaction
- appointment: Scheduling or appointment-related
- general: General inquiry or other

Transcription: {transcription}

Respond with just the category name:";

const CALL_SUMMARY_TEMPLATE: &str = "Analyze this phone call transcription and provide a comprehensive summary.

Transcription: {transcription}
Call Type: {call_type}
Business Context: {business_context}

Please provide:
1. A brief summary of the call
2. Key points discussed
3. Any action items or next steps
4. Overall sentiment of the call (positive, negative, neutral)

Format your response as JSON:
{
    \"summary\": \"Brief summary of the call\",
    \"key_points\": [\"point1\", \"point2\", \"point3\"],
    \"action_items\": [\"action1\", \"action2\"],
    \"sentiment\": \"positive/negative/neutral\"
}";

const CALL_BUSINESS_CONTEXT: &str = "We are a small business focused on customer service excellence.
We handle customer support, sales inquiries, and general business questions.
Our goal is to provide helpful, professional service to all callers.";

const SUMMARY_SOURCE: &str = "call_summary";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallCategory {
    CustomerSupport,
    SalesInquiry,
    Complaint,
    Appointment,
    General,
}

impl CallCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CustomerSupport => "customer_support",
            Self::SalesInquiry => "sales_inquiry",
            Self::Complaint => "complaint",
            Self::Appointment => "appointment",
            Self::General => "general",
        }
    }

    pub fn parse(reply: &str) -> Option<Self> {
        let label = reply
            .trim()
            .trim_matches(|c: char| !c.is_alphanumeric() && c != '_')
            .to_lowercase();
        match label.as_str() {
            "customer_support" => Some(Self::CustomerSupport),
            "sales_inquiry" => Some(Self::SalesInquiry),
            "complaint" => Some(Self::Complaint),
            "appointment" => Some(Self::Appointment),
            "general" => Some(Self::General),
            _ => None,
        }
    }
}

impl fmt::Display for CallCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured call summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSummary {
    pub summary: String,
    pub key_points: Vec<String>,
    pub action_items: Vec<String>,
    pub sentiment: String,
}

impl CallSummary {
    /// Summary returned when the model reply is unusable.
    pub fn fallback() -> Self {
        Self {
            summary: "Call transcription completed but summarization failed.".to_string(),
            key_points: vec!["Transcription available for manual review".to_string()],
            action_items: vec!["Review transcription manually".to_string()],
            sentiment: "neutral".to_string(),
        }
    }
}

/// Summary plus the call category that produced it
#[derive(Debug, Clone, Serialize)]
pub struct CallReport {
    pub call_type: CallCategory,
    #[serde(flatten)]
    pub summary: CallSummary,
}

// ============================================================================
// CallAnalyzer
// ============================================================================

pub struct CallAnalyzer {
    completer: Arc<dyn CompletionProvider>,
}

impl CallAnalyzer {
    pub fn new(completer: Arc<dyn CompletionProvider>) -> Self {
        Self { completer }
    }

    /// Classify and summarise a transcript. Never fails: an unusable reply
    /// yields [`CallSummary::fallback`].
    pub async fn summarize(&self, transcription: &str) -> CallReport {
        let call_type = self.classify_call(transcription).await;

        let summary = match self.request_summary(transcription, call_type).await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::error!("Transcription summarization error: {}", e);
                CallSummary::fallback()
            }
        };

        CallReport { call_type, summary }
    }

    pub async fn classify_call(&self, transcription: &str) -> CallCategory {
        let prompt = render(
            CALL_CLASSIFICATION_TEMPLATE,
            &[("transcription", transcription)],
        );
        match self.completer.complete(&prompt).await {
            Ok(reply) => CallCategory::parse(&reply).unwrap_or(CallCategory::General),
            Err(e) => {
                tracing::error!("Call classification error: {}", e);
                CallCategory::General
            }
        }
    }

    async fn request_summary(
        &self,
        transcription: &str,
        call_type: CallCategory,
    ) -> Result<CallSummary, ProviderError> {
        let prompt = render(
            CALL_SUMMARY_TEMPLATE,
            &[
                ("transcription", transcription),
                ("call_type", call_type.as_str()),
                ("business_context", CALL_BUSINESS_CONTEXT),
            ],
        );
        let reply = self.completer.complete(&prompt).await?;
        parse_summary(&reply).ok_or_else(|| {
            ProviderError::decode(SUMMARY_SOURCE, "reply is not a call summary JSON object")
        })
    }
}

/// Parse the JSON object in a model reply, tolerating code fences and
/// surrounding prose.
pub fn parse_summary(reply: &str) -> Option<CallSummary> {
    let trimmed = reply.trim();
    if let Ok(summary) = serde_json::from_str::<CallSummary>(trimmed) {
        return Some(summary);
    }

    let re = Regex::new(r"(?s)\{.*\}").ok()?;
    let object = re.find(trimmed)?;
    serde_json::from_str(object.as_str()).ok()
}

// ============================================================================
// Tests
// ============================================================================
