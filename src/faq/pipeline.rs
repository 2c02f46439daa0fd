//! FAQ pipeline
//!
//! One request runs classify → retrieve → prompt → complete → score →
//! related questions. Every step reads the same index snapshot, taken when
//! the request starts.

use std::sync::Arc;

use crate::completion::CompletionProvider;
use crate::config::FaqConfig;
use crate::error::FaqError;
use crate::knowledge::{KnowledgeIndex, KnowledgeStore};

use super::confidence::{confidence, NO_KNOWLEDGE_BASE};
use super::prompt::{fill_answer_prompt, fill_classification_prompt};
use super::{AnswerResult, AnswerSource, AnsweredQuestion, Query, QuestionCategory};

pub const APOLOGY: &str = "I apologize, but I'm having trouble processing your question. Please contact our support team for assistance.";

/// Chunks used as answer context
pub const ANSWER_K: usize = 3;
/// Chunks scanned for related questions
pub const RELATED_K: usize = 5;
pub const MAX_RELATED: usize = 3;

const MIN_RELATED_CHARS: usize = 10;

pub struct FaqPipeline {
    knowledge: Arc<KnowledgeStore>,
    completer: Arc<dyn CompletionProvider>,
    business_info: String,
    classify: bool,
}

impl FaqPipeline {
    pub fn new(
        knowledge: Arc<KnowledgeStore>,
        completer: Arc<dyn CompletionProvider>,
        config: &FaqConfig,
    ) -> Self {
        Self {
            knowledge,
            completer,
            business_info: config.business_info.clone(),
            classify: config.classify_questions,
        }
    }

    pub fn knowledge(&self) -> &Arc<KnowledgeStore> {
        &self.knowledge
    }

    pub fn completer(&self) -> &Arc<dyn CompletionProvider> {
        &self.completer
    }

    /// Answer a question. Never fails: any error becomes the apology result.
    pub async fn answer_question(&self, query: &Query) -> AnswerResult {
        match self.try_answer(query).await {
            Ok(answered) => answered.result,
            Err(e) => {
                tracing::error!(kind = e.kind(), "Error answering question: {}", e);
                AnswerResult::fallback()
            }
        }
    }

    /// Answer a question, surfacing retrieval and completion errors.
    pub async fn try_answer(&self, query: &Query) -> Result<AnsweredQuestion, FaqError> {
        let snapshot = self.knowledge.snapshot();

        let category = if self.classify {
            self.classify_question(&query.question).await
        } else {
            QuestionCategory::General
        };
        tracing::debug!(%category, "Classified question");

        // Retrieve
        let query_embedding = match &snapshot {
            Some(_) => Some(
                self.knowledge
                    .embedder()
                    .embed(&query.question)
                    .await
                    .map_err(FaqError::Retrieval)?,
            ),
            None => None,
        };
        let relevant_context = match (&snapshot, &query_embedding) {
            (Some(index), Some(embedding)) => top_texts(index, embedding, ANSWER_K).join("\n\n"),
            _ => NO_KNOWLEDGE_BASE.to_string(),
        };

        let full_context = match query.caller_context() {
            Some(caller) => format!("{}\n\n{}", caller, relevant_context),
            None => relevant_context.clone(),
        };

        // Generate
        let prompt = fill_answer_prompt(&query.question, &full_context, &self.business_info);
        let answer = self
            .completer
            .complete(&prompt)
            .await
            .map_err(FaqError::Completion)?
            .trim()
            .to_string();

        let score = confidence(&query.question, &relevant_context);

        let related = match (&snapshot, &query_embedding) {
            (Some(index), Some(embedding)) => {
                related_questions(top_texts(index, embedding, RELATED_K))
            }
            _ => vec![],
        };

        tracing::info!(
            confidence = score,
            related = related.len(),
            "Answered question"
        );

        Ok(AnsweredQuestion {
            result: AnswerResult {
                answer,
                confidence: score,
                source: AnswerSource::KnowledgeBase,
                related_questions: related,
            },
            category,
        })
    }

    /// Ask the completion service for a category. Falls back to `General`
    /// when the call fails or the reply is not a known label.
    pub async fn classify_question(&self, question: &str) -> QuestionCategory {
        let prompt = fill_classification_prompt(question);
        match self.completer.complete(&prompt).await {
            Ok(reply) => QuestionCategory::parse(&reply).unwrap_or_else(|| {
                tracing::debug!("Unrecognised category label: {:?}", reply.trim());
                QuestionCategory::General
            }),
            Err(e) => {
                tracing::warn!("Question classification failed: {}", e);
                QuestionCategory::General
            }
        }
    }
}

fn top_texts<'a>(index: &'a KnowledgeIndex, embedding: &[f32], k: usize) -> Vec<&'a str> {
    index
        .search(embedding, k)
        .into_iter()
        .map(|hit| hit.chunk.text.as_str())
        .collect()
}

/// Pick up to three question sentences from retrieved chunks.
///
/// Only chunks containing `?` are considered. Each is split on `.` and the
/// trimmed pieces that contain `?` and are longer than ten characters are
/// kept, in order.
pub fn related_questions<'a>(chunks: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    chunks
        .into_iter()
        .filter(|chunk| chunk.contains('?'))
        .flat_map(|chunk| chunk.split('.'))
        .map(str::trim)
        .filter(|s| s.contains('?') && s.chars().count() > MIN_RELATED_CHARS)
        .take(MAX_RELATED)
        .map(str::to_string)
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KnowledgeConfig;
    use crate::embedding::EmbeddingProvider;
    use crate::error::ProviderError;
    use crate::knowledge::FaqEntry;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct LetterEmbedding;

    #[async_trait]
    impl EmbeddingProvider for LetterEmbedding {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
            let mut v = vec![0.0; 26];
            for c in text.to_ascii_lowercase().chars() {
                if c.is_ascii_lowercase() {
                    v[(c as u8 - b'a') as usize] += 1.0;
                }
            }
            Ok(v)
        }

        fn dimension(&self) -> usize {
            26
        }

        fn name(&self) -> &str {
            "letters"
        }
    }

    /// Replies with a fixed label to classification prompts and a fixed
    /// answer otherwise; records every prompt.
    struct ScriptedCompleter {
        label: Result<String, ()>,
        answer: Result<String, ()>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedCompleter {
        fn new(label: Result<&str, ()>, answer: Result<&str, ()>) -> Self {
            Self {
                label: label.map(str::to_string),
                answer: answer.map(str::to_string),
                prompts: Mutex::new(vec![]),
            }
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CompletionProvider for ScriptedCompleter {
        async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            let reply = if prompt.starts_with("Classify") {
                &self.label
            } else {
                &self.answer
            };
            reply.clone().map_err(|_| ProviderError::Empty { provider: "test" })
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    async fn pipeline(
        dir: &TempDir,
        completer: Arc<ScriptedCompleter>,
        classify: bool,
    ) -> FaqPipeline {
        let config = KnowledgeConfig {
            dir: dir.path().join("kb"),
            ..Default::default()
        };
        let store = KnowledgeStore::open(&config, Arc::new(LetterEmbedding))
            .await
            .unwrap();
        let faq = FaqConfig {
            classify_questions: classify,
            ..Default::default()
        };
        FaqPipeline::new(Arc::new(store), completer, &faq)
    }

    #[test]
    fn test_related_questions_filtering() {
        let chunks = [
            "No questions here. Just facts.",
            "Q: What are your hours? A: 9-5. Why?. Q: Do you ship overseas? A: Yes. Q: Can I pay by card? A: Yes. Q: Is there parking? A: No.",
        ];
        let related = related_questions(chunks);
        assert_eq!(related.len(), 3);
        assert_eq!(related[0], "Q: What are your hours? A: 9-5");
        assert!(related.iter().all(|q| q.contains('?') && q.len() > 10));
        assert_eq!(related[2], "Q: Can I pay by card? A: Yes");
        assert!(!related.iter().any(|q| q == "Why?"));
    }

    #[test]
    fn test_related_questions_empty() {
        assert!(related_questions(Vec::<&str>::new()).is_empty());
        assert!(related_questions(["plain text only"]).is_empty());
    }

    #[tokio::test]
    async fn test_degraded_mode_still_completes() {
        let dir = TempDir::new().unwrap();
        let completer = Arc::new(ScriptedCompleter::new(Ok("general"), Ok("  We open at 9.  ")));
        let pipeline = pipeline(&dir, completer.clone(), true).await;

        let result = pipeline.answer_question(&Query::new("When do you open?")).await;

        assert_eq!(result.answer, "We open at 9.");
        assert_eq!(result.confidence, 0.3);
        assert_eq!(result.source, AnswerSource::KnowledgeBase);
        assert!(result.related_questions.is_empty());

        let prompts = completer.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].contains(NO_KNOWLEDGE_BASE));
    }

    #[tokio::test]
    async fn test_completion_failure_returns_apology() {
        let dir = TempDir::new().unwrap();
        let completer = Arc::new(ScriptedCompleter::new(Ok("billing"), Err(())));
        let pipeline = pipeline(&dir, completer, true).await;

        let result = pipeline.answer_question(&Query::new("How much?")).await;
        assert_eq!(result, AnswerResult::fallback());

        let err = pipeline.try_answer(&Query::new("How much?")).await.unwrap_err();
        assert_eq!(err.kind(), "completion");
    }

    #[tokio::test]
    async fn test_classification_failure_defaults_to_general() {
        let dir = TempDir::new().unwrap();
        let completer = Arc::new(ScriptedCompleter::new(Err(()), Ok("answer")));
        let pipeline = pipeline(&dir, completer, true).await;

        let answered = pipeline.try_answer(&Query::new("Hello?")).await.unwrap();
        assert_eq!(answered.category, QuestionCategory::General);
        assert_eq!(answered.result.answer, "answer");
    }

    #[tokio::test]
    async fn test_classification_label_is_kept() {
        let dir = TempDir::new().unwrap();
        let completer = Arc::new(ScriptedCompleter::new(Ok("Billing\n"), Ok("answer")));
        let pipeline = pipeline(&dir, completer, true).await;

        let answered = pipeline.try_answer(&Query::new("Refund?")).await.unwrap();
        assert_eq!(answered.category, QuestionCategory::Billing);
    }

    #[tokio::test]
    async fn test_classification_disabled_skips_call() {
        let dir = TempDir::new().unwrap();
        let completer = Arc::new(ScriptedCompleter::new(Ok("billing"), Ok("answer")));
        let pipeline = pipeline(&dir, completer.clone(), false).await;

        let answered = pipeline.try_answer(&Query::new("Refund?")).await.unwrap();
        assert_eq!(answered.category, QuestionCategory::General);
        assert_eq!(completer.prompts().len(), 1);
    }

    #[tokio::test]
    async fn test_caller_context_precedes_retrieved() {
        let dir = TempDir::new().unwrap();
        let completer = Arc::new(ScriptedCompleter::new(Ok("general"), Ok("answer")));
        let pipeline = pipeline(&dir, completer.clone(), false).await;
        pipeline
            .knowledge()
            .add_faq_entry(&FaqEntry::new("What are your hours?", "9am to 5pm."))
            .await
            .unwrap();

        let query = Query::new("What are your hours?").with_context("Caller is a VIP");
        let answered = pipeline.try_answer(&query).await.unwrap();

        let prompt = &completer.prompts()[0];
        let context_at = prompt.find("Caller is a VIP\n\nQ: What are your hours?");
        assert!(context_at.is_some(), "prompt was: {}", prompt);
        // 11 words of retrieved context, short question
        assert_eq!(answered.result.confidence, 0.5);
        assert_eq!(
            answered.result.related_questions,
            vec!["Q: What are your hours?\nA: 9am to 5pm"]
        );
    }
}
