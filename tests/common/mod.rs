//! Shared fakes for integration tests

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use helpdesk_rag::config::{FaqConfig, KnowledgeConfig, VoiceConfig};
use helpdesk_rag::{
    AppState, CallAnalyzer, CompletionProvider, EmbeddingProvider, FaqPipeline, KnowledgeStore,
    ProviderError, VoiceSynthesizer,
};

const DIMS: usize = 64;

/// Bag-of-words embedding: each lowercase word is hashed into one of 64
/// buckets. Texts sharing words end up close.
pub struct WordEmbedding {
    failing: AtomicBool,
}

impl WordEmbedding {
    pub fn new() -> Self {
        Self {
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

fn bucket(word: &str) -> usize {
    // FNV-1a
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in word.bytes() {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    (hash % DIMS as u64) as usize
}

#[async_trait]
impl EmbeddingProvider for WordEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ProviderError::Status {
                provider: "fake-embedding",
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        let mut v = vec![0.0; DIMS];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            v[bucket(&word.to_lowercase())] += 1.0;
        }
        Ok(v)
    }

    fn dimension(&self) -> usize {
        DIMS
    }

    fn name(&self) -> &str {
        "fake-embedding"
    }
}

/// Completion fake: fixed reply (or failure) for answer prompts, `general`
/// for classification prompts. Records every prompt it sees.
pub struct FakeCompleter {
    reply: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl FakeCompleter {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            prompts: Mutex::new(vec![]),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            prompts: Mutex::new(vec![]),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    /// Prompts other than classification prompts.
    pub fn answer_prompts(&self) -> Vec<String> {
        self.prompts()
            .into_iter()
            .filter(|p| !p.starts_with("Classify"))
            .collect()
    }
}

#[async_trait]
impl CompletionProvider for FakeCompleter {
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if prompt.starts_with("Classify") {
            return Ok("general".to_string());
        }
        self.reply.clone().ok_or(ProviderError::Status {
            provider: "fake-completion",
            status: 500,
            body: "boom".to_string(),
        })
    }

    fn name(&self) -> &str {
        "fake-completion"
    }
}

pub fn knowledge_config(dir: &Path) -> KnowledgeConfig {
    KnowledgeConfig {
        dir: dir.to_path_buf(),
        ..Default::default()
    }
}

pub fn write_kb_file(dir: &Path, name: &str, content: &str) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join(name), content).unwrap();
}

pub async fn pipeline(
    dir: &Path,
    embedder: Arc<WordEmbedding>,
    completer: Arc<FakeCompleter>,
) -> FaqPipeline {
    let store = KnowledgeStore::open(&knowledge_config(dir), embedder)
        .await
        .unwrap();
    FaqPipeline::new(Arc::new(store), completer, &FaqConfig::default())
}

pub async fn app_state(dir: &Path, completer: Arc<FakeCompleter>) -> AppState {
    let pipeline = pipeline(dir, Arc::new(WordEmbedding::new()), completer.clone()).await;
    AppState {
        pipeline: Arc::new(pipeline),
        calls: Arc::new(CallAnalyzer::new(completer)),
        voice: Arc::new(VoiceSynthesizer::new(None, &VoiceConfig::default()).unwrap()),
    }
}

pub const HOURS_FAQ: &str = "Q: What are your business hours?
A: We are open Monday to Friday from 9AM to 5PM.

Q: Do you offer refunds?
A: Yes, within 30 days of purchase with a receipt.

Q: How can I reset my password?
A: Use the Forgot password link on the login page.
";
