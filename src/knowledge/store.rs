//! Knowledge Store - owner of the current index snapshot
//!
//! Readers take an `Arc` to the index current at request start and keep
//! using it even if a rebuild publishes a new one meanwhile. Rebuilds are
//! serialised among themselves; they never block readers beyond the pointer
//! swap.

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::config::KnowledgeConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{KnowledgeError, ProviderError};

use super::chunker::{ChunkConfig, Chunker, RecursiveChunker};
use super::index::KnowledgeIndex;
use super::loader::load_chunks;

// ============================================================================
// Types
// ============================================================================

/// New FAQ entry to append to the knowledge base
#[derive(Debug, Clone, Deserialize)]
pub struct FaqEntry {
    pub question: String,
    pub answer: String,
    #[serde(default = "default_category")]
    pub category: String,
}

fn default_category() -> String {
    "general".to_string()
}

impl FaqEntry {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            category: default_category(),
        }
    }

    /// Text block as stored in the FAQ file.
    pub fn to_text(&self) -> String {
        format!(
            "Q: {}\nA: {}\nCategory: {}\n\n",
            self.question, self.answer, self.category
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexStatus {
    Empty,
    Loaded,
}

/// Store statistics
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub status: IndexStatus,
    /// Number of indexed chunks
    pub documents: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl StoreStats {
    fn of(index: Option<&KnowledgeIndex>) -> Self {
        match index {
            Some(index) => Self {
                status: IndexStatus::Loaded,
                documents: index.len(),
                last_updated: Some(index.built_at()),
            },
            None => Self {
                status: IndexStatus::Empty,
                documents: 0,
                last_updated: None,
            },
        }
    }
}

// ============================================================================
// KnowledgeStore
// ============================================================================

pub struct KnowledgeStore {
    files: Vec<PathBuf>,
    faq_path: PathBuf,
    chunker: Box<dyn Chunker>,
    embedder: Arc<dyn EmbeddingProvider>,
    current: RwLock<Option<Arc<KnowledgeIndex>>>,
    rebuild_lock: Mutex<()>,
}

impl KnowledgeStore {
    /// Create a store with no index yet. Call [`reload`](Self::reload) to
    /// build one.
    pub fn new(
        config: &KnowledgeConfig,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self, KnowledgeError> {
        let chunker = RecursiveChunker::new(ChunkConfig::new(
            config.chunk_size,
            config.chunk_overlap,
        ))?;

        Ok(Self {
            files: config.file_paths(),
            faq_path: config.faq_path(),
            chunker: Box::new(chunker),
            embedder,
            current: RwLock::new(None),
            rebuild_lock: Mutex::new(()),
        })
    }

    /// Create the store and build the initial index.
    ///
    /// A failed build is logged and leaves the store in degraded mode.
    pub async fn open(
        config: &KnowledgeConfig,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self, KnowledgeError> {
        let store = Self::new(config, embedder)?;
        if let Err(e) = store.reload().await {
            tracing::error!("Error loading knowledge base: {}", e);
        }
        Ok(store)
    }

    /// Index current at the time of the call, `None` in degraded mode.
    pub fn snapshot(&self) -> Option<Arc<KnowledgeIndex>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn publish(&self, index: Option<Arc<KnowledgeIndex>>) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = index;
    }

    pub fn embedder(&self) -> &dyn EmbeddingProvider {
        self.embedder.as_ref()
    }

    pub fn faq_path(&self) -> &Path {
        &self.faq_path
    }

    /// Rebuild the index from disk and publish it.
    ///
    /// On failure the store drops to degraded mode (no index) and the error
    /// is returned.
    pub async fn reload(&self) -> Result<StoreStats, KnowledgeError> {
        let _guard = self.rebuild_lock.lock().await;
        self.rebuild().await
    }

    async fn rebuild(&self) -> Result<StoreStats, KnowledgeError> {
        let chunks = load_chunks(&self.files, self.chunker.as_ref()).await;

        if chunks.is_empty() {
            tracing::warn!("No FAQ documents found. Running without a knowledge base.");
            self.publish(None);
            return Ok(StoreStats::of(None));
        }

        let chunk_count = chunks.len();
        match KnowledgeIndex::build(chunks, self.embedder.as_ref()).await {
            Ok(index) => {
                let index = index.map(Arc::new);
                let stats = StoreStats::of(index.as_deref());
                self.publish(index);
                tracing::info!(
                    "Loaded {} document chunks into knowledge base ({})",
                    chunk_count,
                    self.embedder.name()
                );
                Ok(stats)
            }
            Err(e) => {
                self.publish(None);
                Err(e)
            }
        }
    }

    /// Append an entry to the FAQ file and rebuild the index.
    pub async fn add_faq_entry(&self, entry: &FaqEntry) -> Result<StoreStats, KnowledgeError> {
        let _guard = self.rebuild_lock.lock().await;

        append_text(&self.faq_path, &entry.to_text()).await?;
        tracing::info!("Added FAQ entry: {}", entry.question);

        self.rebuild().await
    }

    /// Top-`k` chunk texts for `query`; empty in degraded mode.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<String>, ProviderError> {
        let Some(index) = self.snapshot() else {
            return Ok(vec![]);
        };
        let query_embedding = self.embedder.embed(query).await?;
        Ok(index
            .search(&query_embedding, k)
            .into_iter()
            .map(|hit| hit.chunk.text.clone())
            .collect())
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats::of(self.snapshot().as_deref())
    }
}

async fn append_text(path: &Path, text: &str) -> Result<(), KnowledgeError> {
    let io_err = |source| KnowledgeError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
    }

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(io_err)?;
    file.write_all(text.as_bytes()).await.map_err(io_err)?;
    file.flush().await.map_err(io_err)?;
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
