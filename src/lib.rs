//! helpdesk-rag - customer FAQ answering with retrieval-augmented generation
//!
//! FAQ text files are chunked and embedded into an in-memory index; each
//! question retrieves the closest chunks and a completion model writes the
//! answer. Call-transcript summaries and ElevenLabs speech sit alongside.

pub mod call;
pub mod cli;
pub mod completion;
pub mod config;
pub mod embedding;
pub mod error;
pub mod faq;
pub mod knowledge;
pub mod server;
pub mod voice;

// Re-exports
pub use call::{CallAnalyzer, CallCategory, CallReport, CallSummary};
pub use completion::{create_completer, CompletionProvider, GeminiCompletion, OpenAiCompletion};
pub use config::Config;
pub use embedding::{create_embedder, EmbeddingProvider, GeminiEmbedding, OpenAiEmbedding};
pub use error::{FaqError, KnowledgeError, ProviderError};
pub use faq::{
    AnswerResult, AnswerSource, AnsweredQuestion, FaqPipeline, Query, QuestionCategory,
};
pub use knowledge::{
    default_chunker, ChunkConfig, Chunker, DocumentChunk, FaqEntry, IndexStatus, KnowledgeIndex,
    KnowledgeStore, RecursiveChunker, StoreStats,
};
pub use server::{router, run_server, AppState};
pub use voice::{Voice, VoiceSettings, VoiceSynthesizer};
