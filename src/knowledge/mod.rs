//! Knowledge module - FAQ knowledge base
//!
//! - Loader: reads the configured text files
//! - Chunker: recursive character splitting with overlap
//! - Index: immutable in-memory embedding index
//! - Store: current index snapshot, reload, FAQ entry append

mod chunker;
mod index;
mod loader;
mod store;

// Re-exports
pub use chunker::{default_chunker, ChunkConfig, Chunker, RecursiveChunker};
pub use index::{cosine_similarity, DocumentChunk, KnowledgeIndex, SearchHit};
pub use loader::{chunk_documents, load_chunks, read_documents, SourceDocument};
pub use store::{FaqEntry, IndexStatus, KnowledgeStore, StoreStats};
