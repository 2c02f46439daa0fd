//! Knowledge base file loading
//!
//! Reads the configured text files and turns them into chunks. Nothing in
//! here is fatal: a missing or unreadable file only loses its own chunks.

use std::path::{Path, PathBuf};

use super::chunker::Chunker;
use super::index::DocumentChunk;

/// Raw text of one knowledge base file
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub path: PathBuf,
    pub content: String,
}

/// Read every existing file in `paths`, in order.
pub async fn read_documents(paths: &[PathBuf]) -> Vec<SourceDocument> {
    let mut documents = Vec::with_capacity(paths.len());

    for path in paths {
        match read_document(path).await {
            Ok(Some(doc)) => documents.push(doc),
            Ok(None) => {
                tracing::warn!("Knowledge base file not found, skipping: {}", path.display());
            }
            Err(e) => {
                tracing::warn!("Could not load {}: {}", path.display(), e);
            }
        }
    }

    documents
}

async fn read_document(path: &Path) -> std::io::Result<Option<SourceDocument>> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Some(SourceDocument {
            path: path.to_path_buf(),
            content,
        })),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Split documents into chunks, keeping file order then position order.
pub fn chunk_documents(documents: &[SourceDocument], chunker: &dyn Chunker) -> Vec<DocumentChunk> {
    documents
        .iter()
        .flat_map(|doc| {
            let pieces = chunker.chunk(&doc.content);
            if pieces.is_empty() {
                tracing::debug!("No chunks generated for {}", doc.path.display());
            }
            pieces.into_iter().map(move |text| DocumentChunk {
                text,
                source: doc.path.clone(),
            })
        })
        .collect()
}

/// [`read_documents`] followed by [`chunk_documents`].
pub async fn load_chunks(paths: &[PathBuf], chunker: &dyn Chunker) -> Vec<DocumentChunk> {
    let documents = read_documents(paths).await;
    chunk_documents(&documents, chunker)
}
