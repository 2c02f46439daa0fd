//! Knowledge Index - in-memory nearest-neighbour lookup
//!
//! An index is built once from a chunk list and never mutated afterwards.
//! Reloading the knowledge base builds a new index and swaps it in.

use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::embedding::EmbeddingProvider;
use crate::error::KnowledgeError;

// ============================================================================
// Types
// ============================================================================

/// A span of source text and the file it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentChunk {
    pub text: String,
    pub source: PathBuf,
}

#[derive(Debug, Clone)]
struct IndexedChunk {
    chunk: DocumentChunk,
    embedding: Vec<f32>,
}

/// Search hit
#[derive(Debug, Clone, Copy)]
pub struct SearchHit<'a> {
    pub chunk: &'a DocumentChunk,
    /// Cosine similarity (-1.0 ~ 1.0)
    pub similarity: f32,
}

// ============================================================================
// KnowledgeIndex
// ============================================================================

/// Immutable (chunk, embedding) collection.
#[derive(Debug)]
pub struct KnowledgeIndex {
    entries: Vec<IndexedChunk>,
    built_at: DateTime<Utc>,
}

impl KnowledgeIndex {
    /// Embed every chunk with `embedder` and build the index.
    ///
    /// Returns `Ok(None)` for an empty chunk list: there is nothing to
    /// search and callers run in degraded mode.
    pub async fn build(
        chunks: Vec<DocumentChunk>,
        embedder: &dyn EmbeddingProvider,
    ) -> Result<Option<Self>, KnowledgeError> {
        if chunks.is_empty() {
            return Ok(None);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = embedder.embed_batch(&texts).await?;

        if embeddings.len() != chunks.len() {
            return Err(KnowledgeError::EmbeddingCount {
                expected: chunks.len(),
                got: embeddings.len(),
            });
        }

        Ok(Some(Self::from_embedded(chunks.into_iter().zip(embeddings))))
    }

    /// Build from chunks that already carry their embeddings.
    pub fn from_embedded(entries: impl IntoIterator<Item = (DocumentChunk, Vec<f32>)>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|(chunk, embedding)| IndexedChunk { chunk, embedding })
                .collect(),
            built_at: Utc::now(),
        }
    }

    /// `k` most similar chunks, best first. Equal scores keep insertion
    /// order.
    pub fn search(&self, query_embedding: &[f32], k: usize) -> Vec<SearchHit<'_>> {
        let mut hits: Vec<SearchHit<'_>> = self
            .entries
            .iter()
            .map(|e| SearchHit {
                chunk: &e.chunk,
                similarity: cosine_similarity(query_embedding, &e.embedding),
            })
            .collect();

        // sort_by is stable
        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        hits
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn chunks(&self) -> impl Iterator<Item = &DocumentChunk> {
        self.entries.iter().map(|e| &e.chunk)
    }
}

// ============================================================================
// Utility Functions
// ============================================================================

/// Cosine similarity in -1.0 ~ 1.0; 0.0 for empty, mismatched or zero
/// vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use async_trait::async_trait;

    /// Drops the last vector of every batch.
    struct ShortBatch;

    #[async_trait]
    impl EmbeddingProvider for ShortBatch {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
            Ok(vec![1.0, 0.0])
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
            Ok(vec![vec![1.0, 0.0]; texts.len().saturating_sub(1)])
        }

        fn dimension(&self) -> usize {
            2
        }

        fn name(&self) -> &str {
            "short-batch"
        }
    }

    fn chunk(text: &str) -> DocumentChunk {
        DocumentChunk {
            text: text.to_string(),
            source: PathBuf::from("faq.txt"),
        }
    }

    #[test]
    fn test_cosine_similarity_same() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let c = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &c).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let a = vec![1.0, 0.0, 0.0];
        let d = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &d) + 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_degenerate() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_search_orders_by_similarity() {
        let index = KnowledgeIndex::from_embedded(vec![
            (chunk("billing"), vec![0.0, 1.0]),
            (chunk("hours"), vec![1.0, 0.0]),
            (chunk("mixed"), vec![0.7, 0.7]),
        ]);

        let hits = index.search(&[1.0, 0.1], 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.text, "hours");
        assert_eq!(hits[1].chunk.text, "mixed");
        assert!(hits[0].similarity >= hits[1].similarity);
    }

    #[test]
    fn test_search_ties_keep_insertion_order() {
        let index = KnowledgeIndex::from_embedded(vec![
            (chunk("first"), vec![1.0, 0.0]),
            (chunk("second"), vec![2.0, 0.0]),
            (chunk("third"), vec![3.0, 0.0]),
        ]);

        let texts: Vec<&str> = index
            .search(&[1.0, 0.0], 3)
            .iter()
            .map(|h| h.chunk.text.as_str())
            .collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_k_larger_than_index() {
        let index = KnowledgeIndex::from_embedded(vec![(chunk("only"), vec![1.0])]);
        assert_eq!(index.search(&[1.0], 5).len(), 1);
        assert_eq!(index.len(), 1);
        assert!(!index.is_empty());
    }

    #[tokio::test]
    async fn test_build_rejects_vector_count_mismatch() {
        let result =
            KnowledgeIndex::build(vec![chunk("hours"), chunk("refunds")], &ShortBatch).await;
        assert!(matches!(
            result,
            Err(KnowledgeError::EmbeddingCount {
                expected: 2,
                got: 1
            })
        ));
    }

    #[tokio::test]
    async fn test_build_empty_is_none() {
        assert!(KnowledgeIndex::build(vec![], &ShortBatch).await.unwrap().is_none());
    }
}
