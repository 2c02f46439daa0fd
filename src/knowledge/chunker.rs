//! Text Chunking Module
//!
//! Recursive character splitting: try the coarsest separator first
//! (blank line), fall back to finer ones (newline, space, single character)
//! only for pieces that are still too long, then merge neighbouring pieces
//! back up to the target size with a character overlap between chunks.
//!
//! All sizes are counted in characters, not bytes.

use std::collections::VecDeque;

use crate::error::KnowledgeError;

// ============================================================================
// Chunk Configuration
// ============================================================================

/// Chunking settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    /// Target maximum chunk size (characters)
    pub max_characters: usize,
    /// Characters shared between consecutive chunks
    pub overlap_characters: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_characters: 1000,
            overlap_characters: 200,
        }
    }
}

impl ChunkConfig {
    pub fn new(max_characters: usize, overlap_characters: usize) -> Self {
        Self {
            max_characters,
            overlap_characters,
        }
    }
}

/// Separators tried in order, coarsest first. The empty separator splits
/// into single characters and always succeeds.
const SEPARATORS: &[&str] = &["\n\n", "\n", " ", ""];

// ============================================================================
// Chunker Trait
// ============================================================================

/// Text chunking strategy
pub trait Chunker: Send + Sync {
    /// Split text into chunks
    fn chunk(&self, text: &str) -> Vec<String>;

    /// Chunker name
    fn name(&self) -> &'static str;
}

// ============================================================================
// RecursiveChunker
// ============================================================================

pub struct RecursiveChunker {
    config: ChunkConfig,
}

impl RecursiveChunker {
    pub fn new(config: ChunkConfig) -> Result<Self, KnowledgeError> {
        if config.max_characters == 0 {
            return Err(KnowledgeError::InvalidChunking(
                "chunk size must be > 0".to_string(),
            ));
        }
        if config.overlap_characters >= config.max_characters {
            return Err(KnowledgeError::InvalidChunking(format!(
                "overlap ({}) must be smaller than chunk size ({})",
                config.overlap_characters, config.max_characters
            )));
        }
        Ok(Self { config })
    }

    pub fn with_defaults() -> Self {
        Self {
            config: ChunkConfig::default(),
        }
    }

    pub fn config(&self) -> ChunkConfig {
        self.config
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        // pick the first separator present in the text
        let mut separator = "";
        let mut finer: &[&str] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                separator = sep;
                finer = &[];
                break;
            }
            if text.contains(sep) {
                separator = sep;
                finer = &separators[i + 1..];
                break;
            }
        }

        let pieces: Vec<&str> = if separator.is_empty() {
            text.char_indices()
                .map(|(i, c)| &text[i..i + c.len_utf8()])
                .collect()
        } else {
            text.split(separator).filter(|p| !p.is_empty()).collect()
        };

        let mut chunks = Vec::new();
        let mut pending: Vec<&str> = Vec::new();

        for piece in pieces {
            if char_len(piece) < self.config.max_characters {
                pending.push(piece);
                continue;
            }

            if !pending.is_empty() {
                chunks.extend(self.merge_pieces(&pending, separator));
                pending.clear();
            }

            if finer.is_empty() {
                chunks.push(piece.to_string());
            } else {
                chunks.extend(self.split_recursive(piece, finer));
            }
        }

        if !pending.is_empty() {
            chunks.extend(self.merge_pieces(&pending, separator));
        }

        chunks
    }

    /// Greedily join pieces into chunks no longer than the target size,
    /// carrying trailing pieces (up to the overlap budget) into the next
    /// chunk.
    fn merge_pieces(&self, pieces: &[&str], separator: &str) -> Vec<String> {
        let max = self.config.max_characters;
        let overlap = self.config.overlap_characters;
        let sep_len = char_len(separator);

        let mut chunks = Vec::new();
        let mut window: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            let joiner = if window.is_empty() { 0 } else { sep_len };

            if total + len + joiner > max {
                if total > max {
                    tracing::warn!(
                        "Created a chunk of size {}, which is longer than the specified {}",
                        total,
                        max
                    );
                }

                if !window.is_empty() {
                    push_joined(&mut chunks, &window, separator);

                    // drop leading pieces until the carry-over fits the overlap
                    // budget and leaves room for the incoming piece
                    while total > overlap
                        || (total > 0
                            && total + len + if window.is_empty() { 0 } else { sep_len } > max)
                    {
                        let Some((_, front_len)) = window.pop_front() else {
                            break;
                        };
                        total -= front_len + if window.is_empty() { 0 } else { sep_len };
                    }
                }
            }

            let joiner = if window.is_empty() { 0 } else { sep_len };
            window.push_back((piece, len));
            total += len + joiner;
        }

        push_joined(&mut chunks, &window, separator);
        chunks
    }
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return vec![];
        }
        self.split_recursive(text, SEPARATORS)
    }

    fn name(&self) -> &'static str {
        "RecursiveChunker"
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

#[inline]
fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn push_joined(chunks: &mut Vec<String>, window: &VecDeque<(&str, usize)>, separator: &str) {
    let joined = window
        .iter()
        .map(|(piece, _)| *piece)
        .collect::<Vec<_>>()
        .join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

/// Default chunker (1000 characters, 200 overlap)
pub fn default_chunker() -> Box<dyn Chunker> {
    Box::new(RecursiveChunker::with_defaults())
}

// ============================================================================
// Tests
// ============================================================================
