//! Sliding-window text splitter.
//!
//! Windows are measured in characters (Unicode scalar values). Each window after the first starts
//! `chunk_overlap` characters before the previous one ended, so dropping that prefix from every
//! window but the first and concatenating reproduces the input exactly. Only the final window may
//! be shorter than `chunk_size`.

use super::types::{Chunk, ChunkMetadata, ChunkingError, RawDocument};
use crate::config::Config;

/// Deterministic character-window splitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextSplitter {
    /// Build a splitter, rejecting windows that cannot make progress.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, ChunkingError> {
        if chunk_size == 0 {
            return Err(ChunkingError::InvalidChunkSize);
        }
        if chunk_overlap >= chunk_size {
            return Err(ChunkingError::InvalidOverlap {
                size: chunk_size,
                overlap: chunk_overlap,
            });
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    /// Splitter using the configured window.
    pub fn from_config(config: &Config) -> Result<Self, ChunkingError> {
        Self::new(
            config.text_splitter_chunk_size,
            config.text_splitter_chunk_overlap,
        )
    }

    /// Maximum window length in characters.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Characters shared by consecutive windows.
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split a document into ordered chunks carrying its metadata.
    pub fn split(&self, document: &RawDocument) -> Vec<Chunk> {
        self.windows(&document.text)
            .into_iter()
            .enumerate()
            .map(|(chunk_index, window)| Chunk {
                text: window.text.to_string(),
                metadata: ChunkMetadata {
                    source: document.metadata.source.clone(),
                    content_hash: document.metadata.content_hash.clone(),
                    chunk_index,
                    char_start: window.char_start,
                    char_len: window.char_len,
                },
            })
            .collect()
    }

    fn windows<'a>(&self, text: &'a str) -> Vec<Window<'a>> {
        // Byte offset of every character plus the end of the text.
        let boundaries: Vec<usize> = text
            .char_indices()
            .map(|(offset, _)| offset)
            .chain(std::iter::once(text.len()))
            .collect();
        let total = boundaries.len() - 1;
        if total == 0 {
            return Vec::new();
        }

        let mut windows = Vec::with_capacity(total / (self.chunk_size - self.chunk_overlap) + 1);
        let mut start = 0;
        loop {
            let end = (start + self.chunk_size).min(total);
            windows.push(Window {
                text: &text[boundaries[start]..boundaries[end]],
                char_start: start,
                char_len: end - start,
            });
            if end == total {
                break;
            }
            start = end - self.chunk_overlap;
        }
        windows
    }
}

struct Window<'a> {
    text: &'a str,
    char_start: usize,
    char_len: usize,
}

/// Rebuild the original text from chunks produced with `overlap`.
pub fn reassemble(chunks: &[Chunk], overlap: usize) -> String {
    let mut text = String::new();
    for (idx, chunk) in chunks.iter().enumerate() {
        if idx == 0 {
            text.push_str(&chunk.text);
        } else {
            text.extend(chunk.text.chars().skip(overlap));
        }
    }
    text
}
