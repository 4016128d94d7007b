//! Sliding-window text splitter.

use super::{TextChunk, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use crate::config::ChunkingSettings;
use crate::error::{Result, TubetalkError};
use crate::transcript::Transcript;

/// Splits text into windows of at most `chunk_size` characters.
///
/// Each window starts `chunk_size - chunk_overlap` characters after the
/// previous one, so consecutive chunks share exactly `chunk_overlap`
/// characters. Only the final chunk may be shorter than `chunk_size`.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 || chunk_overlap >= chunk_size {
            return Err(TubetalkError::Config(format!(
                "invalid chunking policy: size {} with overlap {}",
                chunk_size, chunk_overlap
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn from_settings(settings: &ChunkingSettings) -> Result<Self> {
        Self::new(settings.chunk_size, settings.chunk_overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split arbitrary text. Whitespace-only text yields no chunks.
    pub fn split(&self, text: &str) -> Vec<TextChunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        // Byte offset of every character boundary, including the end.
        let bounds: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let total = bounds.len() - 1;

        let mut chunks = Vec::with_capacity(total / (self.chunk_size - self.chunk_overlap) + 1);
        let mut start = 0;

        loop {
            let end = (start + self.chunk_size).min(total);
            chunks.push(TextChunk {
                content: text[bounds[start]..bounds[end]].to_string(),
                order: chunks.len(),
                start_char: start,
            });

            if end == total {
                break;
            }
            start = end - self.chunk_overlap;
        }

        chunks
    }

    /// Split a transcript's concatenated text.
    pub fn split_transcript(&self, transcript: &Transcript) -> Vec<TextChunk> {
        self.split(&transcript.full_text)
    }
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}
