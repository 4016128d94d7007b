//! Splitting transcript text into overlapping, fixed-size chunks.
//!
//! Chunk length is measured in characters (Unicode scalar values), so a
//! chunk never splits a multi-byte character.

mod splitter;

pub use splitter::TextSplitter;

use serde::{Deserialize, Serialize};

/// Default maximum chunk length in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Default number of characters shared by consecutive chunks.
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;

/// A slice of transcript text used as a retrieval unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextChunk {
    /// Text content of this chunk.
    pub content: String,
    /// Position of this chunk in the transcript.
    pub order: usize,
    /// Character offset of the chunk's first character in the source text.
    pub start_char: usize,
}

impl TextChunk {
    /// Length in characters.
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}
