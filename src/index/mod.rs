//! In-memory similarity index over embedded transcript chunks.
//!
//! One index is built per video and then queried many times, so it is
//! immutable after construction and shared as `Arc<SimilarityIndex>`.

use crate::chunking::TextChunk;
use crate::error::{Result, TubetalkError};

/// A chunk paired with its embedding.
#[derive(Debug, Clone)]
pub struct IndexedChunk {
    pub chunk: TextChunk,
    pub embedding: Vec<f32>,
}

/// A search hit with its similarity score (higher is better).
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: TextChunk,
    pub score: f32,
}

/// Nearest-neighbor lookup over one video's chunks.
#[derive(Debug)]
pub struct SimilarityIndex {
    source: String,
    video_id: String,
    dimensions: usize,
    entries: Vec<IndexedChunk>,
}

impl SimilarityIndex {
    /// Build an index from chunks and their embeddings, given in the same order.
    pub fn new(
        source: impl Into<String>,
        video_id: impl Into<String>,
        chunks: Vec<TextChunk>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<Self> {
        if chunks.len() != embeddings.len() {
            return Err(TubetalkError::Index(format!(
                "{} chunks but {} embeddings",
                chunks.len(),
                embeddings.len()
            )));
        }

        let dimensions = embeddings.first().map(Vec::len).unwrap_or(0);
        if let Some(bad) = embeddings.iter().find(|e| e.len() != dimensions) {
            return Err(TubetalkError::Index(format!(
                "mixed embedding dimensions: {} and {}",
                dimensions,
                bad.len()
            )));
        }

        let entries = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexedChunk { chunk, embedding })
            .collect();

        Ok(Self {
            source: source.into(),
            video_id: video_id.into(),
            dimensions,
            entries,
        })
    }

    /// The locator this index was built from.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Return the `k` chunks most similar to the query, best first.
    ///
    /// Ties keep transcript order. Fewer than `k` hits are returned only when
    /// the index holds fewer than `k` chunks.
    pub fn search(&self, query_embedding: &[f32], k: usize) -> Vec<ScoredChunk> {
        let mut scored: Vec<ScoredChunk> = self
            .entries
            .iter()
            .map(|entry| ScoredChunk {
                chunk: entry.chunk.clone(),
                score: cosine_similarity(query_embedding, &entry.embedding),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.chunk.order.cmp(&b.chunk.order))
        });
        scored.truncate(k);
        scored
    }
}

/// Compute cosine similarity between two vectors.
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
