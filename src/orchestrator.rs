//! Index building pipeline.
//!
//! Coordinates transcript retrieval, chunking, embedding and indexing for a
//! single video locator.

use crate::chunking::TextSplitter;
use crate::config::Settings;
use crate::embedding::{Embedder, OpenAIEmbedder};
use crate::error::{Result, TubetalkError};
use crate::index::SimilarityIndex;
use crate::transcript::{Transcript, TranscriptSource, YoutubeTranscripts};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Builds similarity indexes from video locators.
pub struct Orchestrator {
    transcripts: Arc<dyn TranscriptSource>,
    splitter: TextSplitter,
    embedder: Arc<dyn Embedder>,
}

impl Orchestrator {
    /// Create an orchestrator backed by YouTube captions and OpenAI embeddings.
    pub fn new(settings: &Settings) -> Result<Self> {
        let transcripts: Arc<dyn TranscriptSource> =
            Arc::new(YoutubeTranscripts::with_settings(&settings.transcript));

        let embedder: Arc<dyn Embedder> = Arc::new(OpenAIEmbedder::from_settings(
            &settings.embedding,
            Duration::from_secs(settings.openai.timeout_secs),
        ));

        let splitter = TextSplitter::from_settings(&settings.chunking)?;

        Ok(Self::with_components(transcripts, splitter, embedder))
    }

    /// Create an orchestrator with custom components.
    pub fn with_components(
        transcripts: Arc<dyn TranscriptSource>,
        splitter: TextSplitter,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            transcripts,
            splitter,
            embedder,
        }
    }

    /// Get a reference to the embedder.
    pub fn embedder(&self) -> Arc<dyn Embedder> {
        self.embedder.clone()
    }

    /// Fetch a transcript without indexing it.
    pub async fn fetch_transcript(&self, locator: &str) -> Result<Transcript> {
        self.transcripts.fetch(locator).await
    }

    /// Retrieve, chunk, embed and index the transcript behind `locator`.
    #[instrument(skip(self))]
    pub async fn build_index(&self, locator: &str) -> Result<SimilarityIndex> {
        let transcript = self.transcripts.fetch(locator).await?;
        if transcript.is_empty() {
            return Err(TubetalkError::EmptyTranscript(transcript.video_id));
        }
        debug!(
            "Transcript {} has {} segments ({:.0}s)",
            transcript.video_id,
            transcript.segments.len(),
            transcript.duration_seconds()
        );

        let chunks = self.splitter.split_transcript(&transcript);
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;

        let index = SimilarityIndex::new(locator, transcript.video_id, chunks, embeddings)?;
        if index.dimensions() != self.embedder.dimensions() {
            return Err(TubetalkError::Embedding(format!(
                "expected {}-dimensional embeddings, got {}",
                self.embedder.dimensions(),
                index.dimensions()
            )));
        }
        info!("Indexed {} chunks for {}", index.len(), index.video_id());

        Ok(index)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{FakeEmbedder, FakeTranscripts};
    use super::*;

    fn orchestrator() -> (Arc<FakeTranscripts>, Arc<FakeEmbedder>, Orchestrator) {
        let transcripts = Arc::new(FakeTranscripts::default());
        let embedder = Arc::new(FakeEmbedder::default());
        let orchestrator = Orchestrator::with_components(
            transcripts.clone(),
            TextSplitter::default(),
            embedder.clone(),
        );
        (transcripts, embedder, orchestrator)
    }

    #[tokio::test]
    async fn test_build_index_runs_pipeline() {
        let (transcripts, embedder, orchestrator) = orchestrator();

        let index = orchestrator.build_index("https://youtu.be/abc").await.unwrap();

        assert_eq!(transcripts.calls(), 1);
        assert_eq!(embedder.batch_calls(), 1);
        assert_eq!(index.source(), "https://youtu.be/abc");
        // 300 repetitions of a 21-char token is 6300 chars: 7 windows of 1000/900.
        assert_eq!(index.len(), 7);
        assert_eq!(index.dimensions(), 2);
    }

    #[tokio::test]
    async fn test_empty_transcript_is_an_error() {
        let (_, embedder, orchestrator) = orchestrator();

        let err = orchestrator.build_index("silent").await.unwrap_err();
        assert!(matches!(err, TubetalkError::EmptyTranscript(_)));
        assert_eq!(embedder.batch_calls(), 0);
    }

    struct WideEmbedder;

    #[async_trait::async_trait]
    impl Embedder for WideEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0; 3])
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0; 3]).collect())
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    #[tokio::test]
    async fn test_embedding_dimension_mismatch_is_an_error() {
        let orchestrator = Orchestrator::with_components(
            Arc::new(FakeTranscripts::default()),
            TextSplitter::default(),
            Arc::new(WideEmbedder),
        );

        let err = orchestrator.build_index("https://youtu.be/abc").await.unwrap_err();
        assert!(matches!(err, TubetalkError::Embedding(_)));
    }

    #[tokio::test]
    async fn test_retrieval_error_propagates() {
        let (_, _, orchestrator) = orchestrator();
        let err = orchestrator.build_index("").await.unwrap_err();
        assert!(matches!(err, TubetalkError::InvalidInput(_)));
    }
}
