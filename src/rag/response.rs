//! RAG answering over a similarity index.

use super::context::format_context;
use super::generator::{AnswerGenerator, ChatPrompt, TokenStream};
use crate::config::Prompts;
use crate::embedding::Embedder;
use crate::error::{Result, TubetalkError};
use crate::index::{ScoredChunk, SimilarityIndex};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Default number of chunks retrieved per question.
pub const DEFAULT_TOP_K: usize = 4;

/// RAG engine for question answering.
pub struct RagEngine {
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn AnswerGenerator>,
    prompts: Prompts,
    top_k: usize,
}

impl RagEngine {
    /// Create a new RAG engine.
    pub fn new(embedder: Arc<dyn Embedder>, generator: Arc<dyn AnswerGenerator>) -> Self {
        Self {
            embedder,
            generator,
            prompts: Prompts::default(),
            top_k: DEFAULT_TOP_K,
        }
    }

    /// Set custom prompts (with user-defined variables).
    pub fn with_prompts(mut self, prompts: Prompts) -> Self {
        self.prompts = prompts;
        self
    }

    /// Set the number of chunks retrieved per question.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Find the chunks most similar to the question.
    pub async fn retrieve(&self, index: &SimilarityIndex, question: &str) -> Result<Vec<ScoredChunk>> {
        let query_embedding = self.embedder.embed(question).await?;
        if !index.is_empty() && query_embedding.len() != index.dimensions() {
            return Err(TubetalkError::Index(format!(
                "question embedding has {} dimensions, index has {}",
                query_embedding.len(),
                index.dimensions()
            )));
        }
        let sources = index.search(&query_embedding, self.top_k);
        debug!("Retrieved {} of {} chunks", sources.len(), index.len());
        Ok(sources)
    }

    /// Render the system and user messages for a question and its sources.
    pub fn build_prompt(&self, question: &str, sources: &[ScoredChunk]) -> ChatPrompt {
        let mut vars = HashMap::new();
        vars.insert("context".to_string(), format_context(sources));
        vars.insert("question".to_string(), question.to_string());

        ChatPrompt {
            system: self.prompts.render_with_custom(&self.prompts.rag.system, &vars),
            user: self.prompts.render_with_custom(&self.prompts.rag.user, &vars),
        }
    }

    /// Answer a question in one piece.
    #[instrument(skip(self, index), fields(video = %index.video_id()))]
    pub async fn answer(&self, index: &SimilarityIndex, question: &str) -> Result<RagResponse> {
        let sources = self.retrieve(index, question).await?;
        let prompt = self.build_prompt(question, &sources);
        let answer = self.generator.generate(&prompt).await?;

        Ok(RagResponse { answer, sources })
    }

    /// Answer a question as a stream of tokens.
    #[instrument(skip(self, index), fields(video = %index.video_id()))]
    pub async fn answer_stream(&self, index: &SimilarityIndex, question: &str) -> Result<StreamingAnswer> {
        let sources = self.retrieve(index, question).await?;
        let prompt = self.build_prompt(question, &sources);
        let tokens = self.generator.stream(&prompt).await?;

        Ok(StreamingAnswer { sources, tokens })
    }
}

/// A RAG response with answer and sources.
#[derive(Debug, Clone)]
pub struct RagResponse {
    /// The generated answer.
    pub answer: String,
    /// Chunks used as context, best first.
    pub sources: Vec<ScoredChunk>,
}

/// An answer still being generated.
pub struct StreamingAnswer {
    /// Chunks used as context, best first.
    pub sources: Vec<ScoredChunk>,
    /// Answer tokens in arrival order.
    pub tokens: TokenStream,
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted generator for handler and engine tests.

    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replays fixed tokens and records every prompt it receives.
    pub struct ScriptedGenerator {
        pub tokens: Vec<String>,
        pub fail_with: Option<String>,
        pub prompts: Mutex<Vec<ChatPrompt>>,
    }

    impl ScriptedGenerator {
        pub fn new(tokens: &[&str]) -> Self {
            Self {
                tokens: tokens.iter().map(|t| t.to_string()).collect(),
                fail_with: None,
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn failing(message: &str) -> Self {
            Self {
                tokens: Vec::new(),
                fail_with: Some(message.to_string()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn last_prompt(&self) -> Option<ChatPrompt> {
            self.prompts.lock().unwrap().last().cloned()
        }

        fn record(&self, prompt: &ChatPrompt) -> Result<()> {
            self.prompts.lock().unwrap().push(prompt.clone());
            match &self.fail_with {
                Some(message) => Err(TubetalkError::Generation(message.clone())),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl AnswerGenerator for ScriptedGenerator {
        async fn generate(&self, prompt: &ChatPrompt) -> Result<String> {
            self.record(prompt)?;
            Ok(self.tokens.concat())
        }

        async fn stream(&self, prompt: &ChatPrompt) -> Result<TokenStream> {
            self.record(prompt)?;
            let items: Vec<Result<String>> = self.tokens.iter().cloned().map(Ok).collect();
            Ok(Box::pin(futures::stream::iter(items)))
        }
    }
}
