//! Answer generation via a hosted chat model.

use crate::config::RagSettings;
use crate::error::{Result, TubetalkError};
use crate::openai::create_client_with_timeout;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequest,
    CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, instrument};

/// Lazy sequence of answer tokens. Dropping it cancels generation.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A rendered two-message prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatPrompt {
    pub system: String,
    pub user: String,
}

/// Trait for chat-completion backends.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// Generate the complete answer.
    async fn generate(&self, prompt: &ChatPrompt) -> Result<String>;

    /// Start generation and return its tokens as they arrive.
    async fn stream(&self, prompt: &ChatPrompt) -> Result<TokenStream>;
}

/// OpenAI chat-completions generator.
pub struct OpenAIGenerator {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    model: String,
    temperature: f32,
}

impl OpenAIGenerator {
    pub fn new(model: &str, temperature: f32, timeout: Duration) -> Self {
        Self {
            client: create_client_with_timeout(timeout),
            model: model.to_string(),
            temperature,
        }
    }

    pub fn from_settings(settings: &RagSettings, timeout: Duration) -> Self {
        Self::new(&settings.model, settings.temperature, timeout)
    }

    fn request(&self, prompt: &ChatPrompt, stream: bool) -> Result<CreateChatCompletionRequest> {
        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(prompt.system.clone())
                .build()
                .map_err(|e| TubetalkError::Generation(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt.user.clone())
                .build()
                .map_err(|e| TubetalkError::Generation(e.to_string()))?
                .into(),
        ];

        CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(self.temperature)
            .stream(stream)
            .build()
            .map_err(|e| TubetalkError::Generation(e.to_string()))
    }
}

#[async_trait]
impl AnswerGenerator for OpenAIGenerator {
    #[instrument(skip(self, prompt), fields(model = %self.model))]
    async fn generate(&self, prompt: &ChatPrompt) -> Result<String> {
        let request = self.request(prompt, false)?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            TubetalkError::OpenAI(format!("Failed to generate response: {}", e))
        })?;

        let answer = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| TubetalkError::Generation("Empty response from LLM".to_string()))?;

        debug!("Generated {} chars", answer.len());
        Ok(answer)
    }

    #[instrument(skip(self, prompt), fields(model = %self.model))]
    async fn stream(&self, prompt: &ChatPrompt) -> Result<TokenStream> {
        let request = self.request(prompt, true)?;

        let upstream = self.client.chat().create_stream(request).await.map_err(|e| {
            TubetalkError::OpenAI(format!("Failed to start response stream: {}", e))
        })?;

        let tokens = upstream.filter_map(|item| async move {
            match item {
                Ok(chunk) => chunk
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.delta.content)
                    .filter(|token| !token.is_empty())
                    .map(Ok),
                Err(e) => Some(Err(TubetalkError::OpenAI(format!("Response stream error: {}", e)))),
            }
        });

        Ok(Box::pin(tokens))
    }
}
