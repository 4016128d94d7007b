//! Configuration module for tubetalk.
//!
//! Handles loading and managing application settings and prompt templates.

mod prompts;
mod settings;

pub use prompts::{Prompts, RagPrompts};
pub use settings::{
    ChunkingSettings, EmbeddingSettings, KeyPolicy, OpenAISettings, PromptSettings, RagSettings,
    ServerSettings, SessionSettings, Settings, TranscriptSettings,
};
