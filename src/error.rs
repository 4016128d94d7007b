//! Error types for tubetalk.

use thiserror::Error;

/// Library-level error type for tubetalk operations.
#[derive(Error, Debug)]
pub enum TubetalkError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Transcript retrieval failed: {0}")]
    Retrieval(String),

    #[error("Transcript for {0} contains no text")]
    EmptyTranscript(String),

    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    #[error("Similarity index error: {0}")]
    Index(String),

    #[error("Answer generation failed: {0}")]
    Generation(String),

    #[error("OpenAI API error: {0}")]
    OpenAI(String),

    #[error("Client disconnected")]
    Disconnected,

    #[error("External tool not found: {0}. Please install it and ensure it's in your PATH.")]
    ToolNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for tubetalk operations.
pub type Result<T> = std::result::Result<T, TubetalkError>;
