//! Configuration settings for tubetalk.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub server: ServerSettings,
    pub session: SessionSettings,
    pub transcript: TranscriptSettings,
    pub chunking: ChunkingSettings,
    pub embedding: EmbeddingSettings,
    pub rag: RagSettings,
    pub openai: OpenAISettings,
    pub prompts: PromptSettings,
}

/// Socket server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Host to bind to.
    pub host: String,
    /// Port to bind to.
    pub port: u16,
    /// Origins allowed by the CORS layer on HTTP routes.
    pub allowed_origins: Vec<String>,
    /// Also require an allowed `Origin` header on the socket upgrade.
    pub restrict_socket_origin: bool,
    /// Send a `message_error` event when a message fails instead of dropping it.
    pub report_errors: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9000,
            allowed_origins: vec!["https://www.youtube.com".to_string()],
            restrict_socket_origin: false,
            report_errors: true,
        }
    }
}

/// How the session cache derives its key from an incoming message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum KeyPolicy {
    /// One index per connection; later urls on the same connection are ignored.
    #[default]
    Session,
    /// One index per video, shared across connections.
    Video,
}

impl std::str::FromStr for KeyPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "session" | "connection" => Ok(KeyPolicy::Session),
            "video" | "url" => Ok(KeyPolicy::Video),
            _ => Err(format!("Unknown key policy: {}", s)),
        }
    }
}

impl std::fmt::Display for KeyPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyPolicy::Session => write!(f, "session"),
            KeyPolicy::Video => write!(f, "video"),
        }
    }
}

/// Session cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Maximum number of cached indexes before the least recently used is evicted.
    pub capacity: usize,
    /// Drop a connection's index when its socket closes (session key policy only).
    pub evict_on_disconnect: bool,
    /// Cache key policy (session, video).
    pub key_policy: KeyPolicy,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            capacity: 256,
            evict_on_disconnect: true,
            key_policy: KeyPolicy::Session,
        }
    }
}

/// Transcript retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptSettings {
    /// Preferred caption languages, in order.
    pub languages: Vec<String>,
    /// Fall back to auto-generated captions when no manual track exists.
    pub allow_auto_captions: bool,
    /// Path or name of the yt-dlp executable.
    pub ytdlp_path: String,
    /// Timeout for caption downloads, in seconds.
    pub timeout_secs: u64,
}

impl Default for TranscriptSettings {
    fn default() -> Self {
        Self {
            languages: vec!["en".to_string()],
            allow_auto_captions: true,
            ytdlp_path: "yt-dlp".to_string(),
            timeout_secs: 60,
        }
    }
}

/// Text chunking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks.
    pub chunk_overlap: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 100,
        }
    }
}

/// Embedding generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Embedding model to use.
    pub model: String,
    /// Embedding dimensions.
    pub dimensions: u32,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
        }
    }
}

/// RAG (Retrieval-Augmented Generation) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagSettings {
    /// Chat model for answer generation.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Number of chunks retrieved as context.
    pub top_k: usize,
    /// Stream tokens to the client as they arrive.
    pub streaming: bool,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            model: "gpt-3.5-turbo".to_string(),
            temperature: 0.3,
            top_k: 4,
            streaming: true,
        }
    }
}

/// OpenAI client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAISettings {
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for OpenAISettings {
    fn default() -> Self {
        Self {
            timeout_secs: crate::openai::DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct PromptSettings {
    /// Directory holding a custom `rag.toml` (overrides defaults).
    pub custom_dir: Option<String>,
    /// Custom variables available in all prompts as {{variable_name}}.
    pub variables: std::collections::HashMap<String, String>,
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            settings.validate()?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Reject settings that would break the chunking or cache invariants.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::TubetalkError;

        if self.chunking.chunk_size == 0 {
            return Err(TubetalkError::Config("chunking.chunk_size must be positive".to_string()));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(TubetalkError::Config(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            )));
        }
        if self.session.capacity == 0 {
            return Err(TubetalkError::Config("session.capacity must be positive".to_string()));
        }
        if self.rag.top_k == 0 {
            return Err(TubetalkError::Config("rag.top_k must be positive".to_string()));
        }
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tubetalk")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Socket address the server binds to.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
