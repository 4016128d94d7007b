//! Tubetalk - Ask questions about YouTube videos
//!
//! A small service that answers questions about a video from its transcript.
//!
//! # Overview
//!
//! A client (typically a browser extension running on youtube.com) opens a
//! socket, sends a question together with the video URL, and receives the
//! answer token by token. The first message of a session retrieves the
//! transcript, splits it into overlapping chunks and embeds them; later
//! messages on the same session reuse that index.
//!
//! # Architecture
//!
//! - `config` - Settings and prompt templates
//! - `transcript` - Caption retrieval
//! - `chunking` - Sliding-window text splitting
//! - `embedding` - Embedding generation
//! - `index` - In-memory similarity search
//! - `orchestrator` - Transcript to index pipeline
//! - `rag` - Prompt assembly and answer generation
//! - `session` - Bounded per-session index cache
//! - `server` - Socket transport and message handling
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tubetalk::config::Settings;
//! use tubetalk::embedding::OpenAIEmbedder;
//! use tubetalk::orchestrator::Orchestrator;
//! use tubetalk::rag::{OpenAIGenerator, RagEngine};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let orchestrator = Orchestrator::new(&settings)?;
//!
//!     let index = orchestrator.build_index("https://youtu.be/dQw4w9WgXcQ").await?;
//!     let generator = Arc::new(OpenAIGenerator::from_settings(
//!         &settings.rag,
//!         std::time::Duration::from_secs(settings.openai.timeout_secs),
//!     ));
//!     let engine = RagEngine::new(orchestrator.embedder(), generator);
//!
//!     let response = engine.answer(&index, "What is this video about?").await?;
//!     println!("{}", response.answer);
//!
//!     Ok(())
//! }
//! ```

pub mod chunking;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod index;
pub mod openai;
pub mod orchestrator;
pub mod rag;
pub mod server;
pub mod session;
pub mod transcript;

pub use error::{Result, TubetalkError};
