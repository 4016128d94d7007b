//! RAG (Retrieval-Augmented Generation) over a video's similarity index.
//!
//! Retrieves the chunks closest to a question, folds them into the prompt
//! and hands it to an [`AnswerGenerator`], either for a complete answer or a
//! stream of tokens.

pub mod context;
mod generator;
mod response;

pub use context::{format_context, format_sources_for_display};
pub use generator::{AnswerGenerator, ChatPrompt, OpenAIGenerator, TokenStream};
pub use response::{RagEngine, RagResponse, StreamingAnswer, DEFAULT_TOP_K};

#[cfg(test)]
pub(crate) use response::testing;
