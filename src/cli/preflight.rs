//! Pre-flight checks before expensive operations.
//!
//! Validates that required tools and configuration are available
//! before starting operations that would otherwise fail midway.

use crate::error::{Result, TubetalkError};
use std::process::Command;

/// Requirements for different operations.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// Answering needs captions and the API key.
    Ask,
    /// Printing a transcript only needs yt-dlp.
    Transcript,
    /// The server answers questions, so it needs the same as `Ask`.
    Serve,
}

/// Run pre-flight checks for the given operation.
///
/// Returns Ok(()) if all checks pass, or an error describing what's missing.
pub fn check(operation: Operation, ytdlp_path: &str) -> Result<()> {
    match operation {
        Operation::Ask | Operation::Serve => {
            check_api_key()?;
            check_tool(ytdlp_path)?;
        }
        Operation::Transcript => {
            check_tool(ytdlp_path)?;
        }
    }
    Ok(())
}

/// Check if OpenAI API key is configured.
pub fn check_api_key() -> Result<()> {
    match std::env::var("OPENAI_API_KEY") {
        Ok(key) if !key.is_empty() => Ok(()),
        Ok(_) => Err(TubetalkError::Config(
            "OPENAI_API_KEY is empty. Set it with: export OPENAI_API_KEY='sk-...'".to_string(),
        )),
        Err(_) => Err(TubetalkError::Config(
            "OPENAI_API_KEY not set. Set it with: export OPENAI_API_KEY='sk-...'".to_string(),
        )),
    }
}

/// Check if an external tool is available.
pub fn check_tool(name: &str) -> Result<()> {
    match Command::new(name).arg("--version").output() {
        Ok(output) if output.status.success() => Ok(()),
        Ok(_) => Err(TubetalkError::ToolNotFound(format!(
            "{} is installed but not working correctly",
            name
        ))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(TubetalkError::ToolNotFound(name.to_string()))
        }
        Err(e) => Err(TubetalkError::ToolNotFound(format!("{}: {}", name, e))),
    }
}
