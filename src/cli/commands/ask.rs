//! Ask command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::{Prompts, Settings};
use crate::orchestrator::Orchestrator;
use crate::rag::{format_sources_for_display, OpenAIGenerator, RagEngine};
use anyhow::Result;
use futures::StreamExt;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

/// Run the ask command.
pub async fn run_ask(
    url: &str,
    question: &str,
    batch: bool,
    show_sources: bool,
    settings: Settings,
) -> Result<()> {
    // Pre-flight checks
    if let Err(e) = preflight::check(Operation::Ask, &settings.transcript.ytdlp_path) {
        Output::error(&format!("{}", e));
        Output::info("Run 'tubetalk doctor' for detailed diagnostics.");
        return Err(e.into());
    }

    let orchestrator = Orchestrator::new(&settings)?;
    let prompts = Prompts::load(
        settings.prompts.custom_dir.as_deref(),
        Some(&settings.prompts.variables),
    )?;
    let generator = Arc::new(OpenAIGenerator::from_settings(
        &settings.rag,
        Duration::from_secs(settings.openai.timeout_secs),
    ));
    let engine = RagEngine::new(orchestrator.embedder(), generator)
        .with_prompts(prompts)
        .with_top_k(settings.rag.top_k);

    let spinner = Output::spinner("Fetching transcript and building index...");
    let index = match orchestrator.build_index(url).await {
        Ok(index) => index,
        Err(e) => {
            spinner.finish_and_clear();
            Output::error(&format!("Failed to index video: {}", e));
            return Err(e.into());
        }
    };
    spinner.set_message("Thinking...");

    let sources = if batch {
        let response = match engine.answer(&index, question).await {
            Ok(response) => response,
            Err(e) => {
                spinner.finish_and_clear();
                Output::error(&format!("Failed to generate answer: {}", e));
                return Err(e.into());
            }
        };
        spinner.finish_and_clear();
        println!("\n{}\n", response.answer);
        response.sources
    } else {
        let mut answer = match engine.answer_stream(&index, question).await {
            Ok(answer) => answer,
            Err(e) => {
                spinner.finish_and_clear();
                Output::error(&format!("Failed to generate answer: {}", e));
                return Err(e.into());
            }
        };
        spinner.finish_and_clear();

        println!();
        let mut stdout = std::io::stdout();
        while let Some(token) = answer.tokens.next().await {
            let token = token?;
            write!(stdout, "{}", token)?;
            stdout.flush()?;
        }
        println!("\n");
        answer.sources
    };

    if show_sources && !sources.is_empty() {
        Output::header("Sources");
        println!("{}", format_sources_for_display(&sources, 200));
    }

    Ok(())
}
