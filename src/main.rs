//! Tubetalk CLI entry point.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use tubetalk::cli::{commands, Cli, Commands, Output};
use tubetalk::config::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; the environment may already carry the key.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Initialize logging
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("tubetalk={}", log_level)),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Load configuration
    let settings = match &cli.config {
        Some(path) => Settings::load_from(Some(&Settings::expand_path(path)))?,
        None => Settings::load()?,
    };

    if !tubetalk::openai::is_api_key_configured()
        && matches!(cli.command, Commands::Serve { .. } | Commands::Ask { .. })
    {
        Output::warning("OPENAI_API_KEY is not set; embedding and answering will fail.");
    }

    // Execute command
    match &cli.command {
        Commands::Serve { host, port } => {
            commands::run_serve(host.clone(), *port, settings).await?;
        }

        Commands::Ask {
            url,
            question,
            batch,
            sources,
        } => {
            commands::run_ask(url, question, *batch, *sources, settings).await?;
        }

        Commands::Transcript { url } => {
            commands::run_transcript(url, settings).await?;
        }

        Commands::Doctor => {
            commands::run_doctor(&settings, cli.config.as_deref())?;
        }

        Commands::Config { action } => {
            commands::run_config(action, &settings, cli.config.as_deref())?;
        }
    }

    Ok(())
}
