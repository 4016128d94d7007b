//! Socket server command.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::server;
use anyhow::Result;
use tracing::info;

/// Run the socket server.
pub async fn run_serve(host: Option<String>, port: Option<u16>, mut settings: Settings) -> Result<()> {
    if let Some(host) = host {
        settings.server.host = host;
    }
    if let Some(port) = port {
        settings.server.port = port;
    }

    // Missing credentials only fail individual messages, so start anyway.
    if let Err(e) = preflight::check(Operation::Serve, &settings.transcript.ytdlp_path) {
        Output::warning(&format!("{}", e));
    }

    let addr = settings.bind_addr();
    let state = server::build_state(settings)?;
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    Output::header("Tubetalk Server");
    println!();
    Output::success(&format!("Listening on http://{}", addr));
    println!();
    println!("Endpoints:");
    Output::kv("Health", "GET /health");
    Output::kv("Socket", "GET /socket (WebSocket)");
    Output::kv("Session key", &state.settings.session.key_policy.to_string());
    Output::kv(
        "Delivery",
        if state.settings.rag.streaming { "streaming" } else { "batch" },
    );
    println!();
    Output::info("Press Ctrl+C to stop the server.");

    server::serve(listener, state).await?;

    Ok(())
}
