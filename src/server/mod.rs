//! Socket server.
//!
//! Clients connect to `GET /socket` and exchange JSON event frames (see
//! [`protocol`]). Each connection is one session: its messages are handled
//! in arrival order, and its answers are written back on the same socket.

mod handler;
pub mod protocol;

pub use handler::{HandlerOptions, MessageHandler};
pub use protocol::{parse_inbound, Inbound, OutboundEvent, SendMessage};

use crate::config::{Prompts, Settings};
use crate::error::Result;
use crate::orchestrator::Orchestrator;
use crate::rag::{OpenAIGenerator, RagEngine};
use crate::session::SessionCache;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{debug, info, warn};

/// Outbound events buffered per connection before the handler waits on the writer.
const OUTBOUND_BUFFER: usize = 256;

/// Inbound messages queued per connection while an earlier one is answered.
const INBOUND_BUFFER: usize = 32;

/// Shared application state.
pub struct AppState {
    pub handler: MessageHandler,
    pub settings: Settings,
}

/// Wire up the production pipeline from settings.
pub fn build_state(settings: Settings) -> Result<Arc<AppState>> {
    let orchestrator = Arc::new(Orchestrator::new(&settings)?);

    let prompts = Prompts::load(
        settings.prompts.custom_dir.as_deref(),
        Some(&settings.prompts.variables),
    )?;
    let generator = Arc::new(OpenAIGenerator::from_settings(
        &settings.rag,
        Duration::from_secs(settings.openai.timeout_secs),
    ));
    let engine = Arc::new(
        RagEngine::new(orchestrator.embedder(), generator)
            .with_prompts(prompts)
            .with_top_k(settings.rag.top_k),
    );

    let cache = Arc::new(SessionCache::new(settings.session.capacity));
    let handler = MessageHandler::new(
        cache,
        orchestrator,
        engine,
        HandlerOptions::from_settings(&settings),
    );

    Ok(build_state_with(handler, settings))
}

/// Wrap an already-assembled handler.
pub fn build_state_with(handler: MessageHandler, settings: Settings) -> Arc<AppState> {
    Arc::new(AppState { handler, settings })
}

/// Build the router with CORS applied.
pub fn router(state: Arc<AppState>) -> Router {
    let origins: Vec<HeaderValue> = state
        .settings
        .server
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid allowed origin: {}", origin);
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET]);

    Router::new()
        .route("/health", get(health))
        .route("/socket", get(socket))
        .layer(cors)
        .with_state(state)
}

/// Serve until the listener fails.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn socket(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    if state.settings.server.restrict_socket_origin
        && !origin_allowed(&headers, &state.settings.server.allowed_origins)
    {
        warn!("Rejected socket connection from disallowed origin");
        return StatusCode::FORBIDDEN.into_response();
    }

    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Whether the request's `Origin` header is on the allow-list.
pub fn origin_allowed(headers: &HeaderMap, allowed: &[String]) -> bool {
    headers
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok())
        .map(|origin| allowed.iter().any(|a| a == origin))
        .unwrap_or(false)
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let session = uuid::Uuid::new_v4().to_string();
    info!("Session {} connected", session);

    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<OutboundEvent>(OUTBOUND_BUFFER);
    let (in_tx, mut in_rx) = mpsc::channel::<SendMessage>(INBOUND_BUFFER);

    let writer = tokio::spawn(async move {
        while let Some(event) = out_rx.recv().await {
            let frame = match event.to_frame() {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("Failed to encode outbound event: {}", e);
                    continue;
                }
            };
            if sink.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    let worker = {
        let state = state.clone();
        let session = session.clone();
        tokio::spawn(async move {
            while let Some(message) = in_rx.recv().await {
                state.handler.handle(&session, message, &out_tx).await;
            }
        })
    };

    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!("Session {} read error: {}", session, e);
                break;
            }
        };

        match parse_inbound(text.as_str()) {
            Ok(Inbound::SendMessage(message)) => {
                if in_tx.send(message).await.is_err() {
                    break;
                }
            }
            Ok(Inbound::Unknown(event)) => debug!("Ignoring unknown event {}", event),
            Err(e) => debug!("Ignoring malformed frame: {}", e),
        }
    }

    // Dropping the worker cancels any answer still streaming.
    drop(in_tx);
    worker.abort();
    writer.abort();

    state.handler.end_session(&session).await;
    info!("Session {} disconnected", session);
}
