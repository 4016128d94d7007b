//! Per-message request handling.
//!
//! Each `send_message` either reuses the session's cached index (HIT) or
//! builds one (MISS), then answers and emits `message_response` events.

use super::protocol::{OutboundEvent, SendMessage};
use crate::config::{KeyPolicy, Settings};
use crate::error::{Result, TubetalkError};
use crate::orchestrator::Orchestrator;
use crate::rag::RagEngine;
use crate::session::{CacheOutcome, SessionCache};
use crate::transcript::extract_video_id;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

/// Options controlling how answers are delivered.
#[derive(Debug, Clone)]
pub struct HandlerOptions {
    pub key_policy: KeyPolicy,
    pub streaming: bool,
    pub report_errors: bool,
    pub evict_on_disconnect: bool,
}

impl HandlerOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            key_policy: settings.session.key_policy,
            streaming: settings.rag.streaming,
            report_errors: settings.server.report_errors,
            evict_on_disconnect: settings.session.evict_on_disconnect,
        }
    }
}

impl Default for HandlerOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

/// Orchestrates cache lookup, answering and response delivery.
pub struct MessageHandler {
    cache: Arc<SessionCache>,
    orchestrator: Arc<Orchestrator>,
    engine: Arc<RagEngine>,
    options: HandlerOptions,
}

impl MessageHandler {
    pub fn new(
        cache: Arc<SessionCache>,
        orchestrator: Arc<Orchestrator>,
        engine: Arc<RagEngine>,
        options: HandlerOptions,
    ) -> Self {
        Self {
            cache,
            orchestrator,
            engine,
            options,
        }
    }

    pub fn cache(&self) -> Arc<SessionCache> {
        self.cache.clone()
    }

    /// Derive the cache key for a message under the configured policy.
    pub fn cache_key(&self, session: &str, url: Option<&str>) -> Result<String> {
        match self.options.key_policy {
            KeyPolicy::Session => Ok(session.to_string()),
            KeyPolicy::Video => {
                let url = url.ok_or_else(|| {
                    TubetalkError::InvalidInput("missing `url` field".to_string())
                })?;
                extract_video_id(url)
                    .map(|id| format!("video:{}", id))
                    .ok_or_else(|| {
                        TubetalkError::InvalidInput(format!("Invalid YouTube video ID or URL: {}", url))
                    })
            }
        }
    }

    /// Handle one message, reporting failures to the client when enabled.
    pub async fn handle(&self, session: &str, message: SendMessage, out: &mpsc::Sender<OutboundEvent>) {
        match self.process(session, message, out).await {
            Ok(()) => {}
            Err(TubetalkError::Disconnected) => {
                debug!("Session {} went away mid-answer", session);
            }
            Err(e) => {
                warn!("Message on session {} failed: {}", session, e);
                if self.options.report_errors {
                    let _ = out.send(OutboundEvent::error(e.to_string())).await;
                }
            }
        }
    }

    #[instrument(skip(self, message, out))]
    async fn process(
        &self,
        session: &str,
        message: SendMessage,
        out: &mpsc::Sender<OutboundEvent>,
    ) -> Result<()> {
        let question = message
            .message
            .filter(|m| !m.trim().is_empty())
            .ok_or_else(|| TubetalkError::InvalidInput("missing `message` field".to_string()))?;

        let key = self.cache_key(session, message.url.as_deref())?;
        let url = message.url;

        let (index, outcome) = self
            .cache
            .get_or_build(&key, || async move {
                let url = url.ok_or_else(|| {
                    TubetalkError::InvalidInput("missing `url` field".to_string())
                })?;
                self.orchestrator.build_index(&url).await
            })
            .await?;

        match outcome {
            CacheOutcome::Miss => info!("Stored index for {} in cache", key),
            CacheOutcome::Hit => debug!("Reusing cached index for {} ({})", key, index.source()),
        }

        if self.options.streaming {
            let mut answer = self.engine.answer_stream(&index, &question).await?;
            while let Some(token) = answer.tokens.next().await {
                emit(out, OutboundEvent::response(token?)).await?;
            }
            emit(out, OutboundEvent::end()).await?;
        } else {
            let response = self.engine.answer(&index, &question).await?;
            emit(out, OutboundEvent::response(response.answer)).await?;
        }

        Ok(())
    }

    /// Release per-session state once its connection has closed.
    pub async fn end_session(&self, session: &str) {
        if self.options.evict_on_disconnect
            && self.options.key_policy == KeyPolicy::Session
            && self.cache.remove(session).await
        {
            debug!("Evicted index for closed session {}", session);
        }
    }
}

async fn emit(out: &mpsc::Sender<OutboundEvent>, event: OutboundEvent) -> Result<()> {
    out.send(event).await.map_err(|_| TubetalkError::Disconnected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::TextSplitter;
    use crate::orchestrator::testing::{FakeEmbedder, FakeTranscripts};
    use crate::rag::testing::ScriptedGenerator;
    use crate::rag::AnswerGenerator;
    use crate::server::protocol::END_SENTINEL;

    struct Harness {
        transcripts: Arc<FakeTranscripts>,
        embedder: Arc<FakeEmbedder>,
        generator: Arc<ScriptedGenerator>,
        handler: MessageHandler,
    }

    fn harness_with(generator: ScriptedGenerator, options: HandlerOptions) -> Harness {
        let transcripts = Arc::new(FakeTranscripts::default());
        let embedder = Arc::new(FakeEmbedder::default());
        let generator = Arc::new(generator);

        let orchestrator = Arc::new(Orchestrator::with_components(
            transcripts.clone(),
            TextSplitter::default(),
            embedder.clone(),
        ));
        let engine = Arc::new(RagEngine::new(
            embedder.clone(),
            generator.clone() as Arc<dyn AnswerGenerator>,
        ));
        let handler = MessageHandler::new(Arc::new(SessionCache::new(16)), orchestrator, engine, options);

        Harness {
            transcripts,
            embedder,
            generator,
            handler,
        }
    }

    fn harness() -> Harness {
        harness_with(ScriptedGenerator::new(&["The video ", "is about ", "cats."]), HandlerOptions::default())
    }

    fn message(question: Option<&str>, url: Option<&str>) -> SendMessage {
        SendMessage {
            message: question.map(str::to_string),
            url: url.map(str::to_string),
        }
    }

    async fn send(h: &Harness, session: &str, msg: SendMessage) -> Vec<OutboundEvent> {
        let (tx, mut rx) = mpsc::channel(64);
        h.handler.handle(session, msg, &tx).await;
        drop(tx);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_new_session_streams_answer_then_end() {
        let h = harness();

        let events = send(&h, "s1", message(Some("What is this video about?"), Some("https://youtu.be/abc"))).await;

        assert_eq!(
            events,
            vec![
                OutboundEvent::response("The video "),
                OutboundEvent::response("is about "),
                OutboundEvent::response("cats."),
                OutboundEvent::end(),
            ]
        );
        assert_eq!(events.iter().filter(|e| e.is_end()).count(), 1);
        assert!(events.last().unwrap().is_end());
        assert_eq!(h.transcripts.calls(), 1);
    }

    #[tokio::test]
    async fn test_repeat_session_reuses_index() {
        let h = harness();

        send(&h, "s1", message(Some("What is this video about?"), Some("https://youtu.be/abc"))).await;
        let events = send(&h, "s1", message(Some("Who is speaking?"), Some("https://youtu.be/abc"))).await;

        assert!(events.last().unwrap().is_end());
        assert_eq!(h.transcripts.calls(), 1);
        assert_eq!(h.embedder.batch_calls(), 1);
        assert_eq!(
            h.generator.last_prompt().unwrap().user,
            "Answer the following question: Who is speaking?"
        );
    }

    #[tokio::test]
    async fn test_url_ignored_on_hit() {
        let h = harness();

        send(&h, "s1", message(Some("first"), Some("https://youtu.be/abc"))).await;
        let events = send(&h, "s1", message(Some("second"), Some("https://youtu.be/xyz"))).await;

        assert!(events.last().unwrap().is_end());
        assert_eq!(h.transcripts.calls(), 1);
        assert_eq!(*h.transcripts.fetched.lock().unwrap(), vec!["https://youtu.be/abc"]);
        // Context still comes from the first video's transcript.
        assert!(h.generator.last_prompt().unwrap().system.contains("youtu.be/abc"));
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let h = harness();

        send(&h, "s1", message(Some("q"), Some("https://youtu.be/abc"))).await;
        send(&h, "s2", message(Some("q"), Some("https://youtu.be/abc"))).await;

        assert_eq!(h.transcripts.calls(), 2);
    }

    #[tokio::test]
    async fn test_missing_url_on_miss_reports_error_without_response() {
        let h = harness();

        let events = send(&h, "s1", message(Some("What is this video about?"), None)).await;

        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], OutboundEvent::MessageError { error } if error.contains("url")));
        assert!(!h.handler.cache().contains("s1").await);

        // The session is still usable afterwards.
        let events = send(&h, "s1", message(Some("again"), Some("https://youtu.be/abc"))).await;
        assert!(events.last().unwrap().is_end());
    }

    #[tokio::test]
    async fn test_silent_drop_when_reporting_disabled() {
        let options = HandlerOptions {
            report_errors: false,
            ..HandlerOptions::default()
        };
        let h = harness_with(ScriptedGenerator::new(&["x"]), options);

        let events = send(&h, "s1", message(Some("q"), None)).await;
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_missing_message_is_rejected() {
        let h = harness();

        let events = send(&h, "s1", message(None, Some("https://youtu.be/abc"))).await;
        assert!(matches!(&events[..], [OutboundEvent::MessageError { .. }]));
        assert_eq!(h.transcripts.calls(), 0);
    }

    #[tokio::test]
    async fn test_generation_failure_is_reported() {
        let h = harness_with(ScriptedGenerator::failing("quota exceeded"), HandlerOptions::default());

        let events = send(&h, "s1", message(Some("q"), Some("https://youtu.be/abc"))).await;
        assert!(matches!(&events[..], [OutboundEvent::MessageError { error }] if error.contains("quota")));
        // The index was built before generation failed and stays cached.
        assert!(h.handler.cache().contains("s1").await);
    }

    #[tokio::test]
    async fn test_batch_mode_sends_single_response() {
        let options = HandlerOptions {
            streaming: false,
            ..HandlerOptions::default()
        };
        let h = harness_with(ScriptedGenerator::new(&["The video ", "is about cats."]), options);

        let events = send(&h, "s1", message(Some("q"), Some("https://youtu.be/abc"))).await;
        assert_eq!(events, vec![OutboundEvent::response("The video is about cats.")]);
        assert!(events.iter().all(|e| !matches!(e, OutboundEvent::MessageResponse { response } if response == END_SENTINEL)));
    }

    #[tokio::test]
    async fn test_video_key_policy_rebuilds_on_new_url() {
        let options = HandlerOptions {
            key_policy: KeyPolicy::Video,
            ..HandlerOptions::default()
        };
        let h = harness_with(ScriptedGenerator::new(&["ok"]), options);

        send(&h, "s1", message(Some("q"), Some("https://youtu.be/abcdefghijk"))).await;
        send(&h, "s2", message(Some("q"), Some("https://www.youtube.com/watch?v=abcdefghijk"))).await;
        assert_eq!(h.transcripts.calls(), 1);

        send(&h, "s1", message(Some("q"), Some("https://youtu.be/zyxwvutsrqp"))).await;
        assert_eq!(h.transcripts.calls(), 2);
    }

    #[tokio::test]
    async fn test_end_session_evicts() {
        let h = harness();

        send(&h, "s1", message(Some("q"), Some("https://youtu.be/abc"))).await;
        assert!(h.handler.cache().contains("s1").await);

        h.handler.end_session("s1").await;
        assert!(!h.handler.cache().contains("s1").await);
    }

    #[tokio::test]
    async fn test_disconnect_mid_stream_is_quiet() {
        let h = harness();
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        h.handler
            .handle("s1", message(Some("q"), Some("https://youtu.be/abc")), &tx)
            .await;
        // Index was still built and cached; nothing panicked.
        assert!(h.handler.cache().contains("s1").await);
    }
}
