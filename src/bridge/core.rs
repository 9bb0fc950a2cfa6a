//! Core bridge structure
//!
//! The Bridge owns the single assistant session and the chat publisher, and
//! exposes the entry points a chat routing layer calls.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::Instrument;

use crate::segment::{MessageSegmenter, SegmentPublisher};
use crate::session::ProcessSession;
use crate::stream::ChunkSink;
use crate::tracing::ErrorTraceExt;
use crate::types::{BridgeConfig, Result, SessionState, StreamOutcome};

/// Placeholder posted before the assistant produces any output
pub const THINKING_TEXT: &str = "Thinking...";

/// Copilot bridge
///
/// Shared by every handler of the routing layer; calls on the session are
/// serialized through an async mutex.
#[derive(Debug)]
pub struct Bridge {
    config: BridgeConfig,
    session: Mutex<ProcessSession>,
    publisher: Arc<dyn SegmentPublisher>,
}

impl Bridge {
    /// Create a bridge; the assistant is not spawned until [`start`](Self::start)
    pub fn new(config: BridgeConfig, publisher: Arc<dyn SegmentPublisher>) -> Self {
        Self {
            session: Mutex::new(ProcessSession::new(config.clone())),
            config,
            publisher,
        }
    }

    /// Bridge over an already running session
    #[cfg(test)]
    pub(crate) fn with_session(session: ProcessSession, publisher: Arc<dyn SegmentPublisher>) -> Self {
        Self {
            config: session.config().clone(),
            session: Mutex::new(session),
            publisher,
        }
    }

    /// Get the bridge configuration
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Current session state
    pub async fn state(&self) -> SessionState {
        self.session.lock().await.state()
    }

    /// Spawn the assistant process
    pub async fn start(&self) -> Result<()> {
        self.session.lock().await.start()
    }

    /// Send a prompt, streaming the output into `sink`
    pub async fn send(&self, prompt: &str, sink: Box<dyn ChunkSink>) -> Result<()> {
        self.session.lock().await.send(prompt, sink).await
    }

    /// Stop the assistant process
    pub async fn stop(&self) {
        self.session.lock().await.stop().await;
    }

    /// Wait up to `limit` for the current turn's output to end
    pub async fn wait_for_stream(&self, limit: Duration) -> Option<StreamOutcome> {
        self.session.lock().await.wait_for_stream(limit).await
    }

    /// Relay one chat prompt to the assistant
    ///
    /// Posts `"{prefix}Thinking..."`, then streams the answer into that
    /// message and its follow-ups. If the prompt cannot be sent, the
    /// placeholder is replaced with `"{prefix}❌ Error: {error}"` and the
    /// error is returned.
    pub async fn relay_prompt(&self, prompt: &str, prefix: &str) -> Result<()> {
        let span = tracing::info_span!(
            "relay_prompt",
            prompt_chars = prompt.chars().count(),
            has_prefix = !prefix.is_empty(),
        );

        self.relay(prompt, prefix).instrument(span).await
    }

    async fn relay(&self, prompt: &str, prefix: &str) -> Result<()> {
        let initial = self
            .publisher
            .create_segment(&format!("{prefix}{THINKING_TEXT}"))
            .await?;
        tracing::debug!(segment_id = %initial, "Posted placeholder message");

        let segmenter = MessageSegmenter::new(
            Arc::clone(&self.publisher),
            initial.clone(),
            prefix,
            self.config.max_message_length,
        );

        if let Err(e) = self.send(prompt, Box::new(segmenter)).await {
            e.trace_error();
            if e.is_user_facing() {
                let text = format!("{prefix}❌ Error: {e}");
                if let Err(update_err) = self.publisher.update_segment(&initial, &text).await {
                    tracing::warn!(error = %update_err, "Failed to post error message");
                }
            }
            return Err(e);
        }
        Ok(())
    }
}
