//! Streaming task management
//!
//! A [`StreamTask`] is the spawned, cancellable unit that drains the terminal
//! for one turn. The session keeps at most one of them and always cancels the
//! old task, and waits for it, before it starts the next.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::stream::{ChunkSink, OutputStreamer, StreamSettings};
use crate::terminal::TerminalChannel;
use crate::tracing::ErrorTraceExt;
use crate::types::{BridgeError, StreamOutcome};

/// Streaming task identifier
pub type StreamId = String;

/// Handle to a running streaming task
#[derive(Debug)]
pub struct StreamTask {
    /// Identifier used in logs (`drain`, `turn-1`, ...)
    pub id: StreamId,
    /// JoinHandle for the task (used to wait for completion)
    pub handle: JoinHandle<StreamOutcome>,
    /// Cancellation token (used to signal cancellation)
    pub cancel_token: CancellationToken,
    /// When the task was spawned
    pub started_at: Instant,
}

impl StreamTask {
    /// Spawn a streamer over `channel` delivering into `sink`
    pub fn spawn(
        id: impl Into<StreamId>,
        channel: Arc<dyn TerminalChannel>,
        settings: StreamSettings,
        mut sink: Box<dyn ChunkSink>,
    ) -> Self {
        let id = id.into();
        let cancel_token = CancellationToken::new();
        let task_cancel = cancel_token.clone();
        let span = tracing::info_span!("stream_task", stream_id = %id);

        let handle = tokio::spawn(
            async move {
                let mut streamer = OutputStreamer::new(channel, settings);
                let result = streamer.run(sink.as_mut(), &task_cancel).await;
                let deliveries = streamer.deliveries();
                match result {
                    Ok(()) => {
                        tracing::debug!(deliveries, "Stream completed");
                        StreamOutcome::Completed { deliveries }
                    }
                    Err(BridgeError::StreamCancelled) => {
                        tracing::debug!(deliveries, "Stream cancelled");
                        StreamOutcome::Cancelled { deliveries }
                    }
                    Err(e) => {
                        e.trace_error();
                        StreamOutcome::Failed { deliveries }
                    }
                }
            }
            .instrument(span),
        );

        Self {
            id,
            handle,
            cancel_token,
            started_at: Instant::now(),
        }
    }

    /// Whether the task has already returned
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancel the task and wait for it to settle
    ///
    /// If the task does not settle within `wait`, it is aborted so no two
    /// tasks ever read the terminal at the same time. Returns the outcome
    /// when the task settled on its own.
    pub async fn cancel(self, wait: Duration) -> Option<StreamOutcome> {
        tracing::info!(
            stream_id = %self.id,
            running_ms = self.started_at.elapsed().as_millis(),
            "Cancelling previous stream"
        );

        self.cancel_token.cancel();
        let abort = self.handle.abort_handle();

        match tokio::time::timeout(wait, self.handle).await {
            Ok(Ok(outcome)) => {
                tracing::info!(
                    stream_id = %self.id,
                    deliveries = outcome.deliveries(),
                    "Previous stream cancelled gracefully"
                );
                Some(outcome)
            }
            Ok(Err(e)) => {
                tracing::warn!(stream_id = %self.id, error = ?e, "Previous stream task failed");
                None
            }
            Err(_) => {
                tracing::warn!(
                    stream_id = %self.id,
                    "Previous stream did not complete in {:?}, aborting",
                    wait
                );
                abort.abort();
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::terminal::simulated::SimulatedChannel;

    #[tokio::test(start_paused = true)]
    async fn test_task_completes_when_terminal_closes() {
        let (channel, child) = SimulatedChannel::new();
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let task = StreamTask::spawn(
            "turn-1",
            Arc::new(channel),
            StreamSettings::default(),
            Box::new(tx),
        );

        child.emit("done\n");
        child.hang_up();

        let outcome = task.handle.await.unwrap();
        assert_eq!(outcome, StreamOutcome::Completed { deliveries: 1 });
        assert_eq!(rx.recv().await.as_deref(), Some("done\n"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_settles_quickly() {
        let (channel, _child) = SimulatedChannel::new();
        let (tx, _rx) = mpsc::unbounded_channel::<String>();
        let task = StreamTask::spawn(
            "turn-1",
            Arc::new(channel),
            StreamSettings::default(),
            Box::new(tx),
        );
        assert!(!task.is_finished());

        let outcome = task.cancel(Duration::from_secs(5)).await;
        assert_eq!(outcome, Some(StreamOutcome::Cancelled { deliveries: 0 }));
    }
}
