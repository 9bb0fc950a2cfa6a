//! Output chunk sinks
//!
//! A sink receives the accumulated text of one streaming task, one chunk per
//! call, strictly in order. The streaming task owns its sink, so at most one
//! producer ever writes to it.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::types::{BridgeError, Result};

/// Downstream consumer of streamed output
#[async_trait]
pub trait ChunkSink: Send {
    /// Deliver one chunk of filtered output
    ///
    /// An error is logged by the streamer and does not end the stream.
    async fn deliver(&mut self, chunk: String) -> Result<()>;
}

/// Sink that drops everything, used to drain the REPL banner at startup
#[derive(Debug, Default)]
pub struct DiscardSink {
    discarded_bytes: usize,
}

impl DiscardSink {
    /// Create a new discarding sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Total bytes thrown away
    pub fn discarded_bytes(&self) -> usize {
        self.discarded_bytes
    }
}

#[async_trait]
impl ChunkSink for DiscardSink {
    async fn deliver(&mut self, chunk: String) -> Result<()> {
        self.discarded_bytes += chunk.len();
        tracing::trace!(bytes = chunk.len(), "Discarded startup output");
        Ok(())
    }
}

#[async_trait]
impl ChunkSink for mpsc::Sender<String> {
    async fn deliver(&mut self, chunk: String) -> Result<()> {
        self.send(chunk)
            .await
            .map_err(|_| BridgeError::delivery("chunk receiver dropped"))
    }
}

#[async_trait]
impl ChunkSink for mpsc::UnboundedSender<String> {
    async fn deliver(&mut self, chunk: String) -> Result<()> {
        self.send(chunk)
            .map_err(|_| BridgeError::delivery("chunk receiver dropped"))
    }
}
