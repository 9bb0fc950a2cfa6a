//! Output streaming loop
//!
//! Drains the terminal channel, cleans the bytes into text and hands the
//! accumulated text to a [`ChunkSink`] at most once per flush interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::ansi::AnsiFilter;
use super::buffer::OutputBuffer;
use super::decoder::Utf8Decoder;
use super::sink::ChunkSink;
use crate::terminal::{ReadOutcome, TerminalChannel};
use crate::types::{BridgeConfig, BridgeError, Result};

/// Timing and sizing knobs of one streaming task
#[derive(Debug, Clone, Copy)]
pub struct StreamSettings {
    /// Upper bound on a single blocking read
    pub poll_timeout: Duration,
    /// Minimum time between two deliveries
    pub flush_interval: Duration,
    /// Maximum bytes per read
    pub read_chunk_size: usize,
}

impl From<&BridgeConfig> for StreamSettings {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            poll_timeout: config.poll_timeout,
            flush_interval: config.flush_interval,
            read_chunk_size: config.read_chunk_size,
        }
    }
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self::from(&BridgeConfig::default())
    }
}

/// Output streamer for one turn
pub struct OutputStreamer {
    channel: Arc<dyn TerminalChannel>,
    settings: StreamSettings,
    decoder: Utf8Decoder,
    filter: AnsiFilter,
    buffer: OutputBuffer,
    deliveries: u64,
}

impl std::fmt::Debug for OutputStreamer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputStreamer")
            .field("settings", &self.settings)
            .field("buffered", &self.buffer.len())
            .field("deliveries", &self.deliveries)
            .finish()
    }
}

impl OutputStreamer {
    /// Create a streamer whose first flush window starts now
    pub fn new(channel: Arc<dyn TerminalChannel>, settings: StreamSettings) -> Self {
        Self {
            channel,
            settings,
            decoder: Utf8Decoder::new(),
            filter: AnsiFilter::new(),
            buffer: OutputBuffer::new(Instant::now()),
            deliveries: 0,
        }
    }

    /// Number of chunks handed to the sink so far
    pub fn deliveries(&self) -> u64 {
        self.deliveries
    }

    /// Stream until the channel closes or `cancel` fires
    ///
    /// Returns `Ok(())` when the channel reports closed (the normal end of a
    /// response) after delivering what is left in the buffer. Returns
    /// [`BridgeError::StreamCancelled`] as soon as `cancel` fires, without
    /// delivering buffered text. A read error is returned after the buffer
    /// has been flushed. Sink failures are logged and never end the stream.
    pub async fn run(
        &mut self,
        sink: &mut dyn ChunkSink,
        cancel: &CancellationToken,
    ) -> Result<()> {
        loop {
            let read = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(BridgeError::StreamCancelled),
                read = self.channel.read_chunk(
                    self.settings.read_chunk_size,
                    self.settings.poll_timeout,
                ) => read,
            };

            match read {
                Ok(ReadOutcome::Data(bytes)) => {
                    tracing::trace!(bytes = bytes.len(), "Read terminal output");
                    self.ingest(&bytes);
                }
                Ok(ReadOutcome::Timeout) => {}
                Ok(ReadOutcome::Closed) => {
                    tracing::debug!(deliveries = self.deliveries, "Terminal closed, final flush");
                    self.finish_input();
                    self.flush(sink, cancel).await?;
                    return Ok(());
                }
                Err(e) => {
                    self.finish_input();
                    self.flush(sink, cancel).await?;
                    return Err(e);
                }
            }

            if self
                .buffer
                .should_flush(Instant::now(), self.settings.flush_interval)
            {
                self.flush(sink, cancel).await?;
            }
        }
    }

    fn ingest(&mut self, bytes: &[u8]) {
        let text = self.decoder.decode(bytes);
        let clean = self.filter.push(&text);
        self.buffer.push_str(&clean);
    }

    fn finish_input(&mut self) {
        let tail = self.decoder.finish();
        let mut clean = self.filter.push(&tail);
        clean.push_str(&self.filter.finish());
        self.buffer.push_str(&clean);
    }

    async fn flush(&mut self, sink: &mut dyn ChunkSink, cancel: &CancellationToken) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let chunk = self.buffer.take(Instant::now());
        let chars = chunk.chars().count();
        self.deliveries += 1;

        let delivered = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(BridgeError::StreamCancelled),
            delivered = sink.deliver(chunk) => delivered,
        };

        match delivered {
            Ok(()) => tracing::debug!(chars, deliveries = self.deliveries, "Delivered chunk"),
            Err(e) => tracing::warn!(
                error = %e,
                chars,
                deliveries = self.deliveries,
                "Chunk delivery failed, continuing"
            ),
        }
        Ok(())
    }
}
