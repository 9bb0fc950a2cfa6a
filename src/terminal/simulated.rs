//! Scripted terminal channel for tests
//!
//! Output is pushed through an unbounded channel; reads honour the timeout
//! with tokio's clock, so tests running with a paused clock are deterministic.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::channel::{ReadOutcome, TerminalChannel};
use crate::types::{BridgeError, Result};

#[derive(Debug)]
enum Script {
    Data(Vec<u8>),
    Close,
}

/// Handle used by a test to play the child's side of the terminal
#[derive(Debug, Clone)]
pub(crate) struct ChildSide {
    tx: mpsc::UnboundedSender<Script>,
}

impl ChildSide {
    pub(crate) fn emit(&self, bytes: impl AsRef<[u8]>) {
        drop(self.tx.send(Script::Data(bytes.as_ref().to_vec())));
    }

    pub(crate) fn hang_up(&self) {
        drop(self.tx.send(Script::Close));
    }
}

#[derive(Debug)]
pub(crate) struct SimulatedChannel {
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Script>>,
    pending: Mutex<Vec<u8>>,
    written: Mutex<Vec<u8>>,
    closed: Mutex<bool>,
}

impl SimulatedChannel {
    pub(crate) fn new() -> (Self, ChildSide) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                rx: tokio::sync::Mutex::new(rx),
                pending: Mutex::new(Vec::new()),
                written: Mutex::new(Vec::new()),
                closed: Mutex::new(false),
            },
            ChildSide { tx },
        )
    }

    fn take_pending(&self, max_bytes: usize) -> Option<Vec<u8>> {
        let mut pending = self.pending.lock().unwrap();
        if pending.is_empty() {
            return None;
        }
        let take = pending.len().min(max_bytes);
        Some(pending.drain(..take).collect())
    }

    /// Everything written to the child so far
    pub(crate) fn written(&self) -> String {
        String::from_utf8_lossy(&self.written.lock().unwrap()).into_owned()
    }
}

#[async_trait]
impl TerminalChannel for SimulatedChannel {
    async fn write(&self, bytes: &[u8]) -> Result<()> {
        if self.is_closed() {
            return Err(BridgeError::TerminalClosed);
        }
        self.written.lock().unwrap().extend_from_slice(bytes);
        Ok(())
    }

    async fn read_chunk(&self, max_bytes: usize, timeout: Duration) -> Result<ReadOutcome> {
        if self.is_closed() {
            return Ok(ReadOutcome::Closed);
        }
        if let Some(bytes) = self.take_pending(max_bytes) {
            return Ok(ReadOutcome::Data(bytes));
        }
        let mut rx = self.rx.lock().await;
        match tokio::time::timeout(timeout, rx.recv()).await {
            Err(_elapsed) => Ok(ReadOutcome::Timeout),
            Ok(Some(Script::Data(bytes))) => {
                *self.pending.lock().unwrap() = bytes;
                Ok(self
                    .take_pending(max_bytes)
                    .map_or(ReadOutcome::Timeout, ReadOutcome::Data))
            }
            Ok(Some(Script::Close) | None) => Ok(ReadOutcome::Closed),
        }
    }

    fn close(&self) {
        *self.closed.lock().unwrap() = true;
    }

    fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap()
    }
}
