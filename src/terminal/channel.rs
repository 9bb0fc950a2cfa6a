//! Terminal channel abstraction
//!
//! The streaming and session logic only ever talk to a [`TerminalChannel`],
//! so the platform pseudo-terminal can be swapped for a scripted channel.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::types::Result;

/// Result of one timed read from a terminal channel
#[derive(Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// At least one byte was read
    Data(Vec<u8>),
    /// Nothing arrived before the timeout; not an error
    Timeout,
    /// The peer closed its side (child exited or channel released)
    Closed,
}

impl fmt::Debug for ReadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data(bytes) => write!(f, "Data({} bytes)", bytes.len()),
            Self::Timeout => f.write_str("Timeout"),
            Self::Closed => f.write_str("Closed"),
        }
    }
}

/// Raw duplex byte stream bound to a child process's standard streams
///
/// All methods take `&self`: the session keeps the channel behind an `Arc`,
/// hands clones to the streaming task (the only reader) and writes from
/// `send` (the only writer).
#[async_trait]
pub trait TerminalChannel: Send + Sync + fmt::Debug {
    /// Write all bytes to the child's input
    async fn write(&self, bytes: &[u8]) -> Result<()>;

    /// Read up to `max_bytes`, waiting at most `timeout` for the first byte
    async fn read_chunk(&self, max_bytes: usize, timeout: Duration) -> Result<ReadOutcome>;

    /// Release the channel; calling it again is a no-op
    fn close(&self);

    /// Whether [`close`](Self::close) has been called
    fn is_closed(&self) -> bool;
}
