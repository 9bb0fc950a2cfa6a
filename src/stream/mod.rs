//! Output streaming
//!
//! Turns the raw pseudo-terminal byte stream into readable text chunks:
//! - [`Utf8Decoder`]: lossy decoding that survives split characters
//! - [`AnsiFilter`]: control sequence removal
//! - [`OutputBuffer`]: time-windowed batching
//! - [`OutputStreamer`]: the cancellable read/flush loop feeding a [`ChunkSink`]

mod ansi;
mod buffer;
mod decoder;
mod sink;
mod streamer;

pub use ansi::{AnsiFilter, strip_ansi};
pub use buffer::OutputBuffer;
pub use decoder::Utf8Decoder;
pub use sink::{ChunkSink, DiscardSink};
pub use streamer::{OutputStreamer, StreamSettings};
