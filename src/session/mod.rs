//! Process session management
//!
//! This module handles:
//! - Session lifecycle (start, send, stop)
//! - Streaming task supersession and cancellation
//! - The assistant child process and its process session

mod process;
mod stream_task;
mod wrapped_child;

pub use process::{ProcessSession, frame_prompt};
pub use stream_task::{StreamId, StreamTask};
pub use wrapped_child::WrappedChild;
