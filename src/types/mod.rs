//! Public types for the Copilot bridge
//!
//! This module contains all the shared types used across the crate.

mod config;
mod error;
mod session;

pub use config::{
    BridgeConfig, DEFAULT_CLI_PATH, DEFAULT_MAX_MESSAGE_LENGTH, DEFAULT_READ_CHUNK_SIZE,
};
pub use error::{BridgeError, ErrorCode, Result};
pub use session::{SessionState, StreamOutcome};
