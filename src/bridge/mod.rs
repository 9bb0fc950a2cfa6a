//! Copilot bridge
//!
//! This module provides the bridge that ties everything together:
//! - [`Bridge`]: start/send/stop entry points and prompt relaying
//! - [`ConsolePublisher`]: the stdout chat adapter used by the binary
//! - the runner that drives both from the command line

mod console;
mod core;
mod runner;

pub use console::ConsolePublisher;
pub use core::{Bridge, THINKING_TEXT};
pub use runner::{run_with_cli, shutdown_otel};
