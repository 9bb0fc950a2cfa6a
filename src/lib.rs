//! Copilot bridge
//!
//! Relays chat prompts into an interactive assistant CLI (GitHub Copilot CLI
//! by default) running on a pseudo-terminal, and streams its output back as
//! chat messages that stay under the platform length cap.
//!
//! ## Features
//!
//! - The assistant sees a real terminal (echo disabled), never a pipe
//! - Output is cleaned of terminal control sequences and batched once per second
//! - A new prompt cancels the stream of the previous one
//! - Long answers are split over several messages of at most 3500 characters
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use copilot_bridge::{Bridge, BridgeConfig, ConsolePublisher};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let bridge = Bridge::new(BridgeConfig::from_env(), Arc::new(ConsolePublisher::new(false)));
//!     bridge.start().await?;
//!     bridge.relay_prompt("list the files in this directory", "").await?;
//!     bridge.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Environment Variables
//!
//! - `COPILOT_CLI_PATH`: assistant executable (default: `copilot`)
//! - `COPILOT_CLI_ARGS`: whitespace separated arguments for the executable
//! - `COPILOT_BRIDGE_FLUSH_INTERVAL_MS`: delivery cadence (default: 1000)
//! - `COPILOT_BRIDGE_STOP_GRACE_SECS`: grace period before force-kill (default: 5)
//! - `COPILOT_BRIDGE_MAX_MESSAGE_LENGTH`: message length cap (default: 3500)

pub mod bridge;
pub mod cli;
pub mod segment;
pub mod session;
pub mod stream;
pub mod terminal;
pub mod tracing;
pub mod types;

pub use bridge::{Bridge, ConsolePublisher, run_with_cli, shutdown_otel};
pub use cli::Cli;
pub use segment::{MessageSegmenter, SegmentId, SegmentPublisher};
pub use session::ProcessSession;
pub use stream::{ChunkSink, OutputStreamer};
pub use terminal::{PtyChannel, TerminalChannel};
pub use types::{BridgeConfig, BridgeError, Result, SessionState};
