//! Terminal channel module
//!
//! Raw byte-level access to the standard streams of the assistant process:
//! - [`TerminalChannel`]: read/write/close primitives the rest of the crate uses
//! - [`PtyChannel`]: the pseudo-terminal implementation (echo disabled)

mod channel;
mod pty;
#[cfg(test)]
pub(crate) mod simulated;

pub use channel::{ReadOutcome, TerminalChannel};
pub use pty::{PtyChannel, PtySlave};
