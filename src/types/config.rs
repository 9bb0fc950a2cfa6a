//! Bridge configuration from environment variables

use std::time::Duration;

use super::error::{BridgeError, Result};

/// Default assistant executable
pub const DEFAULT_CLI_PATH: &str = "copilot";
/// Chat messages are capped well below the platform limit (~4000 chars)
pub const DEFAULT_MAX_MESSAGE_LENGTH: usize = 3500;
/// Maximum bytes taken from the terminal per read
pub const DEFAULT_READ_CHUNK_SIZE: usize = 1024;

const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(1);
const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);
const DEFAULT_CANCEL_TIMEOUT: Duration = Duration::from_secs(5);

/// Bridge configuration
///
/// Everything except the executable path has a default matching the behavior
/// chat platforms tolerate: one update per second per conversation and
/// messages shorter than 3500 characters.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Assistant executable, spawned directly (never through a shell)
    /// Environment variable: `COPILOT_CLI_PATH`
    pub cli_path: String,

    /// Extra arguments for the executable
    /// Environment variable: `COPILOT_CLI_ARGS` (whitespace separated)
    pub cli_args: Vec<String>,

    /// How long a single terminal read may block before the flush
    /// condition is re-checked
    pub poll_timeout: Duration,

    /// Minimum time between two deliveries to the sink
    /// Environment variable: `COPILOT_BRIDGE_FLUSH_INTERVAL_MS`
    pub flush_interval: Duration,

    /// Grace period between SIGTERM and SIGKILL on stop
    /// Environment variable: `COPILOT_BRIDGE_STOP_GRACE_SECS`
    pub stop_grace: Duration,

    /// How long `send`/`stop` wait for a cancelled streaming task
    pub cancel_timeout: Duration,

    /// Maximum bytes per terminal read
    pub read_chunk_size: usize,

    /// Hard cap on the rendered length of one chat message
    /// Environment variable: `COPILOT_BRIDGE_MAX_MESSAGE_LENGTH`
    pub max_message_length: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            cli_path: DEFAULT_CLI_PATH.to_string(),
            cli_args: Vec::new(),
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            stop_grace: DEFAULT_STOP_GRACE,
            cancel_timeout: DEFAULT_CANCEL_TIMEOUT,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            max_message_length: DEFAULT_MAX_MESSAGE_LENGTH,
        }
    }
}

impl BridgeConfig {
    /// Create a configuration for the given executable with default timings
    pub fn new(cli_path: impl Into<String>) -> Self {
        Self {
            cli_path: cli_path.into(),
            ..Self::default()
        }
    }

    /// Set the executable arguments
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cli_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Load configuration from environment variables
    ///
    /// Reads the following environment variables:
    /// - `COPILOT_CLI_PATH`: executable path (default: `copilot`)
    /// - `COPILOT_CLI_ARGS`: whitespace separated arguments
    /// - `COPILOT_BRIDGE_FLUSH_INTERVAL_MS`: delivery cadence in milliseconds
    /// - `COPILOT_BRIDGE_STOP_GRACE_SECS`: grace period before force-kill
    /// - `COPILOT_BRIDGE_MAX_MESSAGE_LENGTH`: message length cap
    ///
    /// Unparseable numeric values fall back to their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let cli_path = lookup("COPILOT_CLI_PATH")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.cli_path);

        let cli_args = lookup("COPILOT_CLI_ARGS")
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();

        let flush_interval = lookup("COPILOT_BRIDGE_FLUSH_INTERVAL_MS")
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.flush_interval);

        let stop_grace = lookup("COPILOT_BRIDGE_STOP_GRACE_SECS")
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.stop_grace);

        let max_message_length = lookup("COPILOT_BRIDGE_MAX_MESSAGE_LENGTH")
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(defaults.max_message_length);

        Self {
            cli_path,
            cli_args,
            flush_interval,
            stop_grace,
            max_message_length,
            ..defaults
        }
    }

    /// Check the configuration for values the bridge cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.cli_path.trim().is_empty() {
            return Err(BridgeError::config_error("executable path is empty"));
        }
        if self.poll_timeout.is_zero() {
            return Err(BridgeError::config_error("poll timeout must be positive"));
        }
        if self.flush_interval.is_zero() {
            return Err(BridgeError::config_error("flush interval must be positive"));
        }
        if self.read_chunk_size == 0 {
            return Err(BridgeError::config_error("read chunk size must be positive"));
        }
        if self.max_message_length == 0 {
            return Err(BridgeError::config_error(
                "maximum message length must be positive",
            ));
        }
        Ok(())
    }
}
