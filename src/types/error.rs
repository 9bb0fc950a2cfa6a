//! Error types for the Copilot bridge

use thiserror::Error;

/// Bridge error codes
///
/// Stable numeric codes used in structured logs and in the JSON output of the
/// console adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Lifecycle errors (-31xxx)
    /// Pseudo-terminal allocation failed
    TerminalUnavailable = -31001,
    /// Child process failed to launch
    ProcessStartFailed = -31002,
    /// Session is not in the Running state
    SessionNotReady = -31003,
    /// Terminal channel was closed
    TerminalClosed = -31004,

    // Per-turn errors (-32xxx)
    /// Invalid prompt
    InvalidPrompt = -32001,
    /// Streaming task was superseded or stopped
    Cancelled = -32002,
    /// Chat sink rejected a chunk
    DeliveryFailed = -32003,
    /// Child ignored the graceful stop request
    StopTimeout = -32004,

    // Generic errors (-33xxx)
    /// Configuration error
    ConfigError = -33001,
    /// Internal error
    InternalError = -33002,
}

impl ErrorCode {
    /// Get the error code value
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Main error type for the bridge
#[derive(Debug, Error)]
pub enum BridgeError {
    // === Lifecycle errors ===
    /// No pseudo-terminal could be allocated
    #[error("Pseudo-terminal unavailable: {0}")]
    TerminalUnavailable(String),

    /// The assistant executable is missing or failed to launch
    #[error("Failed to start process '{path}': {reason}")]
    ProcessStartError { path: String, reason: String },

    /// `send` was called outside the Running state
    #[error("Session not ready (state: {0})")]
    SessionNotReady(String),

    /// The terminal channel has been closed
    #[error("Terminal channel is closed")]
    TerminalClosed,

    // === Prompt errors ===
    /// Empty prompt
    #[error("Prompt cannot be empty")]
    EmptyPrompt,

    /// Prompt cannot be framed as a single input line
    #[error("Invalid prompt: {0}")]
    InvalidPrompt(String),

    // === Streaming errors ===
    /// Streaming task was cancelled by a newer send or by stop
    #[error("Output stream cancelled")]
    StreamCancelled,

    /// The chat sink failed to accept a chunk
    #[error("Failed to deliver output: {0}")]
    DeliveryError(String),

    /// The child did not exit within the grace period
    #[error("Process did not exit within {0}ms of SIGTERM")]
    GracefulStopTimeout(u64),

    // === Configuration errors ===
    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // === External errors ===
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic errors ===
    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for the bridge
pub type Result<T> = std::result::Result<T, BridgeError>;

impl BridgeError {
    /// Get the error code for this error
    pub fn error_code(&self) -> ErrorCode {
        match self {
            BridgeError::TerminalUnavailable(_) => ErrorCode::TerminalUnavailable,
            BridgeError::ProcessStartError { .. } => ErrorCode::ProcessStartFailed,
            BridgeError::SessionNotReady(_) => ErrorCode::SessionNotReady,
            BridgeError::TerminalClosed => ErrorCode::TerminalClosed,
            BridgeError::EmptyPrompt => ErrorCode::InvalidPrompt,
            BridgeError::InvalidPrompt(_) => ErrorCode::InvalidPrompt,
            BridgeError::StreamCancelled => ErrorCode::Cancelled,
            BridgeError::DeliveryError(_) => ErrorCode::DeliveryFailed,
            BridgeError::GracefulStopTimeout(_) => ErrorCode::StopTimeout,
            BridgeError::ConfigError(_) => ErrorCode::ConfigError,
            BridgeError::Io(_) => ErrorCode::InternalError,
            BridgeError::Json(_) => ErrorCode::InternalError,
            BridgeError::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Check if this error is fatal to the bridge process
    ///
    /// Lifecycle errors mean there is no usable assistant process; the bridge
    /// owner should shut down instead of running degraded.
    pub fn is_lifecycle_error(&self) -> bool {
        matches!(
            self,
            BridgeError::TerminalUnavailable(_)
                | BridgeError::ProcessStartError { .. }
                | BridgeError::TerminalClosed
        )
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BridgeError::SessionNotReady(_) | BridgeError::DeliveryError(_)
        )
    }

    /// Check if this error may be shown to the end user
    ///
    /// `StreamCancelled` is an internal signal and never leaves the task boundary.
    pub fn is_user_facing(&self) -> bool {
        !matches!(
            self,
            BridgeError::StreamCancelled | BridgeError::GracefulStopTimeout(_)
        )
    }

    // === Constructor helpers ===

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        BridgeError::Internal(msg.into())
    }

    /// Create a terminal unavailable error
    pub fn terminal_unavailable(msg: impl Into<String>) -> Self {
        BridgeError::TerminalUnavailable(msg.into())
    }

    /// Create a process start error
    pub fn process_start(path: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        BridgeError::ProcessStartError {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a session not ready error
    pub fn session_not_ready(state: impl std::fmt::Display) -> Self {
        BridgeError::SessionNotReady(state.to_string())
    }

    /// Create a delivery error
    pub fn delivery(msg: impl Into<String>) -> Self {
        BridgeError::DeliveryError(msg.into())
    }

    /// Create a configuration error
    pub fn config_error(msg: impl Into<String>) -> Self {
        BridgeError::ConfigError(msg.into())
    }
}
