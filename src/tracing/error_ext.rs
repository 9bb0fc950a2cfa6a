//! Error tracing extensions
//!
//! Provides utilities for enriching error handling with tracing context.

use crate::types::BridgeError;
use std::error::Error as StdError;

/// Extension trait for adding tracing context to errors
pub trait ErrorTraceExt {
    /// Log error with full context including error code, severity and error chain
    fn trace_error(&self) -> &Self;
}

impl ErrorTraceExt for BridgeError {
    fn trace_error(&self) -> &Self {
        let error_code = self.error_code();
        let is_retryable = self.is_retryable();
        let is_lifecycle = self.is_lifecycle_error();

        let mut error_chain = Vec::new();
        let mut current_source = self.source();
        while let Some(source) = current_source {
            error_chain.push(source.to_string());
            current_source = source.source();
        }

        // Lifecycle errors end the bridge; everything else is scoped to a turn
        if is_lifecycle {
            tracing::error!(
                error = %self,
                error_code = error_code.code(),
                error_code_name = ?error_code,
                is_retryable,
                error_chain = ?error_chain,
                "Lifecycle error"
            );
        } else {
            tracing::warn!(
                error = %self,
                error_code = error_code.code(),
                error_code_name = ?error_code,
                is_retryable,
                error_chain = ?error_chain,
                "Turn error"
            );
        }

        self
    }
}

/// Extension trait for Result types
pub trait ResultTraceExt<T, E>: Sized {
    /// Convert error to BridgeError and log with context
    fn trace_context(self) -> Result<T, BridgeError>
    where
        E: StdError + Send + Sync + 'static;
}

impl<T, E> ResultTraceExt<T, E> for Result<T, E>
where
    E: StdError + Send + Sync + 'static,
    BridgeError: From<E>,
{
    fn trace_context(self) -> Result<T, BridgeError> {
        self.map_err(|e| {
            let bridge_error = BridgeError::from(e);
            bridge_error.trace_error();
            bridge_error
        })
    }
}
