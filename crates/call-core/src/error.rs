//! Error types for call-core
//!
//! Placement outcomes are reported as [`CallStatusCode`](crate::types::CallStatusCode)
//! values, never as errors. `CallError` covers defects in how the controller
//! itself was assembled.

use thiserror::Error;

/// Result type for call-core operations
pub type CallResult<T> = Result<T, CallError>;

/// Errors raised while building or configuring the call controller
#[derive(Debug, Error)]
pub enum CallError {
    /// The controller needs a tokio runtime for its timers and event loop
    #[error("No tokio runtime available: {message}")]
    NoRuntime { message: String },

    /// A configuration value is out of range
    #[error("Invalid configuration for {field}: {reason}")]
    InvalidConfiguration { field: String, reason: String },

    /// The event loop was already started
    #[error("Call controller event loop already running")]
    EventLoopRunning,
}

impl CallError {
    /// Create an invalid configuration error
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
