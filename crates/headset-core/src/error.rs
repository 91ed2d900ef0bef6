//! Error types for headset-core

use crate::address::DeviceAddress;
use thiserror::Error;

/// Result type for headset-core operations
pub type HeadsetResult<T> = Result<T, HeadsetError>;

/// RFCOMM-level failures reported by the transport
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The remote refused the channel (stale channel number)
    #[error("connection refused")]
    ConnectionRefused,

    /// No answer within the poll ceiling
    #[error("connection timed out")]
    Timeout,

    /// The remote device is not reachable
    #[error("host is down")]
    HostDown,

    #[error("transport I/O error: {0}")]
    Io(String),
}

impl TransportError {
    /// Whether the error means the channel number itself is wrong
    pub fn is_refused(&self) -> bool {
        matches!(self, TransportError::ConnectionRefused)
    }
}

/// Errors raised by the headset service
#[derive(Debug, Error)]
pub enum HeadsetError {
    #[error("Invalid Bluetooth address: {0}")]
    InvalidAddress(String),

    /// Another device already holds the single connection slot
    #[error("Device {current} is already {state}; cannot start a connection to {requested}")]
    Busy {
        current: DeviceAddress,
        state: &'static str,
        requested: DeviceAddress,
    },

    #[error("No pending incoming connection for {0}")]
    NoPendingIncoming(DeviceAddress),

    #[error("Invalid state for {device}: {message}")]
    InvalidState { device: DeviceAddress, message: String },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The priority store could not be read or written
    #[error("Priority store error: {0}")]
    Store(String),

    #[error("Invalid configuration for {field}: {reason}")]
    InvalidConfiguration { field: String, reason: String },

    #[error("No tokio runtime available: {0}")]
    NoRuntime(String),

    #[error("Headset service event loop already running")]
    EventLoopRunning,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HeadsetError {
    pub fn invalid_state(device: DeviceAddress, message: impl Into<String>) -> Self {
        Self::InvalidState {
            device,
            message: message.into(),
        }
    }

    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
