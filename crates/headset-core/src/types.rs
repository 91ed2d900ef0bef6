//! Shared headset types

use crate::address::DeviceAddress;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection state of one remote headset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    /// Connecting or Connected: the device holds the single connection slot
    pub fn is_active(&self) -> bool {
        !matches!(self, ConnectionState::Disconnected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which headset profile the connection speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HeadsetType {
    Unknown,
    /// Headset profile (HSP)
    Headset,
    /// Hands-free profile (HFP)
    Handsfree,
}

impl Default for HeadsetType {
    fn default() -> Self {
        HeadsetType::Unknown
    }
}

/// Opaque handle of an established RFCOMM socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransportHandle(pub u64);

impl fmt::Display for TransportHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rfcomm#{}", self.0)
    }
}

/// An RFCOMM connection a remote headset opened to us
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingConnectionInfo {
    pub device: DeviceAddress,
    pub channel: u8,
    pub socket: TransportHandle,
    /// Determined by which server socket accepted the connection
    pub headset_type: HeadsetType,
    pub received_at: DateTime<Utc>,
}

impl IncomingConnectionInfo {
    pub fn new(
        device: DeviceAddress,
        channel: u8,
        socket: TransportHandle,
        headset_type: HeadsetType,
    ) -> Self {
        Self {
            device,
            channel,
            socket,
            headset_type,
            received_at: Utc::now(),
        }
    }
}

/// Who tore a connection down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisconnectInitiator {
    Local,
    Remote,
}

/// Outcome attached to a state change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeResult {
    Success,
    Failure(String),
    Cancelled,
}

/// Persisted per-device connection priority.
///
/// Ordered `OFF < UNDEFINED < ON < AUTO_CONNECT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Priority(pub i32);

impl Priority {
    pub const OFF: Priority = Priority(0);
    pub const UNDEFINED: Priority = Priority(1);
    pub const ON: Priority = Priority(100);
    pub const AUTO_CONNECT: Priority = Priority(1000);

    /// Devices at or below OFF are never accepted
    pub fn allows_connection(&self) -> bool {
        *self > Priority::OFF
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::UNDEFINED
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Priority::OFF => f.write_str("OFF"),
            Priority::UNDEFINED => f.write_str("UNDEFINED"),
            Priority::ON => f.write_str("ON"),
            Priority::AUTO_CONNECT => f.write_str("AUTO_CONNECT"),
            Priority(other) => write!(f, "{}", other),
        }
    }
}

/// Result of a service discovery query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdpRecord {
    pub channel: u8,
    pub headset_type: HeadsetType,
}
