//! Headset notifications and internal service messages

use crate::address::DeviceAddress;
use crate::connect::AttemptId;
use crate::error::TransportError;
use crate::types::{ChangeResult, ConnectionState, DisconnectInitiator, TransportHandle};
use serde::{Deserialize, Serialize};

/// One headset state transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadsetStateChange {
    pub device: DeviceAddress,
    pub previous: ConnectionState,
    pub new: ConnectionState,
    /// Set only for transitions to `Disconnected` out of `Connected`
    pub initiator: Option<DisconnectInitiator>,
    pub result: ChangeResult,
}

/// Broadcast to upper layers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeadsetEvent {
    StateChanged(HeadsetStateChange),
    /// A remote opened a connection; call `accept_incoming` or `reject_incoming`
    IncomingPending { device: DeviceAddress },
    /// An incoming connection won the race against our own outgoing attempt
    IncomingCollision { device: DeviceAddress },
}

/// Terminal result of one outgoing connect worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected(TransportHandle),
    Failed(TransportError),
}

/// Messages processed by the service event loop, one at a time.
///
/// Platform callbacks (incoming sockets, SDP results, remote disconnects)
/// call the service directly; only worker results are queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceMessage {
    ConnectFinished {
        device: DeviceAddress,
        attempt: AttemptId,
        outcome: ConnectOutcome,
    },
    Shutdown,
}
