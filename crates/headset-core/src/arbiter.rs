//! Incoming RFCOMM connection arbitration
//!
//! Decides what happens to a remote-initiated connection given the current
//! registry contents and the device's stored priority. The caller must hold
//! the lock that guards the registry for the whole decision so that an
//! outgoing completion cannot interleave with it.

use crate::address::DeviceAddress;
use crate::connect::AttemptId;
use crate::events::HeadsetStateChange;
use crate::registry::HeadsetRegistry;
use crate::types::{ConnectionState, IncomingConnectionInfo, Priority};
use tracing::{debug, info};

/// Why an incoming connection was turned away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Stored priority is OFF or below
    PriorityOff(Priority),
    /// Another device holds the connection slot
    OtherDeviceActive(DeviceAddress),
    /// This device is already connected
    AlreadyConnected,
    /// An incoming connection for this device is already pending
    AlreadyPending,
}

/// Result of arbitrating one incoming connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncomingDecision {
    /// New entry in `Connecting`; the upper layer must accept or reject it
    Pending(HeadsetStateChange),
    /// Our outgoing attempt for the same device lost the race and the entry
    /// now carries the incoming transport. The upper layer cancels the
    /// superseded attempt; its late result is discarded either way.
    Collision { superseded_attempt: Option<AttemptId> },
    /// Close the incoming transport; nothing changed
    Reject(RejectReason),
}

pub struct IncomingConnectionArbiter;

impl IncomingConnectionArbiter {
    pub fn arbitrate(
        registry: &mut HeadsetRegistry,
        info: IncomingConnectionInfo,
        priority: Priority,
    ) -> IncomingDecision {
        let device = info.device;
        if !priority.allows_connection() {
            info!(device = %device, priority = %priority, "Rejecting incoming connection from disabled device");
            return IncomingDecision::Reject(RejectReason::PriorityOff(priority));
        }

        let decision = match registry.current() {
            None => match registry.begin_incoming(info) {
                Some(change) => IncomingDecision::Pending(change),
                // slot was checked free above
                None => IncomingDecision::Reject(RejectReason::AlreadyPending),
            },
            Some((current, _)) if current != device => {
                IncomingDecision::Reject(RejectReason::OtherDeviceActive(current))
            }
            Some((_, ConnectionState::Connected)) => {
                IncomingDecision::Reject(RejectReason::AlreadyConnected)
            }
            Some(_) => {
                let already_incoming = registry
                    .entry(&device)
                    .map(|e| e.is_incoming())
                    .unwrap_or(false);
                if already_incoming {
                    IncomingDecision::Reject(RejectReason::AlreadyPending)
                } else {
                    let superseded_attempt = registry.adopt_incoming(info);
                    IncomingDecision::Collision { superseded_attempt }
                }
            }
        };

        debug!(device = %device, decision = ?decision, "Arbitrated incoming connection");
        decision
    }
}
