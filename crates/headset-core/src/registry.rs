//! Per-device connection state
//!
//! [`HeadsetRegistry`] is the pure part of the headset state machine: it
//! holds one [`HeadsetEntry`] per device seen and enforces that at most one
//! device is `Connecting` or `Connected` at any time. It performs no I/O;
//! every mutation returns the [`HeadsetStateChange`] the caller should
//! broadcast, or `None` when nothing changed.

use crate::address::DeviceAddress;
use crate::connect::AttemptId;
use crate::error::{HeadsetError, HeadsetResult};
use crate::events::HeadsetStateChange;
use crate::types::{
    ChangeResult, ConnectionState, DisconnectInitiator, HeadsetType, IncomingConnectionInfo,
    TransportHandle,
};
use std::collections::HashMap;

/// Connection bookkeeping for one remote headset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadsetEntry {
    pub state: ConnectionState,
    pub handle: Option<TransportHandle>,
    pub headset_type: HeadsetType,
    /// Outgoing attempt that owns this entry, if any
    pub attempt: Option<AttemptId>,
    /// Set once a remote-initiated connection owns this entry
    pub incoming: Option<IncomingConnectionInfo>,
}

impl HeadsetEntry {
    fn disconnected() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            handle: None,
            headset_type: HeadsetType::Unknown,
            attempt: None,
            incoming: None,
        }
    }

    fn clear_transport(&mut self) {
        self.handle = None;
        self.headset_type = HeadsetType::Unknown;
        self.attempt = None;
        self.incoming = None;
    }

    /// Whether a remote-initiated connection owns the entry
    pub fn is_incoming(&self) -> bool {
        self.incoming.is_some()
    }
}

#[derive(Debug, Default)]
pub struct HeadsetRegistry {
    entries: HashMap<DeviceAddress, HeadsetEntry>,
}

impl HeadsetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, device: &DeviceAddress) -> ConnectionState {
        self.entries
            .get(device)
            .map(|e| e.state)
            .unwrap_or(ConnectionState::Disconnected)
    }

    pub fn entry(&self, device: &DeviceAddress) -> Option<&HeadsetEntry> {
        self.entries.get(device)
    }

    /// The device holding the connection slot
    pub fn current(&self) -> Option<(DeviceAddress, ConnectionState)> {
        self.entries
            .iter()
            .find(|(_, e)| e.state.is_active())
            .map(|(d, e)| (*d, e.state))
    }

    /// Number of entries in `Connecting` or `Connected`
    pub fn active_count(&self) -> usize {
        self.entries.values().filter(|e| e.state.is_active()).count()
    }

    /// Reserve the connection slot for an outgoing attempt
    pub fn begin_outgoing(
        &mut self,
        device: DeviceAddress,
        attempt: AttemptId,
    ) -> HeadsetResult<HeadsetStateChange> {
        if let Some((current, state)) = self.current() {
            return Err(HeadsetError::Busy {
                current,
                state: state.as_str(),
                requested: device,
            });
        }

        let entry = self.entries.entry(device).or_insert_with(HeadsetEntry::disconnected);
        entry.clear_transport();
        entry.state = ConnectionState::Connecting;
        entry.attempt = Some(attempt);
        Ok(state_change(device, ConnectionState::Disconnected, ConnectionState::Connecting))
    }

    /// A remote connection arrived while the slot is free
    pub(crate) fn begin_incoming(
        &mut self,
        info: IncomingConnectionInfo,
    ) -> Option<HeadsetStateChange> {
        if self.current().is_some() {
            return None;
        }
        let device = info.device;
        let entry = self.entries.entry(device).or_insert_with(HeadsetEntry::disconnected);
        entry.clear_transport();
        entry.state = ConnectionState::Connecting;
        entry.handle = Some(info.socket);
        entry.headset_type = info.headset_type;
        entry.incoming = Some(info);
        Some(state_change(device, ConnectionState::Disconnected, ConnectionState::Connecting))
    }

    /// Replace our own outgoing attempt's transport with the incoming one.
    ///
    /// Returns the outgoing attempt that lost, if the entry was ours.
    pub(crate) fn adopt_incoming(&mut self, info: IncomingConnectionInfo) -> Option<AttemptId> {
        let entry = self.entries.get_mut(&info.device)?;
        if entry.state != ConnectionState::Connecting || entry.is_incoming() {
            return None;
        }
        let lost = entry.attempt.take();
        entry.handle = Some(info.socket);
        entry.headset_type = info.headset_type;
        entry.incoming = Some(info);
        lost
    }

    /// Transport reported the connection as established
    pub fn mark_connected(
        &mut self,
        device: DeviceAddress,
        handle: TransportHandle,
        headset_type: HeadsetType,
    ) -> Option<HeadsetStateChange> {
        let entry = self.entries.get_mut(&device)?;
        if entry.state != ConnectionState::Connecting {
            return None;
        }
        entry.state = ConnectionState::Connected;
        entry.handle = Some(handle);
        entry.headset_type = headset_type;
        entry.attempt = None;
        entry.incoming = None;
        Some(state_change(device, ConnectionState::Connecting, ConnectionState::Connected))
    }

    /// Connect failed, timed out or was abandoned
    pub fn mark_failed(
        &mut self,
        device: DeviceAddress,
        result: ChangeResult,
    ) -> Option<HeadsetStateChange> {
        let entry = self.entries.get_mut(&device)?;
        if entry.state != ConnectionState::Connecting {
            return None;
        }
        entry.state = ConnectionState::Disconnected;
        entry.clear_transport();
        let mut change = state_change(device, ConnectionState::Connecting, ConnectionState::Disconnected);
        change.result = result;
        Some(change)
    }

    /// An established connection went away
    pub fn mark_disconnected(
        &mut self,
        device: DeviceAddress,
        initiator: DisconnectInitiator,
    ) -> Option<HeadsetStateChange> {
        let entry = self.entries.get_mut(&device)?;
        if entry.state != ConnectionState::Connected {
            return None;
        }
        entry.state = ConnectionState::Disconnected;
        entry.clear_transport();
        let mut change = state_change(device, ConnectionState::Connected, ConnectionState::Disconnected);
        change.initiator = Some(initiator);
        Some(change)
    }
}

fn state_change(
    device: DeviceAddress,
    previous: ConnectionState,
    new: ConnectionState,
) -> HeadsetStateChange {
    HeadsetStateChange {
        device,
        previous,
        new,
        initiator: None,
        result: ChangeResult::Success,
    }
}
