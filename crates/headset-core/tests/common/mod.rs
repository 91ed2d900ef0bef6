//! Fake RFCOMM and SDP collaborators shared by the integration tests

#![allow(dead_code)]

use parking_lot::Mutex;
use rphone_headset_core::transport::{ConnectPoll, RfcommSocket, RfcommTransport, SdpClient};
use rphone_headset_core::{DeviceAddress, HeadsetConfig, HeadsetType, TransportError, TransportHandle};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub fn dev(n: u8) -> DeviceAddress {
    DeviceAddress::new([0x00, 0x1A, 0x7D, 0x00, 0x00, n])
}

/// Short timings so workers finish quickly
pub fn fast_config() -> HeadsetConfig {
    HeadsetConfig::default()
        .with_poll_slice(Duration::from_millis(5))
        .with_max_poll_slices(10)
        .with_retry_delay(Duration::from_millis(10))
}

/// How the next socket behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketScript {
    /// Connects on the first poll
    Connect,
    /// Fails with connection refused on the first poll
    Refuse,
    /// Never connects; the worker hits its poll ceiling
    Hang,
    /// Fails to start with a host-down error
    HostDown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportOp {
    Create { device: DeviceAddress, channel: u8 },
    Close,
    Wake(TransportHandle),
    Disconnect(TransportHandle),
}

pub struct FakeTransport {
    scripts: Mutex<VecDeque<SocketScript>>,
    fallback: SocketScript,
    ops: Arc<Mutex<Vec<TransportOp>>>,
    next_handle: Arc<AtomicU64>,
}

impl FakeTransport {
    pub fn new(fallback: SocketScript) -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            fallback,
            ops: Arc::new(Mutex::new(Vec::new())),
            next_handle: Arc::new(AtomicU64::new(100)),
        }
    }

    pub fn scripted(scripts: &[SocketScript], fallback: SocketScript) -> Self {
        let transport = Self::new(fallback);
        transport.scripts.lock().extend(scripts.iter().copied());
        transport
    }

    pub fn ops(&self) -> Vec<TransportOp> {
        self.ops.lock().clone()
    }

    pub fn created_channels(&self) -> Vec<u8> {
        self.ops
            .lock()
            .iter()
            .filter_map(|op| match op {
                TransportOp::Create { channel, .. } => Some(*channel),
                _ => None,
            })
            .collect()
    }

    pub fn disconnected(&self) -> Vec<TransportHandle> {
        self.ops
            .lock()
            .iter()
            .filter_map(|op| match op {
                TransportOp::Disconnect(h) => Some(*h),
                _ => None,
            })
            .collect()
    }

    pub fn closes(&self) -> usize {
        self.ops
            .lock()
            .iter()
            .filter(|op| matches!(op, TransportOp::Close))
            .count()
    }
}

impl RfcommTransport for FakeTransport {
    fn create_socket(
        &self,
        device: DeviceAddress,
        channel: u8,
        _headset_type: HeadsetType,
    ) -> Result<Box<dyn RfcommSocket>, TransportError> {
        self.ops.lock().push(TransportOp::Create { device, channel });
        let script = self.scripts.lock().pop_front().unwrap_or(self.fallback);
        Ok(Box::new(FakeSocket {
            script,
            ops: Arc::clone(&self.ops),
            next_handle: Arc::clone(&self.next_handle),
        }))
    }

    fn disconnect(&self, handle: TransportHandle) {
        self.ops.lock().push(TransportOp::Disconnect(handle));
    }

    fn wake_from_low_power(&self, handle: TransportHandle) -> bool {
        self.ops.lock().push(TransportOp::Wake(handle));
        true
    }
}

struct FakeSocket {
    script: SocketScript,
    ops: Arc<Mutex<Vec<TransportOp>>>,
    next_handle: Arc<AtomicU64>,
}

impl RfcommSocket for FakeSocket {
    fn start_connect(&mut self) -> Result<(), TransportError> {
        match self.script {
            SocketScript::HostDown => Err(TransportError::HostDown),
            _ => Ok(()),
        }
    }

    fn wait_for_connect(&mut self, timeout: Duration) -> Result<ConnectPoll, TransportError> {
        match self.script {
            SocketScript::Connect => Ok(ConnectPoll::Connected(TransportHandle(
                self.next_handle.fetch_add(1, Ordering::SeqCst),
            ))),
            SocketScript::Refuse => Err(TransportError::ConnectionRefused),
            SocketScript::Hang | SocketScript::HostDown => {
                std::thread::sleep(timeout);
                Ok(ConnectPoll::Pending)
            }
        }
    }

    fn close(&mut self) {
        self.ops.lock().push(TransportOp::Close);
    }
}

#[derive(Default)]
pub struct FakeSdp {
    queries: Mutex<Vec<DeviceAddress>>,
    fail: AtomicBool,
    calls: AtomicUsize,
}

impl FakeSdp {
    pub fn failing() -> Self {
        let sdp = Self::default();
        sdp.fail.store(true, Ordering::SeqCst);
        sdp
    }

    pub fn queries(&self) -> Vec<DeviceAddress> {
        self.queries.lock().clone()
    }

    pub fn query_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SdpClient for FakeSdp {
    fn query(&self, device: DeviceAddress) -> Result<(), TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(TransportError::Io("sdp unavailable".to_string()));
        }
        self.queries.lock().push(device);
        Ok(())
    }
}
