//! Outgoing RFCOMM connect worker
//!
//! One [`OutgoingConnectThread`] runs per connect attempt on its own OS
//! thread, since the socket calls block. The attempt policy is:
//!
//! 1. Poll the socket in `poll_slice` steps, up to `max_poll_slices`,
//!    checking for cancellation between slices.
//! 2. If the attempt is refused and no SDP query is in flight for the device,
//!    drop the channel, start an SDP query and exit. The service dispatches
//!    a new worker once SDP answers.
//! 3. On any other failure, wait `retry_delay` and retry the same channel
//!    once.
//!
//! The terminal outcome is posted to the service as
//! [`ServiceMessage::ConnectFinished`]. A cancelled worker closes its socket
//! and posts nothing.

use crate::address::DeviceAddress;
use crate::config::HeadsetConfig;
use crate::error::{HeadsetError, HeadsetResult, TransportError};
use crate::events::{ConnectOutcome, ServiceMessage};
use crate::transport::{ConnectPoll, RfcommTransport, SdpClient};
use crate::types::{HeadsetType, SdpRecord, TransportHandle};
use dashmap::DashSet;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Identifies one logical connect attempt, across SDP re-dispatches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttemptId(u64);

impl AttemptId {
    pub const fn from_raw(id: u64) -> Self {
        Self(id)
    }

    pub const fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "attempt#{}", self.0)
    }
}

#[derive(Debug, Default)]
pub(crate) struct AttemptIds(AtomicU64);

impl AttemptIds {
    pub(crate) fn next(&self) -> AttemptId {
        AttemptId(self.0.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// Interrupt flag that also wakes a sleeping worker
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let (flag, cvar) = &*self.inner;
        *flag.lock() = true;
        cvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.0.lock()
    }

    /// Sleep for `duration`. Returns true if cancelled before or during the wait.
    pub fn sleep(&self, duration: Duration) -> bool {
        let (flag, cvar) = &*self.inner;
        let deadline = Instant::now() + duration;
        let mut cancelled = flag.lock();
        while !*cancelled {
            if cvar.wait_until(&mut cancelled, deadline).timed_out() {
                break;
            }
        }
        *cancelled
    }
}

/// Devices with an SDP query in flight
#[derive(Debug, Default)]
pub struct SdpTracker {
    in_flight: DashSet<DeviceAddress>,
}

impl SdpTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a query as started. False if one is already in flight.
    pub fn try_begin(&self, device: DeviceAddress) -> bool {
        self.in_flight.insert(device)
    }

    pub fn finish(&self, device: &DeviceAddress) {
        self.in_flight.remove(device);
    }

    pub fn is_in_flight(&self, device: &DeviceAddress) -> bool {
        self.in_flight.contains(device)
    }
}

/// What to connect to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectRequest {
    pub device: DeviceAddress,
    pub channel: u8,
    pub headset_type: HeadsetType,
    /// Whether a refused connect may hand off to SDP rediscovery
    pub allow_sdp_fallback: bool,
}

impl ConnectRequest {
    pub fn new(device: DeviceAddress, record: SdpRecord) -> Self {
        Self {
            device,
            channel: record.channel,
            headset_type: record.headset_type,
            allow_sdp_fallback: true,
        }
    }

    pub fn without_sdp_fallback(mut self) -> Self {
        self.allow_sdp_fallback = false;
        self
    }
}

/// Collaborators a worker needs
#[derive(Clone)]
pub struct ConnectContext {
    pub config: HeadsetConfig,
    pub transport: Arc<dyn RfcommTransport>,
    pub sdp: Arc<dyn SdpClient>,
    pub sdp_tracker: Arc<SdpTracker>,
    pub reply: mpsc::UnboundedSender<ServiceMessage>,
}

enum AttemptResult {
    Connected(TransportHandle),
    Failed(TransportError),
    Cancelled,
}

/// Handle to a running connect worker
pub struct OutgoingConnectThread {
    id: AttemptId,
    device: DeviceAddress,
    cancel: CancelToken,
    handle: JoinHandle<()>,
}

impl OutgoingConnectThread {
    pub fn spawn(
        id: AttemptId,
        request: ConnectRequest,
        context: ConnectContext,
    ) -> HeadsetResult<Self> {
        let cancel = CancelToken::new();
        let worker = ConnectWorker {
            id,
            request,
            context,
            cancel: cancel.clone(),
        };
        let handle = std::thread::Builder::new()
            .name(format!("rfcomm-connect-{}", request.device))
            .spawn(move || worker.run())
            .map_err(HeadsetError::Io)?;

        debug!(device = %request.device, channel = request.channel, attempt = %id, "Connect worker started");
        Ok(Self {
            id,
            device: request.device,
            cancel,
            handle,
        })
    }

    pub fn id(&self) -> AttemptId {
        self.id
    }

    pub fn device(&self) -> DeviceAddress {
        self.device
    }

    /// Interrupt the worker and wait for it to exit
    pub fn cancel_and_join(self) {
        self.cancel.cancel();
        self.join();
    }

    /// Wait for a worker that has already reported.
    ///
    /// A collaborator may call back into the service from the worker's own
    /// thread (an SDP client answering inside `query`); that worker cannot
    /// join itself and is detached instead. It exits on its own once the
    /// callback returns.
    pub fn join(self) {
        if self.handle.thread().id() == std::thread::current().id() {
            debug!(device = %self.device, attempt = %self.id, "Detaching connect worker from its own thread");
            return;
        }
        if self.handle.join().is_err() {
            error!(device = %self.device, attempt = %self.id, "Connect worker panicked");
        }
    }
}

struct ConnectWorker {
    id: AttemptId,
    request: ConnectRequest,
    context: ConnectContext,
    cancel: CancelToken,
}

impl ConnectWorker {
    fn run(self) {
        if let Some(outcome) = self.connect() {
            self.report(outcome);
        }
    }

    fn connect(&self) -> Option<ConnectOutcome> {
        let device = self.request.device;
        let err = match self.attempt() {
            AttemptResult::Connected(handle) => return Some(ConnectOutcome::Connected(handle)),
            AttemptResult::Cancelled => return None,
            AttemptResult::Failed(err) => err,
        };

        if err.is_refused() && self.request.allow_sdp_fallback {
            if self.context.sdp_tracker.try_begin(device) {
                info!(device = %device, channel = self.request.channel, "Channel refused, rediscovering via SDP");
                return match self.context.sdp.query(device) {
                    Ok(()) => None,
                    Err(sdp_err) => {
                        self.context.sdp_tracker.finish(&device);
                        warn!(device = %device, error = %sdp_err, "SDP query could not be started");
                        Some(ConnectOutcome::Failed(sdp_err))
                    }
                };
            }
            debug!(device = %device, "SDP already in flight, retrying channel");
        }

        warn!(device = %device, channel = self.request.channel, error = %err, "Connect failed, retrying once");
        if self.cancel.sleep(self.context.config.retry_delay) {
            return None;
        }
        match self.attempt() {
            AttemptResult::Connected(handle) => Some(ConnectOutcome::Connected(handle)),
            AttemptResult::Cancelled => None,
            AttemptResult::Failed(err) => Some(ConnectOutcome::Failed(err)),
        }
    }

    /// One full socket attempt bounded by the poll ceiling
    fn attempt(&self) -> AttemptResult {
        if self.cancel.is_cancelled() {
            return AttemptResult::Cancelled;
        }
        let ConnectRequest {
            device,
            channel,
            headset_type,
            ..
        } = self.request;

        let mut socket = match self.context.transport.create_socket(device, channel, headset_type) {
            Ok(socket) => socket,
            Err(err) => return AttemptResult::Failed(err),
        };
        if let Err(err) = socket.start_connect() {
            socket.close();
            return AttemptResult::Failed(err);
        }

        for _ in 0..self.context.config.max_poll_slices {
            if self.cancel.is_cancelled() {
                socket.close();
                return AttemptResult::Cancelled;
            }
            match socket.wait_for_connect(self.context.config.poll_slice) {
                Ok(ConnectPoll::Pending) => continue,
                Ok(ConnectPoll::Connected(handle)) => {
                    if self.cancel.is_cancelled() {
                        socket.close();
                        return AttemptResult::Cancelled;
                    }
                    return AttemptResult::Connected(handle);
                }
                Err(err) => {
                    socket.close();
                    return AttemptResult::Failed(err);
                }
            }
        }

        socket.close();
        AttemptResult::Failed(TransportError::Timeout)
    }

    fn report(&self, outcome: ConnectOutcome) {
        let message = ServiceMessage::ConnectFinished {
            device: self.request.device,
            attempt: self.id,
            outcome: outcome.clone(),
        };
        if self.context.reply.send(message).is_err() {
            debug!(device = %self.request.device, "Headset service gone, dropping connect result");
            if let ConnectOutcome::Connected(handle) = outcome {
                self.context.transport.disconnect(handle);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_wakes_sleeper() {
        let token = CancelToken::new();
        let sleeper = token.clone();
        let started = Instant::now();
        let handle = std::thread::spawn(move || sleeper.sleep(Duration::from_secs(30)));

        std::thread::sleep(Duration::from_millis(20));
        token.cancel();
        assert!(handle.join().unwrap());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn uncancelled_sleep_runs_to_deadline() {
        let token = CancelToken::new();
        assert!(!token.sleep(Duration::from_millis(5)));
        assert!(!token.is_cancelled());
    }

    #[test]
    fn sdp_tracker_admits_one_query_per_device() {
        let tracker = SdpTracker::new();
        let device = DeviceAddress::new([1, 2, 3, 4, 5, 6]);

        assert!(tracker.try_begin(device));
        assert!(!tracker.try_begin(device));
        tracker.finish(&device);
        assert!(!tracker.is_in_flight(&device));
        assert!(tracker.try_begin(device));
    }

    #[test]
    fn attempt_ids_increase() {
        let ids = AttemptIds::default();
        let first = ids.next();
        let second = ids.next();
        assert!(second > first);
        assert_eq!(first.to_string(), "attempt#1");
    }
}
