//! Headset connection service
//!
//! [`HeadsetService`] owns the registry, the live connect attempt and the
//! priority policy behind one mutex. Platform callbacks (incoming sockets,
//! SDP results, remote disconnects) and UI requests may arrive on any
//! thread; each one runs its read-modify-write under that mutex. Transport
//! calls are made after the lock is released.
//!
//! Outgoing connects are SDP first: the channel is discovered, then an
//! [`OutgoingConnectThread`] is dispatched. A channel cached from an earlier
//! session skips discovery; if it turns out stale the worker falls back to
//! SDP once.

use crate::address::DeviceAddress;
use crate::arbiter::{IncomingConnectionArbiter, IncomingDecision};
use crate::config::HeadsetConfig;
use crate::connect::{
    AttemptId, AttemptIds, ConnectContext, ConnectRequest, OutgoingConnectThread, SdpTracker,
};
use crate::error::{HeadsetError, HeadsetResult};
use crate::events::{ConnectOutcome, HeadsetEvent, HeadsetStateChange, ServiceMessage};
use crate::priority::{PriorityPolicy, PrioritySettings};
use crate::registry::{HeadsetEntry, HeadsetRegistry};
use crate::transport::{RfcommTransport, SdpClient};
use crate::types::{
    ChangeResult, ConnectionState, DisconnectInitiator, IncomingConnectionInfo, Priority,
    SdpRecord, TransportHandle,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

struct LiveAttempt {
    id: AttemptId,
    device: DeviceAddress,
    record: Option<SdpRecord>,
    worker: Option<OutgoingConnectThread>,
}

#[derive(Default)]
struct ServiceInner {
    registry: HeadsetRegistry,
    attempt: Option<LiveAttempt>,
    channels: HashMap<DeviceAddress, SdpRecord>,
}

impl ServiceInner {
    /// Detach the live attempt if it targets `device`
    fn take_attempt_for(&mut self, device: DeviceAddress) -> Option<LiveAttempt> {
        match &self.attempt {
            Some(attempt) if attempt.device == device => self.attempt.take(),
            _ => None,
        }
    }
}

fn stop_worker(attempt: Option<LiveAttempt>) {
    if let Some(worker) = attempt.and_then(|a| a.worker) {
        worker.cancel_and_join();
    }
}

/// Single-device headset connection manager
pub struct HeadsetService {
    config: HeadsetConfig,
    transport: Arc<dyn RfcommTransport>,
    sdp: Arc<dyn SdpClient>,
    policy: PriorityPolicy,
    sdp_tracker: Arc<SdpTracker>,
    attempt_ids: AttemptIds,
    inner: Mutex<ServiceInner>,
    events: broadcast::Sender<HeadsetEvent>,
    messages_tx: mpsc::UnboundedSender<ServiceMessage>,
    messages_rx: Mutex<Option<mpsc::UnboundedReceiver<ServiceMessage>>>,
}

impl HeadsetService {
    pub fn new(
        config: HeadsetConfig,
        transport: Arc<dyn RfcommTransport>,
        sdp: Arc<dyn SdpClient>,
        settings: Arc<dyn PrioritySettings>,
    ) -> HeadsetResult<Self> {
        config.validate()?;
        let (events, _) = broadcast::channel(config.event_capacity);
        let (messages_tx, messages_rx) = mpsc::unbounded_channel();

        Ok(Self {
            config,
            transport,
            sdp,
            policy: PriorityPolicy::new(settings),
            sdp_tracker: Arc::new(SdpTracker::new()),
            attempt_ids: AttemptIds::default(),
            inner: Mutex::new(ServiceInner::default()),
            events,
            messages_tx,
            messages_rx: Mutex::new(Some(messages_rx)),
        })
    }

    pub fn config(&self) -> &HeadsetConfig {
        &self.config
    }

    /// Receive state changes and incoming-connection notices
    pub fn subscribe(&self) -> broadcast::Receiver<HeadsetEvent> {
        self.events.subscribe()
    }

    /// Sender used by connect workers; exposed for driving the loop in tests
    pub fn message_sender(&self) -> mpsc::UnboundedSender<ServiceMessage> {
        self.messages_tx.clone()
    }

    /// Start processing worker results. Can be started once, from within
    /// a tokio runtime.
    pub fn spawn_event_loop(self: &Arc<Self>) -> HeadsetResult<JoinHandle<()>> {
        let runtime = Handle::try_current().map_err(|e| HeadsetError::NoRuntime(e.to_string()))?;
        let mut rx = self
            .messages_rx
            .lock()
            .take()
            .ok_or(HeadsetError::EventLoopRunning)?;
        let service = Arc::clone(self);

        Ok(runtime.spawn(async move {
            while let Some(message) = rx.recv().await {
                if !service.handle_message(message) {
                    break;
                }
            }
            debug!("Headset service event loop stopped");
        }))
    }

    pub fn get_state(&self, device: &DeviceAddress) -> ConnectionState {
        self.inner.lock().registry.state(device)
    }

    /// The device holding the connection slot, if any
    pub fn current_device(&self) -> Option<(DeviceAddress, ConnectionState)> {
        self.inner.lock().registry.current()
    }

    pub fn entry(&self, device: &DeviceAddress) -> Option<HeadsetEntry> {
        self.inner.lock().registry.entry(device).cloned()
    }

    /// Channel learned from SDP for `device`
    pub fn cached_channel(&self, device: &DeviceAddress) -> Option<SdpRecord> {
        self.inner.lock().channels.get(device).copied()
    }

    pub fn has_live_attempt(&self) -> bool {
        self.inner.lock().attempt.is_some()
    }

    pub fn priority(&self, device: &DeviceAddress) -> Priority {
        let _inner = self.inner.lock();
        self.policy.get(device)
    }

    pub fn set_priority(&self, device: &DeviceAddress, priority: Priority) -> HeadsetResult<()> {
        let _inner = self.inner.lock();
        self.policy.settings().set(device, priority)
    }

    fn emit_change(&self, change: HeadsetStateChange) {
        info!(
            device = %change.device,
            previous = %change.previous,
            new = %change.new,
            initiator = ?change.initiator,
            "Headset state changed"
        );
        let _ = self.events.send(HeadsetEvent::StateChanged(change));
    }

    fn promote(&self, device: &DeviceAddress) {
        if let Err(e) = self.policy.promote(device) {
            warn!(device = %device, error = %e, "Failed to store auto-connect priority");
        }
    }

    /// Start an outgoing connection. Fails with `Busy` if any device already
    /// holds the connection slot, or with `Transport` if channel discovery
    /// cannot be started (the entry is back to `Disconnected` by then).
    pub fn connect(&self, device: DeviceAddress) -> HeadsetResult<()> {
        let id = self.attempt_ids.next();
        let mut inner = self.inner.lock();
        let change = inner.registry.begin_outgoing(device, id).map_err(|e| {
            info!(device = %device, error = %e, "Connect request rejected");
            e
        })?;
        self.emit_change(change);

        let record = inner.channels.get(&device).copied();
        let stale = inner.attempt.replace(LiveAttempt {
            id,
            device,
            record,
            worker: None,
        });

        let dispatched = match record {
            Some(record) => {
                debug!(device = %device, channel = record.channel, "Connecting on cached channel");
                self.dispatch_worker(&mut inner, id, ConnectRequest::new(device, record))
            }
            None => Ok(()),
        };
        drop(inner);

        stop_worker(stale);
        match record {
            Some(_) => dispatched,
            None => self.request_sdp(device, id),
        }
    }

    fn dispatch_worker(
        &self,
        inner: &mut ServiceInner,
        id: AttemptId,
        request: ConnectRequest,
    ) -> HeadsetResult<()> {
        let context = ConnectContext {
            config: self.config.clone(),
            transport: Arc::clone(&self.transport),
            sdp: Arc::clone(&self.sdp),
            sdp_tracker: Arc::clone(&self.sdp_tracker),
            reply: self.messages_tx.clone(),
        };

        match OutgoingConnectThread::spawn(id, request, context) {
            Ok(worker) => {
                if let Some(attempt) = inner.attempt.as_mut().filter(|a| a.id == id) {
                    attempt.worker = Some(worker);
                }
                Ok(())
            }
            Err(e) => {
                inner.attempt = None;
                if let Some(change) = inner
                    .registry
                    .mark_failed(request.device, ChangeResult::Failure(e.to_string()))
                {
                    self.emit_change(change);
                }
                Err(e)
            }
        }
    }

    /// Start channel discovery for attempt `id`. If the query cannot be
    /// started the attempt fails and the transport error is returned.
    fn request_sdp(&self, device: DeviceAddress, id: AttemptId) -> HeadsetResult<()> {
        if !self.sdp_tracker.try_begin(device) {
            debug!(device = %device, "SDP query already in flight");
            return Ok(());
        }
        debug!(device = %device, attempt = %id, "Querying SDP for headset channel");
        let Err(e) = self.sdp.query(device) else {
            return Ok(());
        };
        self.sdp_tracker.finish(&device);
        warn!(device = %device, error = %e, "SDP query failed to start");

        let mut inner = self.inner.lock();
        if inner.attempt.as_ref().map_or(false, |a| a.id == id) {
            let attempt = inner.attempt.take();
            if let Some(change) = inner
                .registry
                .mark_failed(device, ChangeResult::Failure(e.to_string()))
            {
                self.emit_change(change);
            }
            drop(inner);
            stop_worker(attempt);
        }
        Err(HeadsetError::Transport(e))
    }

    /// SDP finished for `device`. `record` is the hands-free record if the
    /// device has one, else its headset record, else `None`.
    pub fn on_sdp_result(&self, device: DeviceAddress, record: Option<SdpRecord>) {
        self.sdp_tracker.finish(&device);
        let mut inner = self.inner.lock();
        match record {
            Some(record) => {
                inner.channels.insert(device, record);
            }
            None => {
                inner.channels.remove(&device);
            }
        }

        let waiting = match &inner.attempt {
            Some(attempt) if attempt.device == device => attempt.id,
            _ => {
                debug!(device = %device, "SDP result with no waiting connect attempt");
                return;
            }
        };
        let owns_entry = inner.registry.entry(&device).map_or(false, |e| {
            e.state == ConnectionState::Connecting && e.attempt == Some(waiting)
        });
        if !owns_entry {
            debug!(device = %device, attempt = %waiting, "SDP result for superseded attempt");
            return;
        }

        match record {
            Some(record) => {
                let previous = inner.attempt.as_mut().and_then(|a| {
                    a.record = Some(record);
                    a.worker.take()
                });
                info!(device = %device, channel = record.channel, headset_type = ?record.headset_type, "SDP found headset channel");
                let request = ConnectRequest::new(device, record).without_sdp_fallback();
                let dispatched = self.dispatch_worker(&mut inner, waiting, request);
                drop(inner);

                if let Some(worker) = previous {
                    worker.cancel_and_join();
                }
                if let Err(e) = dispatched {
                    warn!(device = %device, error = %e, "Could not start connect worker");
                }
            }
            None => {
                info!(device = %device, "No headset service record found");
                let attempt = inner.attempt.take();
                if let Some(change) = inner.registry.mark_failed(
                    device,
                    ChangeResult::Failure("no headset service record".to_string()),
                ) {
                    self.emit_change(change);
                }
                drop(inner);
                stop_worker(attempt);
            }
        }
    }

    /// Handle one queued message. Returns `false` when the loop should stop.
    pub fn handle_message(&self, message: ServiceMessage) -> bool {
        match message {
            ServiceMessage::ConnectFinished {
                device,
                attempt,
                outcome,
            } => self.on_connect_finished(device, attempt, outcome),
            ServiceMessage::Shutdown => return false,
        }
        true
    }

    fn on_connect_finished(&self, device: DeviceAddress, id: AttemptId, outcome: ConnectOutcome) {
        let mut inner = self.inner.lock();
        let live = inner
            .attempt
            .as_ref()
            .map_or(false, |a| a.id == id && a.device == device);
        let owns_entry = inner.registry.entry(&device).map_or(false, |e| {
            e.state == ConnectionState::Connecting && e.attempt == Some(id)
        });

        let attempt = if live { inner.attempt.take() } else { None };

        if !(live && owns_entry) {
            drop(inner);
            debug!(device = %device, attempt = %id, outcome = ?outcome, "Discarding stale connect result");
            if let ConnectOutcome::Connected(handle) = outcome {
                self.transport.disconnect(handle);
            }
            if let Some(worker) = attempt.and_then(|a| a.worker) {
                worker.join();
            }
            return;
        }

        let headset_type = attempt
            .as_ref()
            .and_then(|a| a.record)
            .map(|r| r.headset_type)
            .unwrap_or_default();

        match outcome {
            ConnectOutcome::Connected(handle) => {
                if let Some(change) = inner.registry.mark_connected(device, handle, headset_type) {
                    self.emit_change(change);
                }
                self.promote(&device);
            }
            ConnectOutcome::Failed(err) => {
                warn!(device = %device, error = %err, "Outgoing connect failed");
                if let Some(change) = inner
                    .registry
                    .mark_failed(device, ChangeResult::Failure(err.to_string()))
                {
                    self.emit_change(change);
                }
            }
        }
        drop(inner);

        if let Some(worker) = attempt.and_then(|a| a.worker) {
            worker.join();
        }
    }

    /// A remote device opened an RFCOMM connection to one of our server
    /// sockets. Rejected connections are closed before returning.
    pub fn on_incoming_connection(&self, info: IncomingConnectionInfo) -> IncomingDecision {
        let device = info.device;
        let socket = info.socket;

        let mut inner = self.inner.lock();
        let priority = self.policy.get(&device);
        let decision = IncomingConnectionArbiter::arbitrate(&mut inner.registry, info, priority);
        match &decision {
            IncomingDecision::Pending(change) => {
                self.emit_change(change.clone());
                let _ = self.events.send(HeadsetEvent::IncomingPending { device });
            }
            IncomingDecision::Collision { superseded_attempt } => {
                info!(device = %device, superseded = ?superseded_attempt, "Incoming connection won the race with our outgoing attempt");
                let _ = self.events.send(HeadsetEvent::IncomingCollision { device });
            }
            IncomingDecision::Reject(reason) => {
                info!(device = %device, reason = ?reason, "Rejected incoming connection");
            }
        }
        drop(inner);

        if matches!(decision, IncomingDecision::Reject(_)) {
            self.transport.disconnect(socket);
        }
        decision
    }

    /// Accept the pending incoming connection from `device`, cancelling our
    /// own outgoing attempt for it if one is still running
    pub fn accept_incoming(&self, device: DeviceAddress) -> HeadsetResult<()> {
        let mut inner = self.inner.lock();
        let info = pending_incoming(&inner.registry, &device)?;
        let superseded = inner.take_attempt_for(device);

        if let Some(change) = inner
            .registry
            .mark_connected(device, info.socket, info.headset_type)
        {
            self.emit_change(change);
        }
        self.promote(&device);
        drop(inner);

        stop_worker(superseded);
        Ok(())
    }

    /// Refuse the pending incoming connection from `device`
    pub fn reject_incoming(&self, device: DeviceAddress) -> HeadsetResult<()> {
        let mut inner = self.inner.lock();
        let info = pending_incoming(&inner.registry, &device)?;
        let superseded = inner.take_attempt_for(device);

        if let Some(change) = inner.registry.mark_failed(device, ChangeResult::Cancelled) {
            self.emit_change(change);
        }
        drop(inner);

        self.transport.disconnect(info.socket);
        stop_worker(superseded);
        Ok(())
    }

    /// Disconnect `device` locally. Returns false if it was not connecting
    /// or connected.
    pub fn disconnect(&self, device: DeviceAddress) -> bool {
        let mut inner = self.inner.lock();
        let Some(entry) = inner.registry.entry(&device).cloned() else {
            return false;
        };

        match entry.state {
            ConnectionState::Connected => {
                if let Some(change) = inner
                    .registry
                    .mark_disconnected(device, DisconnectInitiator::Local)
                {
                    self.emit_change(change);
                }
                drop(inner);

                if let Some(handle) = entry.handle {
                    if !self.transport.wake_from_low_power(handle) {
                        debug!(device = %device, "Could not wake link before disconnect");
                    }
                    self.transport.disconnect(handle);
                }
                true
            }
            ConnectionState::Connecting => {
                let attempt = inner.take_attempt_for(device);
                if let Some(change) = inner.registry.mark_failed(device, ChangeResult::Cancelled) {
                    self.emit_change(change);
                }
                drop(inner);

                stop_worker(attempt);
                if entry.is_incoming() {
                    if let Some(handle) = entry.handle {
                        self.transport.disconnect(handle);
                    }
                }
                true
            }
            ConnectionState::Disconnected => false,
        }
    }

    /// The transport dropped `handle` on its own
    pub fn on_transport_disconnected(&self, device: DeviceAddress, handle: TransportHandle) -> bool {
        let mut inner = self.inner.lock();
        let Some(entry) = inner.registry.entry(&device).cloned() else {
            return false;
        };
        if entry.handle != Some(handle) {
            debug!(device = %device, handle = %handle, "Disconnect for a transport we no longer track");
            return false;
        }

        match entry.state {
            ConnectionState::Connected => {
                if let Some(change) = inner
                    .registry
                    .mark_disconnected(device, DisconnectInitiator::Remote)
                {
                    self.emit_change(change);
                }
                true
            }
            ConnectionState::Connecting => {
                let attempt = inner.take_attempt_for(device);
                if let Some(change) = inner.registry.mark_failed(
                    device,
                    ChangeResult::Failure("remote closed the connection".to_string()),
                ) {
                    self.emit_change(change);
                }
                drop(inner);
                stop_worker(attempt);
                true
            }
            ConnectionState::Disconnected => false,
        }
    }

    /// Stop the live outgoing worker. The entry stays `Connecting`; the
    /// caller reconciles it with `disconnect` or `accept_incoming`.
    pub fn cancel_connect_attempt(&self) -> bool {
        let attempt = self.inner.lock().attempt.take();
        match attempt {
            Some(attempt) => {
                info!(device = %attempt.device, attempt = %attempt.id, "Cancelling connect attempt");
                stop_worker(Some(attempt));
                true
            }
            None => false,
        }
    }

    /// Repair priorities after the adapter comes up and reconnect the
    /// auto-connect device. Returns the device a connect was started for.
    pub fn on_adapter_enabled(&self) -> HeadsetResult<Option<DeviceAddress>> {
        let auto_connect = {
            let _inner = self.inner.lock();
            let bonded = self.policy.settings().bonded_devices();
            self.policy.normalize(&bonded)?
        };

        let Some(device) = auto_connect else {
            debug!("No auto-connect headset");
            return Ok(None);
        };
        match self.connect(device) {
            Ok(()) => {
                info!(device = %device, "Auto-connecting headset");
                Ok(Some(device))
            }
            Err(HeadsetError::Busy { current, .. }) => {
                debug!(device = %device, current = %current, "Skipping auto-connect, slot in use");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Cancel the live attempt, disconnect the current device and stop the
    /// event loop
    pub fn shutdown(&self) {
        self.cancel_connect_attempt();
        if let Some((device, _)) = self.current_device() {
            self.disconnect(device);
        }
        let _ = self.messages_tx.send(ServiceMessage::Shutdown);
        info!("Headset service shut down");
    }
}

impl Drop for HeadsetService {
    fn drop(&mut self) {
        stop_worker(self.inner.get_mut().attempt.take());
    }
}

fn pending_incoming(
    registry: &HeadsetRegistry,
    device: &DeviceAddress,
) -> HeadsetResult<IncomingConnectionInfo> {
    match registry.entry(device) {
        Some(entry) if entry.state == ConnectionState::Connected => Err(
            HeadsetError::invalid_state(*device, "already connected, nothing pending to decide"),
        ),
        Some(entry) if entry.state == ConnectionState::Connecting => entry
            .incoming
            .clone()
            .ok_or(HeadsetError::NoPendingIncoming(*device)),
        _ => Err(HeadsetError::NoPendingIncoming(*device)),
    }
}
