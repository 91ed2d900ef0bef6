//! HeadsetService end-to-end behaviour against fake RFCOMM and SDP

mod common;

use common::{dev, fast_config, FakeSdp, FakeTransport, SocketScript, TransportOp};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use rphone_headset_core::events::{ConnectOutcome, ServiceMessage};
use rphone_headset_core::transport::SdpClient;
use rphone_headset_core::{
    ChangeResult, ConnectionState, DeviceAddress, DisconnectInitiator, HeadsetError, HeadsetEvent,
    HeadsetService, HeadsetStateChange, HeadsetType, InMemoryPrioritySettings, IncomingConnectionInfo,
    IncomingDecision, Priority, PrioritySettings, RejectReason, SdpRecord, TransportError,
    TransportHandle,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast;

struct Harness {
    service: Arc<HeadsetService>,
    transport: Arc<FakeTransport>,
    sdp: Arc<FakeSdp>,
    settings: Arc<InMemoryPrioritySettings>,
    events: broadcast::Receiver<HeadsetEvent>,
}

fn harness_with(transport: FakeTransport, sdp: FakeSdp) -> Harness {
    let transport = Arc::new(transport);
    let sdp = Arc::new(sdp);
    let settings = Arc::new(InMemoryPrioritySettings::new());
    let service = Arc::new(
        HeadsetService::new(fast_config(), transport.clone(), sdp.clone(), settings.clone())
            .unwrap(),
    );
    let events = service.subscribe();
    Harness {
        service,
        transport,
        sdp,
        settings,
        events,
    }
}

fn harness(fallback: SocketScript) -> Harness {
    harness_with(FakeTransport::new(fallback), FakeSdp::default())
}

fn handsfree(channel: u8) -> Option<SdpRecord> {
    Some(SdpRecord {
        channel,
        headset_type: HeadsetType::Handsfree,
    })
}

fn incoming(device: DeviceAddress, socket: u64) -> IncomingConnectionInfo {
    IncomingConnectionInfo::new(device, 2, TransportHandle(socket), HeadsetType::Headset)
}

async fn next_change(events: &mut broadcast::Receiver<HeadsetEvent>) -> HeadsetStateChange {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for state change")
            .unwrap();
        if let HeadsetEvent::StateChanged(change) = event {
            return change;
        }
    }
}

async fn wait_for_state(
    events: &mut broadcast::Receiver<HeadsetEvent>,
    device: DeviceAddress,
    state: ConnectionState,
) -> HeadsetStateChange {
    loop {
        let change = next_change(events).await;
        if change.device == device && change.new == state {
            return change;
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sdp_first_connect_reaches_connected_and_promotes() {
    let mut h = harness(SocketScript::Connect);
    h.service.spawn_event_loop().unwrap();
    h.settings.set(&dev(2), Priority::AUTO_CONNECT).unwrap();

    h.service.connect(dev(1)).unwrap();
    assert_eq!(h.service.get_state(&dev(1)), ConnectionState::Connecting);
    assert_eq!(h.sdp.queries(), vec![dev(1)]);
    assert!(h.transport.created_channels().is_empty());

    h.service.on_sdp_result(dev(1), handsfree(5));
    wait_for_state(&mut h.events, dev(1), ConnectionState::Connected).await;

    let entry = h.service.entry(&dev(1)).unwrap();
    assert_eq!(entry.headset_type, HeadsetType::Handsfree);
    assert!(entry.handle.is_some());
    assert_eq!(h.transport.created_channels(), vec![5]);
    assert_eq!(h.settings.get(&dev(1)), Priority::AUTO_CONNECT);
    assert_eq!(h.settings.get(&dev(2)), Priority::ON);
    assert!(!h.service.has_live_attempt());
}

#[tokio::test]
async fn second_device_is_rejected_while_connecting() {
    let h = harness(SocketScript::Hang);
    h.service.connect(dev(1)).unwrap();

    let err = h.service.connect(dev(2)).unwrap_err();
    assert!(matches!(err, HeadsetError::Busy { current, requested, .. } if current == dev(1) && requested == dev(2)));
    assert_eq!(h.service.get_state(&dev(2)), ConnectionState::Disconnected);
}

#[tokio::test]
async fn missing_sdp_record_fails_attempt() {
    let mut h = harness(SocketScript::Connect);
    h.service.connect(dev(1)).unwrap();
    h.service.on_sdp_result(dev(1), None);

    let change = wait_for_state(&mut h.events, dev(1), ConnectionState::Disconnected).await;
    assert!(matches!(change.result, ChangeResult::Failure(_)));
    assert!(h.transport.created_channels().is_empty());
    assert!(!h.service.has_live_attempt());
}

#[tokio::test]
async fn sdp_that_cannot_start_fails_attempt() {
    let mut h = harness_with(FakeTransport::new(SocketScript::Connect), FakeSdp::failing());
    let err = h.service.connect(dev(1)).unwrap_err();
    assert!(matches!(
        err,
        HeadsetError::Transport(TransportError::Io(ref msg)) if msg == "sdp unavailable"
    ));

    wait_for_state(&mut h.events, dev(1), ConnectionState::Disconnected).await;
    assert_eq!(h.service.get_state(&dev(1)), ConnectionState::Disconnected);
    assert!(!h.service.has_live_attempt());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stale_cached_channel_falls_back_to_sdp() {
    let transport = FakeTransport::scripted(&[SocketScript::Refuse], SocketScript::Connect);
    let mut h = harness_with(transport, FakeSdp::default());
    h.service.spawn_event_loop().unwrap();

    // learned in an earlier session
    h.service.on_sdp_result(dev(1), handsfree(5));
    assert_eq!(h.service.cached_channel(&dev(1)).map(|r| r.channel), Some(5));

    h.service.connect(dev(1)).unwrap();
    for _ in 0..200 {
        if h.sdp.query_count() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(h.sdp.queries(), vec![dev(1)]);

    h.service.on_sdp_result(dev(1), handsfree(7));
    wait_for_state(&mut h.events, dev(1), ConnectionState::Connected).await;
    assert_eq!(h.transport.created_channels(), vec![5, 7]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn transport_failure_returns_entry_to_disconnected() {
    let mut h = harness(SocketScript::HostDown);
    h.service.spawn_event_loop().unwrap();

    h.service.connect(dev(1)).unwrap();
    h.service.on_sdp_result(dev(1), handsfree(5));
    let change = wait_for_state(&mut h.events, dev(1), ConnectionState::Disconnected).await;

    assert_eq!(
        change,
        HeadsetStateChange {
            device: dev(1),
            previous: ConnectionState::Connecting,
            new: ConnectionState::Disconnected,
            initiator: None,
            result: ChangeResult::Failure("host is down".to_string()),
        }
    );
    let entry = h.service.entry(&dev(1)).unwrap();
    assert_eq!(entry.handle, None);
    assert_eq!(entry.headset_type, HeadsetType::Unknown);
    // first try plus one retry on the same channel
    assert_eq!(h.transport.created_channels(), vec![5, 5]);
    assert!(!h.service.has_live_attempt());
    assert_eq!(h.settings.get(&dev(1)), Priority::UNDEFINED);
}

/// Answers SDP queries inline, on whichever thread asked
struct InlineSdp {
    service: Mutex<Weak<HeadsetService>>,
    record: SdpRecord,
    queries: AtomicUsize,
    answered: AtomicBool,
}

impl SdpClient for InlineSdp {
    fn query(&self, device: DeviceAddress) -> Result<(), TransportError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let service = self.service.lock().upgrade();
        if let Some(service) = service {
            service.on_sdp_result(device, Some(self.record));
            self.answered.store(true, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sdp_answer_from_worker_thread_redispatches() {
    let transport = Arc::new(FakeTransport::scripted(&[SocketScript::Refuse], SocketScript::Connect));
    let sdp = Arc::new(InlineSdp {
        service: Mutex::new(Weak::new()),
        record: SdpRecord {
            channel: 7,
            headset_type: HeadsetType::Handsfree,
        },
        queries: AtomicUsize::new(0),
        answered: AtomicBool::new(false),
    });
    let service = Arc::new(
        HeadsetService::new(
            fast_config(),
            transport.clone(),
            sdp.clone(),
            Arc::new(InMemoryPrioritySettings::new()),
        )
        .unwrap(),
    );
    *sdp.service.lock() = Arc::downgrade(&service);
    let mut events = service.subscribe();
    service.spawn_event_loop().unwrap();

    // stale channel from an earlier session; the refusal makes the worker
    // query SDP, which answers before `query` returns
    service.on_sdp_result(dev(1), handsfree(5));
    service.connect(dev(1)).unwrap();
    wait_for_state(&mut events, dev(1), ConnectionState::Connected).await;

    assert!(sdp.answered.load(Ordering::SeqCst));
    assert_eq!(sdp.queries.load(Ordering::SeqCst), 1);
    assert_eq!(transport.created_channels(), vec![5, 7]);
    assert_eq!(service.cached_channel(&dev(1)).map(|r| r.channel), Some(7));
    assert!(!service.has_live_attempt());
}

#[tokio::test]
async fn incoming_collision_adopts_incoming_transport() {
    let mut h = harness(SocketScript::Hang);
    h.service.connect(dev(1)).unwrap();
    h.service.on_sdp_result(dev(1), handsfree(5));

    let decision = h.service.on_incoming_connection(incoming(dev(1), 42));
    assert!(matches!(decision, IncomingDecision::Collision { superseded_attempt: Some(_) }));

    let entry = h.service.entry(&dev(1)).unwrap();
    assert_eq!(entry.state, ConnectionState::Connecting);
    assert_eq!(entry.handle, Some(TransportHandle(42)));
    assert!(entry.is_incoming());

    let mut saw_collision = false;
    while let Ok(event) = h.events.try_recv() {
        if event == (HeadsetEvent::IncomingCollision { device: dev(1) }) {
            saw_collision = true;
        }
    }
    assert!(saw_collision);

    h.service.accept_incoming(dev(1)).unwrap();
    assert_eq!(h.service.get_state(&dev(1)), ConnectionState::Connected);
    assert_eq!(h.service.entry(&dev(1)).unwrap().handle, Some(TransportHandle(42)));
    assert!(!h.service.has_live_attempt());
    assert!(!h.transport.disconnected().contains(&TransportHandle(42)));
    assert_eq!(h.settings.get(&dev(1)), Priority::AUTO_CONNECT);
}

#[tokio::test]
async fn late_outgoing_result_after_collision_is_closed() {
    let h = harness(SocketScript::Hang);
    h.service.connect(dev(1)).unwrap();
    let attempt = h.service.entry(&dev(1)).unwrap().attempt.unwrap();

    h.service.on_incoming_connection(incoming(dev(1), 42));
    h.service.handle_message(ServiceMessage::ConnectFinished {
        device: dev(1),
        attempt,
        outcome: ConnectOutcome::Connected(TransportHandle(77)),
    });

    assert_eq!(h.transport.disconnected(), vec![TransportHandle(77)]);
    let entry = h.service.entry(&dev(1)).unwrap();
    assert_eq!(entry.state, ConnectionState::Connecting);
    assert_eq!(entry.handle, Some(TransportHandle(42)));
}

#[tokio::test]
async fn incoming_from_disabled_device_is_closed() {
    let h = harness(SocketScript::Connect);
    h.settings.set(&dev(3), Priority::OFF).unwrap();

    let decision = h.service.on_incoming_connection(incoming(dev(3), 50));
    assert_eq!(decision, IncomingDecision::Reject(RejectReason::PriorityOff(Priority::OFF)));
    assert_eq!(h.service.get_state(&dev(3)), ConnectionState::Disconnected);
    assert_eq!(h.transport.disconnected(), vec![TransportHandle(50)]);
}

#[tokio::test]
async fn incoming_while_other_connected_is_closed() {
    let h = harness(SocketScript::Connect);
    h.service.on_incoming_connection(incoming(dev(1), 10));
    h.service.accept_incoming(dev(1)).unwrap();

    let decision = h.service.on_incoming_connection(incoming(dev(2), 11));
    assert_eq!(decision, IncomingDecision::Reject(RejectReason::OtherDeviceActive(dev(1))));
    assert_eq!(h.transport.disconnected(), vec![TransportHandle(11)]);
    assert_eq!(h.service.get_state(&dev(1)), ConnectionState::Connected);
}

#[tokio::test]
async fn pending_incoming_is_announced_and_can_be_rejected() {
    let mut h = harness(SocketScript::Connect);
    let decision = h.service.on_incoming_connection(incoming(dev(4), 60));
    assert!(matches!(decision, IncomingDecision::Pending(_)));

    let first = h.events.try_recv().unwrap();
    let second = h.events.try_recv().unwrap();
    assert!(matches!(first, HeadsetEvent::StateChanged(ref c) if c.new == ConnectionState::Connecting));
    assert_eq!(second, HeadsetEvent::IncomingPending { device: dev(4) });

    h.service.reject_incoming(dev(4)).unwrap();
    assert_eq!(h.service.get_state(&dev(4)), ConnectionState::Disconnected);
    assert_eq!(h.transport.disconnected(), vec![TransportHandle(60)]);
    assert!(matches!(
        h.service.accept_incoming(dev(4)),
        Err(HeadsetError::NoPendingIncoming(d)) if d == dev(4)
    ));
}

#[tokio::test]
async fn connected_device_has_nothing_to_accept() {
    let h = harness(SocketScript::Connect);
    h.service.on_incoming_connection(incoming(dev(1), 10));
    h.service.accept_incoming(dev(1)).unwrap();

    let err = h.service.accept_incoming(dev(1)).unwrap_err();
    assert!(matches!(err, HeadsetError::InvalidState { device, .. } if device == dev(1)));
    assert!(matches!(
        h.service.reject_incoming(dev(1)),
        Err(HeadsetError::InvalidState { .. })
    ));
    assert_eq!(h.service.get_state(&dev(1)), ConnectionState::Connected);
    assert!(h.transport.disconnected().is_empty());
}

#[tokio::test]
async fn local_disconnect_wakes_link_first() {
    let mut h = harness(SocketScript::Connect);
    h.service.on_incoming_connection(incoming(dev(1), 10));
    h.service.accept_incoming(dev(1)).unwrap();

    assert!(h.service.disconnect(dev(1)));
    let change = wait_for_state(&mut h.events, dev(1), ConnectionState::Disconnected).await;
    assert_eq!(change.initiator, Some(DisconnectInitiator::Local));

    let ops: Vec<TransportOp> = h
        .transport
        .ops()
        .into_iter()
        .filter(|op| matches!(op, TransportOp::Wake(_) | TransportOp::Disconnect(_)))
        .collect();
    assert_eq!(
        ops,
        vec![
            TransportOp::Wake(TransportHandle(10)),
            TransportOp::Disconnect(TransportHandle(10))
        ]
    );
    assert!(!h.service.disconnect(dev(1)));
}

#[tokio::test]
async fn remote_disconnect_is_reported_as_remote() {
    let mut h = harness(SocketScript::Connect);
    h.service.on_incoming_connection(incoming(dev(1), 10));
    h.service.accept_incoming(dev(1)).unwrap();

    assert!(!h.service.on_transport_disconnected(dev(1), TransportHandle(99)));
    assert!(h.service.on_transport_disconnected(dev(1), TransportHandle(10)));

    let change = wait_for_state(&mut h.events, dev(1), ConnectionState::Disconnected).await;
    assert_eq!(change.initiator, Some(DisconnectInitiator::Remote));
    assert!(h.transport.disconnected().is_empty());
}

#[tokio::test]
async fn cancel_leaves_entry_for_caller_to_reconcile() {
    let h = harness(SocketScript::Hang);
    h.service.connect(dev(1)).unwrap();
    h.service.on_sdp_result(dev(1), handsfree(5));

    assert!(h.service.cancel_connect_attempt());
    assert!(!h.service.cancel_connect_attempt());
    assert_eq!(h.service.get_state(&dev(1)), ConnectionState::Connecting);

    assert!(h.service.disconnect(dev(1)));
    assert_eq!(h.service.get_state(&dev(1)), ConnectionState::Disconnected);
    assert!(h.service.connect(dev(2)).is_ok());
}

#[tokio::test]
async fn adapter_enable_repairs_priorities_and_auto_connects() {
    let h = harness(SocketScript::Hang);
    h.settings.set(&dev(1), Priority::AUTO_CONNECT).unwrap();
    h.settings.set(&dev(2), Priority::AUTO_CONNECT).unwrap();
    h.settings.bond(dev(3));

    let connected = h.service.on_adapter_enabled().unwrap();
    assert_eq!(connected, Some(dev(1)));
    assert_eq!(h.settings.get(&dev(2)), Priority::ON);
    assert_eq!(h.service.get_state(&dev(1)), ConnectionState::Connecting);
    assert_eq!(h.sdp.queries(), vec![dev(1)]);
}

#[tokio::test]
async fn adapter_enable_without_auto_connect_device_does_nothing() {
    let h = harness(SocketScript::Connect);
    h.settings.bond(dev(1));

    assert_eq!(h.service.on_adapter_enabled().unwrap(), None);
    assert!(h.service.current_device().is_none());
}

#[tokio::test]
async fn shutdown_disconnects_current_device() {
    let h = harness(SocketScript::Connect);
    let handle = h.service.spawn_event_loop().unwrap();
    h.service.on_incoming_connection(incoming(dev(1), 10));
    h.service.accept_incoming(dev(1)).unwrap();

    h.service.shutdown();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(h.service.get_state(&dev(1)), ConnectionState::Disconnected);
    assert!(h.transport.disconnected().contains(&TransportHandle(10)));
}

#[tokio::test]
async fn event_loop_starts_once() {
    let h = harness(SocketScript::Connect);
    h.service.spawn_event_loop().unwrap();
    assert!(matches!(
        h.service.spawn_event_loop(),
        Err(HeadsetError::EventLoopRunning)
    ));
}

#[test]
fn event_loop_needs_runtime() {
    let h = harness(SocketScript::Connect);
    assert!(matches!(
        h.service.spawn_event_loop(),
        Err(HeadsetError::NoRuntime(_))
    ));
}
