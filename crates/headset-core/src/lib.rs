//! # rphone headset-core
//!
//! Connection management for a single Bluetooth headset over RFCOMM.
//!
//! At most one headset is `Connecting` or `Connected` at a time. Incoming
//! and outgoing connections to the same device can race; the incoming one
//! wins and the outgoing attempt's late result is discarded. Outgoing
//! connects discover the channel over SDP, poll the socket on a dedicated
//! worker thread, and fall back to SDP once if a cached channel is refused.
//! The most recently connected device is remembered as the auto-connect
//! device and reconnected when the adapter is enabled.
//!
//! ## Example
//!
//! ```rust,no_run
//! use rphone_headset_core::{HeadsetConfig, HeadsetEvent, HeadsetService, InMemoryPrioritySettings};
//! use rphone_headset_core::transport::{RfcommTransport, SdpClient};
//! use std::sync::Arc;
//!
//! # async fn example(rfcomm: Arc<dyn RfcommTransport>, sdp: Arc<dyn SdpClient>) -> Result<(), Box<dyn std::error::Error>> {
//! let settings = Arc::new(InMemoryPrioritySettings::new());
//! let service = Arc::new(HeadsetService::new(HeadsetConfig::default(), rfcomm, sdp, settings)?);
//! service.spawn_event_loop()?;
//!
//! let mut events = service.subscribe();
//! service.connect("00:1A:7D:DA:71:13".parse()?)?;
//! while let Ok(event) = events.recv().await {
//!     if let HeadsetEvent::StateChanged(change) = event {
//!         println!("{} is now {}", change.device, change.new);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod address;
pub mod arbiter;
pub mod config;
pub mod connect;
pub mod error;
pub mod events;
pub mod priority;
pub mod registry;
pub mod service;
pub mod transport;
pub mod types;

pub use address::DeviceAddress;
pub use arbiter::{IncomingConnectionArbiter, IncomingDecision, RejectReason};
pub use config::HeadsetConfig;
pub use connect::{AttemptId, CancelToken, OutgoingConnectThread, SdpTracker};
pub use error::{HeadsetError, HeadsetResult, TransportError};
pub use events::{HeadsetEvent, HeadsetStateChange};
pub use priority::{
    InMemoryPrioritySettings, JsonFilePrioritySettings, PriorityPolicy, PrioritySettings,
};
pub use registry::{HeadsetEntry, HeadsetRegistry};
pub use service::HeadsetService;
pub use types::{
    ChangeResult, ConnectionState, DisconnectInitiator, HeadsetType, IncomingConnectionInfo,
    Priority, SdpRecord, TransportHandle,
};
