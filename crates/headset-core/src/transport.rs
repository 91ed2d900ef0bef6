//! RFCOMM and SDP collaborator traits
//!
//! The platform layer implements these. Sockets are blocking: the
//! outgoing connect worker drives them from its own thread.

use crate::address::DeviceAddress;
use crate::error::TransportError;
use crate::types::{HeadsetType, TransportHandle};
use std::time::Duration;

/// Progress of a connecting socket after one poll slice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectPoll {
    Connected(TransportHandle),
    Pending,
}

/// A client RFCOMM socket owned by one connect attempt
pub trait RfcommSocket: Send {
    /// Begin the non-blocking connect
    fn start_connect(&mut self) -> Result<(), TransportError>;

    /// Block for at most `timeout` waiting for the connect to finish
    fn wait_for_connect(&mut self, timeout: Duration) -> Result<ConnectPoll, TransportError>;

    /// Abort the connect and release the socket
    fn close(&mut self);
}

/// Factory and control surface for RFCOMM connections
pub trait RfcommTransport: Send + Sync {
    fn create_socket(
        &self,
        device: DeviceAddress,
        channel: u8,
        headset_type: HeadsetType,
    ) -> Result<Box<dyn RfcommSocket>, TransportError>;

    /// Tear down an established connection
    fn disconnect(&self, handle: TransportHandle);

    /// Pull the link out of sniff/park mode so the remote notices a
    /// disconnect promptly. Returns false if the link could not be woken.
    fn wake_from_low_power(&self, handle: TransportHandle) -> bool;
}

/// Service discovery.
///
/// `query` only starts the lookup. The platform reports the result through
/// [`HeadsetService::on_sdp_result`](crate::service::HeadsetService::on_sdp_result),
/// preferring the hands-free record over the headset record. The result
/// may be reported before `query` returns, on the calling thread.
pub trait SdpClient: Send + Sync {
    fn query(&self, device: DeviceAddress) -> Result<(), TransportError>;
}
