//! Events processed by the call controller event loop

use crate::types::ServiceState;

/// Message delivered to [`CallController::handle_event`](crate::placer::CallController::handle_event)
///
/// Events are processed one at a time in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallControllerEvent {
    /// The default phone's service state changed
    ServiceStateChanged(ServiceState),
    /// Emergency recovery gave the radio its full registration budget
    RecoveryTimeout { generation: u64 },
    /// The CDMA second-line "dialing" display window elapsed
    PseudoDialingDone { generation: u64 },
    /// Stop the event loop
    Shutdown,
}
