//! # rphone call-core
//!
//! Outgoing call admission and placement.
//!
//! The crate decides whether an outgoing call may be dialed in the current
//! radio state, selects the phone that carries it, dials it through the
//! [`telephony`] collaborator traits and reports a single
//! [`CallStatusCode`] per attempt. Emergency numbers dialed while the radio
//! is off are not rejected: the radio is powered on and the call is retried
//! once ([`recovery`]).
//!
//! ## Modules
//!
//! - `availability`: service state → admission verdict
//! - `placer`: the [`CallController`] and its event loop
//! - `recovery`: emergency radio recovery sequence
//! - `routing`: number resolution, phone selection, emergency numbers
//! - `otasp`: activation call detection
//! - `ui_state`: the pending status slot and per-call UI flags
//! - `telephony`: traits implemented by the platform layer
//!
//! ## Example
//!
//! ```rust,no_run
//! use rphone_call_core::{CallConfig, CallController, CallIntent, CallStatusCode};
//! use rphone_call_core::telephony::{CallManager, RadioControl};
//! use std::sync::Arc;
//!
//! # async fn example(cm: Arc<dyn CallManager>, radio: Arc<dyn RadioControl>) -> Result<(), Box<dyn std::error::Error>> {
//! let controller = Arc::new(CallController::new(CallConfig::default(), cm, radio)?);
//! controller.spawn_event_loop()?;
//!
//! match controller.place(&CallIntent::call("5551234")) {
//!     CallStatusCode::Success => println!("dialing"),
//!     other => println!("show error dialog for {}", other),
//! }
//! # Ok(())
//! # }
//! ```

pub mod availability;
pub mod config;
pub mod error;
pub mod events;
pub mod otasp;
pub mod placer;
pub mod recovery;
pub mod routing;
pub mod telephony;
pub mod types;
pub mod ui_state;

pub use availability::ServiceAvailability;
pub use config::{CallConfig, UnknownDialResultPolicy};
pub use error::{CallError, CallResult};
pub use events::CallControllerEvent;
pub use placer::CallController;
pub use recovery::{EmergencyRadioRecovery, RecoveryStep};
pub use types::{
    CallAction, CallIntent, CallStatusCode, CallUri, DialRequest, DialResult, PhoneType,
    ProviderInfo, ServiceState,
};
pub use ui_state::{InCallUiState, ProgressIndication};
