//! State the in-call UI reads after a placement attempt

use crate::types::{CallStatusCode, ProviderInfo};

/// What the UI should show while something happens in the background
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressIndication {
    /// Emergency call requested while the radio is off
    TurningOnRadio,
    /// Radio is up, emergency call is being retried
    Retrying,
}

/// UI-visible state owned by the call controller
#[derive(Debug, Clone, Default)]
pub struct InCallUiState {
    pending_call_status: Option<CallStatusCode>,
    pub show_dialpad: bool,
    pub dialpad_digits: Option<String>,
    /// Placing this call took the phone out of emergency callback mode
    pub exited_ecm: bool,
    pub progress: Option<ProgressIndication>,
    pub provider: Option<ProviderInfo>,
    /// Within the CDMA second-line "dialing" display window
    pub pseudo_dialing: bool,
}

impl InCallUiState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the status the UI must react to. Overwrites an unread value.
    pub fn set_pending_call_status(&mut self, status: CallStatusCode) {
        self.pending_call_status = Some(status);
    }

    pub fn clear_pending_call_status(&mut self) {
        self.pending_call_status = None;
    }

    /// Read and clear the pending status; a second read yields `None`
    pub fn take_pending_call_status(&mut self) -> Option<CallStatusCode> {
        self.pending_call_status.take()
    }

    /// Reset per-call state after a regular call was dialed
    pub(crate) fn reset_for_new_call(&mut self, show_dialpad: bool) {
        self.show_dialpad = show_dialpad;
        self.dialpad_digits = None;
        self.exited_ecm = false;
    }
}
