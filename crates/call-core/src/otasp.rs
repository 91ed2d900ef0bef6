//! OTASP (over-the-air service provisioning) call detection
//!
//! Only consulted for phones whose radio technology supports OTASP. A
//! matching intent arms auxiliary state before the normal placement runs;
//! placement itself is unchanged.

use crate::routing::resolve_number;
use crate::telephony::Phone;
use crate::types::{CallAction, CallIntent};
use tracing::info;

/// Auxiliary state for an activation call in progress
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OtaspState {
    /// An activation call is being set up
    pub armed: bool,
    /// Dial string that triggered activation
    pub number: Option<String>,
}

impl OtaspState {
    pub fn clear(&mut self) {
        self.armed = false;
        self.number = None;
    }
}

/// Whether the intent is a call to one of the activation prefixes
pub fn is_otasp_call(intent: &CallIntent, phone: &dyn Phone, prefixes: &[String]) -> bool {
    if intent.action != CallAction::Call {
        return false;
    }
    match resolve_number(intent, phone) {
        Ok(Some(number)) => prefixes.iter().any(|p| number.starts_with(p.as_str())),
        _ => false,
    }
}

/// Arm or clear OTASP state for this intent
pub fn check_for_otasp_call(
    state: &mut OtaspState,
    intent: &CallIntent,
    phone: &dyn Phone,
    prefixes: &[String],
) {
    if is_otasp_call(intent, phone, prefixes) {
        let number = resolve_number(intent, phone).ok().flatten();
        info!(number = ?number, "OTASP activation call detected");
        state.armed = true;
        state.number = number;
    } else {
        state.clear();
    }
}
