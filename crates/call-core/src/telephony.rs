//! Telephony collaborator contracts
//!
//! call-core never talks to a modem. It consumes these traits, which the
//! platform layer implements on top of its real phone objects.

use crate::types::{DialRequest, DialResult, PhoneType, ServiceState};
use std::sync::Arc;

/// One line capable of placing calls (GSM, CDMA or SIP)
pub trait Phone: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    fn phone_type(&self) -> PhoneType;

    /// Current registration state of this phone
    fn service_state(&self) -> ServiceState;

    /// Configured voicemail number, if any
    fn voicemail_number(&self) -> Option<String>;

    /// Hand a number to the radio. Must not block.
    fn dial(&self, request: &DialRequest) -> DialResult;

    /// Whether the phone is in emergency callback mode
    fn is_in_ecm(&self) -> bool {
        false
    }

    /// Whether this radio technology supports OTASP activation
    fn supports_otasp(&self) -> bool {
        false
    }

    /// Whether a call is already active in the foreground
    fn has_active_call(&self) -> bool {
        false
    }

    /// Profile URI for SIP phones
    fn sip_profile_uri(&self) -> Option<String> {
        None
    }
}

/// Owner of all phones known to the device
pub trait CallManager: Send + Sync {
    /// The phone used when no routing hint applies
    fn default_phone(&self) -> Arc<dyn Phone>;

    /// All registered SIP phones
    fn sip_phones(&self) -> Vec<Arc<dyn Phone>>;

    /// Service state of the default phone
    fn service_state(&self) -> ServiceState {
        self.default_phone().service_state()
    }
}

/// Radio power management
pub trait RadioControl: Send + Sync {
    /// Leave airplane mode and power the radio on. Must not block.
    fn power_on_radio(&self);
}
