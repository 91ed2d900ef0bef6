//! Type definitions for call placement
//!
//! # Type Categories
//!
//! - **Outcomes** - [`CallStatusCode`], the single terminal result of a placement attempt
//! - **Telephony snapshots** - [`ServiceState`], [`DialResult`], [`PhoneType`]
//! - **Call requests** - [`CallIntent`], [`CallAction`], [`CallUri`], [`DialRequest`]

use serde::{Deserialize, Serialize};
use std::fmt;

/// Terminal outcome of one placement attempt
///
/// Produced exactly once per attempt. Anything other than `Success` is
/// surfaced to the UI through the pending call status slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallStatusCode {
    /// The call was handed to the telephony layer (or recovery is in progress)
    Success,
    /// A voicemail call was requested but no voicemail number is configured
    VoicemailNumberMissing,
    /// The radio is off (airplane mode)
    PowerOff,
    /// Only emergency calls are possible
    EmergencyOnly,
    /// No network registration
    OutOfService,
    /// The intent carried no usable number
    NoPhoneNumberSupplied,
    /// The number was an MMI/USSD code rather than a call
    DialedMmi,
    /// The call could not be placed
    CallFailed,
}

impl CallStatusCode {
    /// Every status code, in declaration order
    pub const ALL: [CallStatusCode; 8] = [
        CallStatusCode::Success,
        CallStatusCode::VoicemailNumberMissing,
        CallStatusCode::PowerOff,
        CallStatusCode::EmergencyOnly,
        CallStatusCode::OutOfService,
        CallStatusCode::NoPhoneNumberSupplied,
        CallStatusCode::DialedMmi,
        CallStatusCode::CallFailed,
    ];

    pub fn is_success(&self) -> bool {
        matches!(self, CallStatusCode::Success)
    }
}

impl fmt::Display for CallStatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallStatusCode::Success => "SUCCESS",
            CallStatusCode::VoicemailNumberMissing => "VOICEMAIL_NUMBER_MISSING",
            CallStatusCode::PowerOff => "POWER_OFF",
            CallStatusCode::EmergencyOnly => "EMERGENCY_ONLY",
            CallStatusCode::OutOfService => "OUT_OF_SERVICE",
            CallStatusCode::NoPhoneNumberSupplied => "NO_PHONE_NUMBER_SUPPLIED",
            CallStatusCode::DialedMmi => "DIALED_MMI",
            CallStatusCode::CallFailed => "CALL_FAILED",
        };
        f.write_str(name)
    }
}

/// Registration/radio state reported by a phone
///
/// `Unknown` carries a raw value the telephony layer should never produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceState {
    InService,
    OutOfService,
    EmergencyOnly,
    PowerOff,
    Unknown(i32),
}

impl ServiceState {
    /// Map the telephony layer's integer encoding
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            0 => ServiceState::InService,
            1 => ServiceState::OutOfService,
            2 => ServiceState::EmergencyOnly,
            3 => ServiceState::PowerOff,
            other => ServiceState::Unknown(other),
        }
    }

    /// Whether the radio is registered well enough to attempt an emergency call
    pub fn can_place_emergency_call(&self) -> bool {
        matches!(self, ServiceState::InService | ServiceState::EmergencyOnly)
    }
}

/// Result of handing a number to the telephony layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DialResult {
    Dialed,
    DialedMmi,
    Failed,
    Unknown(i32),
}

/// Radio technology of a phone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhoneType {
    Gsm,
    Cdma,
    Sip,
}

/// What the caller asked for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallAction {
    /// Regular outgoing call
    Call,
    /// Emergency call
    CallEmergency,
    /// Privileged call; must be resolved to `Call` or `CallEmergency` upstream
    CallPrivileged,
    /// Anything else
    Other(String),
}

/// A `scheme:target` call address (`tel:123`, `sip:bob@example.com`, `voicemail:`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallUri {
    pub scheme: String,
    pub target: String,
}

impl CallUri {
    pub const SCHEME_TEL: &'static str = "tel";
    pub const SCHEME_SIP: &'static str = "sip";
    pub const SCHEME_VOICEMAIL: &'static str = "voicemail";

    pub fn new(scheme: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            target: target.into(),
        }
    }

    /// Parse `scheme:target`; a string without a scheme is treated as `tel:`
    pub fn parse(text: &str) -> Self {
        match text.split_once(':') {
            Some((scheme, target)) if !scheme.is_empty() && !scheme.contains('@') => {
                Self::new(scheme.to_ascii_lowercase(), target)
            }
            _ => Self::new(Self::SCHEME_TEL, text),
        }
    }

    pub fn tel(number: impl Into<String>) -> Self {
        Self::new(Self::SCHEME_TEL, number)
    }

    pub fn voicemail() -> Self {
        Self::new(Self::SCHEME_VOICEMAIL, "")
    }

    pub fn is_voicemail(&self) -> bool {
        self.scheme == Self::SCHEME_VOICEMAIL
    }

    pub fn is_sip(&self) -> bool {
        self.scheme == Self::SCHEME_SIP
    }
}

impl fmt::Display for CallUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scheme, self.target)
    }
}

/// Third-party call provider (gateway) selected for this call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfo {
    /// Human readable provider name
    pub label: String,
    /// Gateway URI the call is routed through
    pub gateway_uri: String,
}

/// Parameters of one outgoing call request
///
/// Built by the intent-parsing layer; call-core never sees platform intents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallIntent {
    pub action: CallAction,
    pub uri: Option<CallUri>,
    /// Number that overrides whatever `uri` resolves to
    pub actual_number_to_dial: Option<String>,
    /// Profile URI of the SIP phone that should carry the call
    pub sip_phone_uri: Option<String>,
    pub provider: Option<ProviderInfo>,
}

impl CallIntent {
    pub fn new(action: CallAction, uri: Option<CallUri>) -> Self {
        Self {
            action,
            uri,
            actual_number_to_dial: None,
            sip_phone_uri: None,
            provider: None,
        }
    }

    /// Regular `tel:` call
    pub fn call(number: impl Into<String>) -> Self {
        Self::new(CallAction::Call, Some(CallUri::tel(number)))
    }

    /// Emergency `tel:` call
    pub fn emergency(number: impl Into<String>) -> Self {
        Self::new(CallAction::CallEmergency, Some(CallUri::tel(number)))
    }

    /// Call to the voicemail service
    pub fn voicemail() -> Self {
        Self::new(CallAction::Call, Some(CallUri::voicemail()))
    }

    pub fn with_actual_number(mut self, number: impl Into<String>) -> Self {
        self.actual_number_to_dial = Some(number.into());
        self
    }

    pub fn with_sip_phone(mut self, profile_uri: impl Into<String>) -> Self {
        self.sip_phone_uri = Some(profile_uri.into());
        self
    }

    pub fn with_provider(mut self, provider: ProviderInfo) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn scheme(&self) -> Option<&str> {
        self.uri.as_ref().map(|u| u.scheme.as_str())
    }
}

/// What is handed to [`Phone::dial`](crate::telephony::Phone::dial)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialRequest {
    pub number: String,
    pub is_emergency: bool,
    pub gateway_uri: Option<String>,
    pub contact_uri: Option<CallUri>,
}
