//! Number resolution and phone selection

use crate::telephony::{CallManager, Phone};
use crate::types::CallIntent;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// The intent asked for voicemail but the phone has no voicemail number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoicemailNumberMissing;

/// Work out the number to dial.
///
/// An explicit "actual number to dial" wins over the URI. `Ok(None)` means
/// the intent carried nothing dialable.
pub fn resolve_number(
    intent: &CallIntent,
    phone: &dyn Phone,
) -> Result<Option<String>, VoicemailNumberMissing> {
    if let Some(number) = intent.actual_number_to_dial.as_deref() {
        if !number.trim().is_empty() {
            return Ok(Some(number.trim().to_string()));
        }
    }

    let Some(uri) = intent.uri.as_ref() else {
        return Ok(None);
    };

    if uri.is_voicemail() {
        return match phone.voicemail_number() {
            Some(number) if !number.trim().is_empty() => Ok(Some(number)),
            _ => Err(VoicemailNumberMissing),
        };
    }

    let target = uri.target.trim();
    if target.is_empty() {
        Ok(None)
    } else {
        Ok(Some(target.to_string()))
    }
}

/// Whether `number` looks like a SIP address rather than a phone number
pub fn is_sip_address(number: &str) -> bool {
    number.contains('@')
}

/// Choose the phone that carries the call.
///
/// An explicit SIP profile hint selects the SIP phone with that profile URI.
/// A `sip:` URI or SIP-looking number selects the first SIP phone. Everything
/// else, and any hint that matches nothing, falls back to the default phone.
pub fn pick_phone(cm: &dyn CallManager, intent: &CallIntent, number: &str) -> Arc<dyn Phone> {
    let sip_phones = cm.sip_phones();

    if let Some(profile_uri) = intent.sip_phone_uri.as_deref() {
        if let Some(phone) = sip_phones
            .iter()
            .find(|p| p.sip_profile_uri().as_deref() == Some(profile_uri))
        {
            debug!(phone = phone.name(), profile_uri, "Selected SIP phone by profile");
            return phone.clone();
        }
        debug!(profile_uri, "No SIP phone for profile, using default phone");
    }

    let wants_sip = intent.uri.as_ref().map_or(false, |u| u.is_sip()) || is_sip_address(number);
    if wants_sip {
        if let Some(phone) = sip_phones.first() {
            return phone.clone();
        }
    }

    cm.default_phone()
}

/// Locally known emergency numbers
#[derive(Debug, Clone, Default)]
pub struct EmergencyNumberSet {
    numbers: HashSet<String>,
}

impl EmergencyNumberSet {
    pub fn new<I, S>(numbers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            numbers: numbers.into_iter().map(|n| normalize(n.as_ref())).collect(),
        }
    }

    /// Exact match after stripping visual separators. SIP addresses never match.
    pub fn is_emergency_number(&self, number: &str) -> bool {
        if is_sip_address(number) {
            return false;
        }
        self.numbers.contains(&normalize(number))
    }
}

fn normalize(number: &str) -> String {
    number
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '.'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emergency_numbers_ignore_separators() {
        let set = EmergencyNumberSet::new(["911", "112"]);
        assert!(set.is_emergency_number("911"));
        assert!(set.is_emergency_number("9-1-1"));
        assert!(!set.is_emergency_number("9110"));
        assert!(!set.is_emergency_number("911@example.com"));
    }
}
