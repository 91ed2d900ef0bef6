//! Service availability: may a call be started in the current radio state?

use crate::types::{CallStatusCode, ServiceState};
use tracing::{error, warn};

/// Maps a phone's service state into an admission verdict
pub struct ServiceAvailability;

impl ServiceAvailability {
    /// Evaluate whether an outgoing call may be started.
    ///
    /// The emergency flags must agree; a mismatch is a caller contract
    /// violation and yields `CallFailed` whatever the service state.
    /// Emergency numbers are let through `EmergencyOnly` and `OutOfService`
    /// since the radio may still register opportunistically. `PowerOff` is
    /// returned as-is; the placer decides whether radio recovery applies.
    pub fn evaluate(
        state: ServiceState,
        is_emergency_number: bool,
        is_emergency_intent: bool,
    ) -> CallStatusCode {
        if is_emergency_number != is_emergency_intent {
            warn!(
                is_emergency_number,
                is_emergency_intent, "Emergency number and emergency intent disagree"
            );
            return CallStatusCode::CallFailed;
        }

        match state {
            ServiceState::InService => CallStatusCode::Success,
            ServiceState::PowerOff => CallStatusCode::PowerOff,
            ServiceState::EmergencyOnly if is_emergency_number => CallStatusCode::Success,
            ServiceState::EmergencyOnly => CallStatusCode::EmergencyOnly,
            ServiceState::OutOfService if is_emergency_number => CallStatusCode::Success,
            ServiceState::OutOfService => CallStatusCode::OutOfService,
            ServiceState::Unknown(raw) => {
                error!(raw, "Unexpected service state from telephony layer");
                CallStatusCode::CallFailed
            }
        }
    }

    /// Verdict for a non-emergency dial; used before the number is known
    pub fn evaluate_plain(state: ServiceState) -> CallStatusCode {
        Self::evaluate(state, false, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    const STATES: [ServiceState; 5] = [
        ServiceState::InService,
        ServiceState::OutOfService,
        ServiceState::EmergencyOnly,
        ServiceState::PowerOff,
        ServiceState::Unknown(99),
    ];

    #[test]
    fn plain_calls_follow_service_state() {
        assert_eq!(ServiceAvailability::evaluate_plain(ServiceState::InService), CallStatusCode::Success);
        assert_eq!(ServiceAvailability::evaluate_plain(ServiceState::PowerOff), CallStatusCode::PowerOff);
        assert_eq!(
            ServiceAvailability::evaluate_plain(ServiceState::EmergencyOnly),
            CallStatusCode::EmergencyOnly
        );
        assert_eq!(
            ServiceAvailability::evaluate_plain(ServiceState::OutOfService),
            CallStatusCode::OutOfService
        );
    }

    #[test]
    fn emergency_numbers_override_limited_service() {
        assert_eq!(
            ServiceAvailability::evaluate(ServiceState::EmergencyOnly, true, true),
            CallStatusCode::Success
        );
        assert_eq!(
            ServiceAvailability::evaluate(ServiceState::OutOfService, true, true),
            CallStatusCode::Success
        );
        assert_eq!(
            ServiceAvailability::evaluate(ServiceState::PowerOff, true, true),
            CallStatusCode::PowerOff
        );
    }

    #[test]
    fn flag_mismatch_always_fails() {
        for state in STATES {
            assert_eq!(ServiceAvailability::evaluate(state, true, false), CallStatusCode::CallFailed);
            assert_eq!(ServiceAvailability::evaluate(state, false, true), CallStatusCode::CallFailed);
        }
    }

    #[test]
    fn every_combination_yields_a_known_code() {
        for state in STATES {
            for em_number in [false, true] {
                for em_intent in [false, true] {
                    let code = ServiceAvailability::evaluate(state, em_number, em_intent);
                    assert!(CallStatusCode::ALL.contains(&code));
                }
            }
        }
    }

    #[test]
    #[traced_test]
    fn unknown_state_degrades_to_call_failed() {
        assert_eq!(
            ServiceAvailability::evaluate(ServiceState::Unknown(7), false, false),
            CallStatusCode::CallFailed
        );
        assert!(logs_contain("Unexpected service state from telephony layer"));
    }
}
