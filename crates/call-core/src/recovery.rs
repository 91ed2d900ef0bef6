//! Emergency radio recovery
//!
//! Dialing an emergency number while the radio is off does not fail. Instead
//! the radio is powered on and the call is dialed once, either as soon as the
//! phone registers or when the registration budget runs out. The sequence is
//! one-shot: it never loops, and only one sequence can be armed at a time.
//!
//! ```text
//!  start_recovery(number)
//!        │ power_on_radio()
//!        ▼
//!     [armed] ──service state IN_SERVICE/EMERGENCY_ONLY──▶ Dial(number)
//!        │
//!        └──────timeout──▶ radio still off? ──yes──▶ GiveUp
//!                                           └─no───▶ Dial(number)
//! ```

use crate::telephony::RadioControl;
use crate::types::ServiceState;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What the controller should do next for an armed sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryStep {
    /// Dial the emergency number now
    Dial(String),
    /// The radio never came up; report failure for this number
    GiveUp(String),
    /// Nothing to do (not armed, or a stale timer)
    Ignore,
}

#[derive(Debug, Clone)]
struct PendingEmergencyCall {
    number: String,
    generation: u64,
}

#[derive(Debug, Default)]
struct RecoveryInner {
    pending: Option<PendingEmergencyCall>,
    generation: u64,
}

/// Owns the "armed" flag of the power-on-then-dial sequence
pub struct EmergencyRadioRecovery {
    radio: Arc<dyn RadioControl>,
    inner: Mutex<RecoveryInner>,
    sequences_started: AtomicU64,
}

impl EmergencyRadioRecovery {
    pub fn new(radio: Arc<dyn RadioControl>) -> Self {
        Self {
            radio,
            inner: Mutex::new(RecoveryInner::default()),
            sequences_started: AtomicU64::new(0),
        }
    }

    /// Arm the sequence and request radio power-on.
    ///
    /// Returns the generation of the new sequence, or `None` if a sequence is
    /// already armed (the call is then left to the running sequence).
    pub fn start_recovery(&self, number: &str) -> Option<u64> {
        let mut inner = self.inner.lock();
        if let Some(pending) = &inner.pending {
            warn!(
                armed_number = %pending.number,
                number, "Emergency radio recovery already armed, ignoring"
            );
            return None;
        }

        inner.generation += 1;
        let generation = inner.generation;
        inner.pending = Some(PendingEmergencyCall {
            number: number.to_string(),
            generation,
        });
        self.sequences_started.fetch_add(1, Ordering::SeqCst);

        info!(number, generation, "Emergency call with radio off, powering on radio");
        self.radio.power_on_radio();
        Some(generation)
    }

    /// React to a service state change of the default phone
    pub fn on_service_state_changed(&self, state: ServiceState) -> RecoveryStep {
        let mut inner = self.inner.lock();
        if inner.pending.is_none() {
            return RecoveryStep::Ignore;
        }
        if !state.can_place_emergency_call() {
            debug!(?state, "Radio not registered yet");
            return RecoveryStep::Ignore;
        }

        match inner.pending.take() {
            Some(pending) => {
                info!(number = %pending.number, ?state, "Radio registered, dialing emergency call");
                RecoveryStep::Dial(pending.number)
            }
            None => RecoveryStep::Ignore,
        }
    }

    /// The registration budget of sequence `generation` ran out
    pub fn on_timeout(&self, generation: u64, current_state: ServiceState) -> RecoveryStep {
        let mut inner = self.inner.lock();
        let matches = inner
            .pending
            .as_ref()
            .map_or(false, |p| p.generation == generation);
        if !matches {
            return RecoveryStep::Ignore;
        }

        let Some(pending) = inner.pending.take() else {
            return RecoveryStep::Ignore;
        };
        if current_state == ServiceState::PowerOff {
            warn!(number = %pending.number, "Radio still off after recovery timeout");
            RecoveryStep::GiveUp(pending.number)
        } else {
            info!(number = %pending.number, ?current_state, "Recovery timeout, dialing anyway");
            RecoveryStep::Dial(pending.number)
        }
    }

    pub fn is_armed(&self) -> bool {
        self.inner.lock().pending.is_some()
    }

    /// How many sequences were ever armed
    pub fn sequences_started(&self) -> u64 {
        self.sequences_started.load(Ordering::SeqCst)
    }

    /// Drop an armed sequence without dialing
    pub fn disarm(&self) {
        self.inner.lock().pending = None;
    }
}
