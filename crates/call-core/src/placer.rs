//! Outgoing call placement
//!
//! [`CallController`] decides whether and how an outgoing call is dialed and
//! reports exactly one [`CallStatusCode`] per attempt.
//!
//! # Placement sequence
//!
//! ```text
//! place(intent)
//!   ├─ OTASP check (OTASP-capable phones only)
//!   ├─ resolve number ──voicemail missing──▶ service code or VOICEMAIL_NUMBER_MISSING
//!   ├─ no number ─────────────────────────▶ NO_PHONE_NUMBER_SUPPLIED
//!   ├─ emergency flags disagree ──────────▶ CALL_FAILED
//!   ├─ pick phone, evaluate its service state
//!   │     ├─ emergency + POWER_OFF ───────▶ arm radio recovery, SUCCESS
//!   │     └─ other unusable state ────────▶ that code
//!   └─ dial ──▶ SUCCESS / DIALED_MMI / CALL_FAILED
//! ```
//!
//! Placement never blocks. Timers (pseudo-dialing window, recovery timeout)
//! post [`CallControllerEvent`]s that the event loop handles one at a time.

use crate::availability::ServiceAvailability;
use crate::config::{CallConfig, UnknownDialResultPolicy};
use crate::error::{CallError, CallResult};
use crate::events::CallControllerEvent;
use crate::otasp::{check_for_otasp_call, OtaspState};
use crate::recovery::{EmergencyRadioRecovery, RecoveryStep};
use crate::routing::{pick_phone, resolve_number, EmergencyNumberSet, VoicemailNumberMissing};
use crate::telephony::{CallManager, Phone, RadioControl};
use crate::types::{
    CallAction, CallIntent, CallStatusCode, DialRequest, DialResult, PhoneType,
};
use crate::ui_state::{InCallUiState, ProgressIndication};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Default)]
struct TimerSlot {
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

impl TimerSlot {
    fn replace(&mut self, timer: JoinHandle<()>) {
        if let Some(old) = self.timer.replace(timer) {
            old.abort();
        }
    }

    fn cancel(&mut self) {
        if let Some(old) = self.timer.take() {
            old.abort();
        }
    }
}

/// Places outgoing calls and owns the emergency recovery sequence
pub struct CallController {
    config: CallConfig,
    call_manager: Arc<dyn CallManager>,
    radio: Arc<dyn RadioControl>,
    emergency_numbers: EmergencyNumberSet,
    ui_state: Mutex<InCallUiState>,
    otasp: Mutex<OtaspState>,
    recovery: OnceCell<EmergencyRadioRecovery>,
    recovery_timer: Mutex<Option<JoinHandle<()>>>,
    pseudo_dialing: Mutex<TimerSlot>,
    events_tx: mpsc::UnboundedSender<CallControllerEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<CallControllerEvent>>>,
    runtime: Handle,
}

impl CallController {
    /// Build a controller. Must be called from within a tokio runtime.
    pub fn new(
        config: CallConfig,
        call_manager: Arc<dyn CallManager>,
        radio: Arc<dyn RadioControl>,
    ) -> CallResult<Self> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|e| CallError::NoRuntime {
            message: e.to_string(),
        })?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Ok(Self {
            emergency_numbers: EmergencyNumberSet::new(&config.emergency_numbers),
            config,
            call_manager,
            radio,
            ui_state: Mutex::new(InCallUiState::new()),
            otasp: Mutex::new(OtaspState::default()),
            recovery: OnceCell::new(),
            recovery_timer: Mutex::new(None),
            pseudo_dialing: Mutex::new(TimerSlot::default()),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            runtime,
        })
    }

    pub fn config(&self) -> &CallConfig {
        &self.config
    }

    /// Sender for telephony notifications (service state changes)
    pub fn event_sender(&self) -> mpsc::UnboundedSender<CallControllerEvent> {
        self.events_tx.clone()
    }

    /// Start processing queued events. Can be started once.
    pub fn spawn_event_loop(self: &Arc<Self>) -> CallResult<JoinHandle<()>> {
        let mut rx = self
            .events_rx
            .lock()
            .take()
            .ok_or(CallError::EventLoopRunning)?;
        let controller = Arc::clone(self);

        Ok(self.runtime.spawn(async move {
            while let Some(event) = rx.recv().await {
                if !controller.handle_event(event) {
                    break;
                }
            }
            debug!("Call controller event loop stopped");
        }))
    }

    /// Ask the event loop to stop, cancel pending timers and drop an armed
    /// emergency recovery without dialing
    pub fn shutdown(&self) {
        self.pseudo_dialing.lock().cancel();
        if let Some(timer) = self.recovery_timer.lock().take() {
            timer.abort();
        }
        if let Some(recovery) = self.recovery.get() {
            recovery.disarm();
        }
        let _ = self.events_tx.send(CallControllerEvent::Shutdown);
    }

    /// Place an outgoing call.
    ///
    /// Returns the attempt's status code. Any code other than `Success` is
    /// also stored as the pending call status for the UI.
    pub fn place(&self, intent: &CallIntent) -> CallStatusCode {
        match &intent.action {
            CallAction::Call | CallAction::CallEmergency => {}
            CallAction::CallPrivileged => {
                error!("Privileged call intent reached the call controller unresolved");
                return self.fail(CallStatusCode::CallFailed);
            }
            CallAction::Other(action) => {
                error!(action = %action, "Unexpected intent action");
                return self.fail(CallStatusCode::CallFailed);
            }
        }

        let default_phone = self.call_manager.default_phone();
        {
            let mut otasp = self.otasp.lock();
            if default_phone.supports_otasp() {
                check_for_otasp_call(
                    &mut otasp,
                    intent,
                    default_phone.as_ref(),
                    &self.config.otasp_prefixes,
                );
            } else {
                otasp.clear();
            }
        }

        self.ui_state.lock().provider = intent.provider.clone();

        let status = self.place_internal(intent);
        info!(%status, action = ?intent.action, "Outgoing call placement finished");

        if status.is_success() {
            self.ui_state.lock().clear_pending_call_status();
            status
        } else {
            self.fail(status)
        }
    }

    fn fail(&self, status: CallStatusCode) -> CallStatusCode {
        let mut ui = self.ui_state.lock();
        ui.set_pending_call_status(status);
        status
    }

    fn place_internal(&self, intent: &CallIntent) -> CallStatusCode {
        let default_phone = self.call_manager.default_phone();
        let initial_status = ServiceAvailability::evaluate_plain(self.call_manager.service_state());

        let number = match resolve_number(intent, default_phone.as_ref()) {
            Ok(number) => number,
            Err(VoicemailNumberMissing) => {
                if !initial_status.is_success() {
                    return initial_status;
                }
                return CallStatusCode::VoicemailNumberMissing;
            }
        };
        let Some(number) = number else {
            return CallStatusCode::NoPhoneNumberSupplied;
        };

        let is_emergency_number = self.emergency_numbers.is_emergency_number(&number);
        let is_emergency_intent = intent.action == CallAction::CallEmergency;
        if is_emergency_number != is_emergency_intent {
            warn!(
                number = %number,
                is_emergency_number,
                is_emergency_intent,
                "Emergency number/intent mismatch, refusing to dial"
            );
            return CallStatusCode::CallFailed;
        }

        let phone = pick_phone(self.call_manager.as_ref(), intent, &number);
        let status = ServiceAvailability::evaluate(
            phone.service_state(),
            is_emergency_number,
            is_emergency_intent,
        );
        if !status.is_success() {
            if is_emergency_number && status == CallStatusCode::PowerOff {
                self.start_emergency_recovery(&number);
                return CallStatusCode::Success;
            }
            debug!(phone = phone.name(), %status, "Phone cannot place calls");
            return status;
        }

        let was_in_ecm = phone.is_in_ecm();
        let adding_second_line = phone.phone_type() == PhoneType::Cdma && phone.has_active_call();
        let request = DialRequest {
            number: number.clone(),
            is_emergency: is_emergency_number || is_emergency_intent,
            gateway_uri: intent.provider.as_ref().map(|p| p.gateway_uri.clone()),
            contact_uri: intent.uri.clone(),
        };

        match phone.dial(&request) {
            DialResult::Dialed => {
                let voicemail = intent.uri.as_ref().map_or(false, |u| u.is_voicemail());
                self.on_call_dialed(voicemail, was_in_ecm && !is_emergency_number, adding_second_line);
                CallStatusCode::Success
            }
            DialResult::DialedMmi => {
                info!(phone = phone.name(), "Dialed an MMI code");
                CallStatusCode::DialedMmi
            }
            DialResult::Failed => CallStatusCode::CallFailed,
            DialResult::Unknown(raw) => {
                error!(raw, phone = phone.name(), "Unexpected dial result");
                match self.config.unknown_dial_result_policy {
                    UnknownDialResultPolicy::Permissive => CallStatusCode::Success,
                    UnknownDialResultPolicy::FailClosed => CallStatusCode::CallFailed,
                }
            }
        }
    }

    /// Per-call UI reset after a regular (non-MMI) call was dialed
    fn on_call_dialed(&self, show_dialpad: bool, exited_ecm: bool, adding_second_line: bool) {
        {
            let mut ui = self.ui_state.lock();
            ui.reset_for_new_call(show_dialpad);
            if exited_ecm {
                info!("Outgoing call exits emergency callback mode");
                ui.exited_ecm = true;
            }
        }

        if adding_second_line {
            self.start_pseudo_dialing_window();
        }
    }

    fn start_pseudo_dialing_window(&self) {
        let mut slot = self.pseudo_dialing.lock();
        slot.generation += 1;
        let generation = slot.generation;
        self.ui_state.lock().pseudo_dialing = true;

        let tx = self.events_tx.clone();
        let window = self.config.pseudo_dialing_window;
        slot.replace(self.runtime.spawn(async move {
            tokio::time::sleep(window).await;
            let _ = tx.send(CallControllerEvent::PseudoDialingDone { generation });
        }));
        debug!(generation, ?window, "Pseudo-dialing window started");
    }

    fn emergency_recovery(&self) -> &EmergencyRadioRecovery {
        self.recovery
            .get_or_init(|| EmergencyRadioRecovery::new(Arc::clone(&self.radio)))
    }

    fn start_emergency_recovery(&self, number: &str) {
        let Some(generation) = self.emergency_recovery().start_recovery(number) else {
            return;
        };
        self.ui_state.lock().progress = Some(ProgressIndication::TurningOnRadio);

        let tx = self.events_tx.clone();
        let timeout = self.config.emergency_registration_timeout;
        let timer = self.runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = tx.send(CallControllerEvent::RecoveryTimeout { generation });
        });
        if let Some(old) = self.recovery_timer.lock().replace(timer) {
            old.abort();
        }
    }

    /// Handle one event. Returns `false` when the loop should stop.
    pub fn handle_event(&self, event: CallControllerEvent) -> bool {
        match event {
            CallControllerEvent::ServiceStateChanged(state) => {
                if let Some(recovery) = self.recovery.get() {
                    let step = recovery.on_service_state_changed(state);
                    self.apply_recovery_step(step);
                }
            }
            CallControllerEvent::RecoveryTimeout { generation } => {
                if let Some(recovery) = self.recovery.get() {
                    let step = recovery.on_timeout(generation, self.call_manager.service_state());
                    self.apply_recovery_step(step);
                }
            }
            CallControllerEvent::PseudoDialingDone { generation } => {
                let mut slot = self.pseudo_dialing.lock();
                if slot.generation == generation {
                    slot.timer = None;
                    self.ui_state.lock().pseudo_dialing = false;
                    debug!(generation, "Pseudo-dialing window elapsed");
                }
            }
            CallControllerEvent::Shutdown => return false,
        }
        true
    }

    fn apply_recovery_step(&self, step: RecoveryStep) {
        match step {
            RecoveryStep::Ignore => {}
            RecoveryStep::Dial(number) => {
                if let Some(timer) = self.recovery_timer.lock().take() {
                    timer.abort();
                }
                self.dial_recovered_emergency_call(&number);
            }
            RecoveryStep::GiveUp(number) => {
                warn!(number = %number, "Emergency call abandoned, radio did not come up");
                let mut ui = self.ui_state.lock();
                ui.progress = None;
                ui.set_pending_call_status(CallStatusCode::CallFailed);
            }
        }
    }

    fn dial_recovered_emergency_call(&self, number: &str) {
        self.ui_state.lock().progress = Some(ProgressIndication::Retrying);
        let phone = self.call_manager.default_phone();
        let request = DialRequest {
            number: number.to_string(),
            is_emergency: true,
            gateway_uri: None,
            contact_uri: None,
        };
        let adding_second_line = phone.phone_type() == PhoneType::Cdma && phone.has_active_call();
        let result = phone.dial(&request);

        {
            let mut ui = self.ui_state.lock();
            ui.progress = None;
            match result {
                DialResult::Dialed | DialResult::DialedMmi => ui.clear_pending_call_status(),
                DialResult::Failed | DialResult::Unknown(_) => {
                    error!(number, ?result, "Emergency call failed after radio recovery");
                    ui.set_pending_call_status(CallStatusCode::CallFailed);
                    return;
                }
            }
        }
        info!(number, phone = phone.name(), "Emergency call placed after radio recovery");
        if result == DialResult::Dialed {
            self.on_call_dialed(false, false, adding_second_line);
        }
    }

    /// Read and clear the status the UI should react to
    pub fn take_pending_call_status(&self) -> Option<CallStatusCode> {
        self.ui_state.lock().take_pending_call_status()
    }

    /// Snapshot of the UI-visible state
    pub fn ui_state(&self) -> InCallUiState {
        self.ui_state.lock().clone()
    }

    pub fn otasp_state(&self) -> OtaspState {
        self.otasp.lock().clone()
    }

    pub fn is_recovery_armed(&self) -> bool {
        self.recovery.get().map_or(false, |r| r.is_armed())
    }

    /// Number of emergency recovery sequences armed so far
    pub fn recovery_sequences_started(&self) -> u64 {
        self.recovery.get().map_or(0, |r| r.sequences_started())
    }
}

impl Drop for CallController {
    fn drop(&mut self) {
        self.pseudo_dialing.get_mut().cancel();
        if let Some(timer) = self.recovery_timer.get_mut().take() {
            timer.abort();
        }
    }
}
