//! Call controller configuration
//!
//! ```rust
//! use rphone_call_core::config::{CallConfig, UnknownDialResultPolicy};
//! use std::time::Duration;
//!
//! let config = CallConfig::default()
//!     .with_pseudo_dialing_window(Duration::from_secs(2))
//!     .with_unknown_dial_result_policy(UnknownDialResultPolicy::FailClosed);
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.pseudo_dialing_window, Duration::from_secs(2));
//! ```

use crate::error::{CallError, CallResult};
use rphone_infra_common::config::duration_ms;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How to treat a dial result the telephony layer should never return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownDialResultPolicy {
    /// Log the anomaly and report `Success`
    Permissive,
    /// Log the anomaly and report `CallFailed`
    FailClosed,
}

impl Default for UnknownDialResultPolicy {
    fn default() -> Self {
        UnknownDialResultPolicy::Permissive
    }
}

/// Configuration for [`CallController`](crate::placer::CallController)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CallConfig {
    /// How long the "dialing" display is held for a CDMA second-line call
    #[serde(rename = "pseudo_dialing_window_ms", with = "duration_ms")]
    pub pseudo_dialing_window: Duration,

    /// How long emergency recovery waits for the radio to register
    #[serde(rename = "emergency_registration_timeout_ms", with = "duration_ms")]
    pub emergency_registration_timeout: Duration,

    /// Numbers treated as emergency numbers (exact match, separators ignored)
    pub emergency_numbers: Vec<String>,

    /// Dial-string prefixes that start an OTASP activation call
    pub otasp_prefixes: Vec<String>,

    pub unknown_dial_result_policy: UnknownDialResultPolicy,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            pseudo_dialing_window: Duration::from_millis(3000),
            emergency_registration_timeout: Duration::from_secs(30),
            emergency_numbers: vec!["112".to_string(), "911".to_string()],
            otasp_prefixes: vec!["*228".to_string()],
            unknown_dial_result_policy: UnknownDialResultPolicy::Permissive,
        }
    }
}

impl CallConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pseudo_dialing_window(mut self, window: Duration) -> Self {
        self.pseudo_dialing_window = window;
        self
    }

    pub fn with_emergency_registration_timeout(mut self, timeout: Duration) -> Self {
        self.emergency_registration_timeout = timeout;
        self
    }

    pub fn with_emergency_numbers<I, S>(mut self, numbers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.emergency_numbers = numbers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_unknown_dial_result_policy(mut self, policy: UnknownDialResultPolicy) -> Self {
        self.unknown_dial_result_policy = policy;
        self
    }

    /// Reject values the controller cannot work with
    pub fn validate(&self) -> CallResult<()> {
        if self.pseudo_dialing_window.is_zero() {
            return Err(CallError::invalid_config("pseudo_dialing_window", "must be non-zero"));
        }
        if self.emergency_registration_timeout.is_zero() {
            return Err(CallError::invalid_config(
                "emergency_registration_timeout",
                "must be non-zero",
            ));
        }
        if self.emergency_numbers.iter().any(|n| n.trim().is_empty()) {
            return Err(CallError::invalid_config("emergency_numbers", "entries must not be empty"));
        }
        if self.otasp_prefixes.iter().any(|p| p.is_empty()) {
            return Err(CallError::invalid_config("otasp_prefixes", "entries must not be empty"));
        }
        Ok(())
    }
}
