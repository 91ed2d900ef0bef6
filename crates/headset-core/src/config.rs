//! Headset service configuration

use crate::error::{HeadsetError, HeadsetResult};
use rphone_infra_common::config::duration_ms;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timing of the outgoing connect worker
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadsetConfig {
    /// Length of one connect poll slice
    #[serde(rename = "poll_slice_ms", with = "duration_ms")]
    pub poll_slice: Duration,

    /// Number of slices before an attempt counts as timed out
    pub max_poll_slices: u32,

    /// Pause before the single same-channel retry
    #[serde(rename = "retry_delay_ms", with = "duration_ms")]
    pub retry_delay: Duration,

    /// Capacity of the notification broadcast channel
    pub event_capacity: usize,
}

impl Default for HeadsetConfig {
    fn default() -> Self {
        Self {
            poll_slice: Duration::from_millis(500),
            max_poll_slices: 40,
            retry_delay: Duration::from_secs(1),
            event_capacity: 64,
        }
    }
}

impl HeadsetConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_poll_slice(mut self, slice: Duration) -> Self {
        self.poll_slice = slice;
        self
    }

    pub fn with_max_poll_slices(mut self, slices: u32) -> Self {
        self.max_poll_slices = slices;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Upper bound of a single connect attempt
    pub fn attempt_ceiling(&self) -> Duration {
        self.poll_slice * self.max_poll_slices
    }

    pub fn validate(&self) -> HeadsetResult<()> {
        if self.poll_slice.is_zero() {
            return Err(HeadsetError::invalid_config("poll_slice", "must be non-zero"));
        }
        if self.max_poll_slices == 0 {
            return Err(HeadsetError::invalid_config("max_poll_slices", "must be at least 1"));
        }
        if self.event_capacity == 0 {
            return Err(HeadsetError::invalid_config("event_capacity", "must be at least 1"));
        }
        Ok(())
    }
}
