//! Top-level configuration
//!
//! ```toml
//! [logging]
//! level = "debug"
//!
//! [call]
//! pseudo_dialing_window_ms = 2000
//! unknown_dial_result_policy = "fail_closed"
//!
//! [headset]
//! poll_slice_ms = 250
//! ```

use anyhow::{Context, Result};
use rphone_call_core::CallConfig;
use rphone_headset_core::HeadsetConfig;
use rphone_infra_common::config::{load_toml, load_toml_file};
use rphone_infra_common::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for the whole phone core
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PhoneConfig {
    pub logging: LoggingConfig,
    pub call: CallConfig,
    pub headset: HeadsetConfig,
}

impl PhoneConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: PhoneConfig = load_toml(text).context("invalid phone configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config: PhoneConfig = load_toml_file(path)
            .with_context(|| format!("failed to load phone configuration from {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        rphone_infra_common::logging::parse_log_level(&self.logging.level)
            .context("logging.level")?;
        self.call.validate().context("call")?;
        self.headset.validate().context("headset")?;
        Ok(())
    }
}
