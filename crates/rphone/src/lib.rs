//! # rphone
//!
//! Composition root for the phone core. It wires the outgoing call
//! placement machine ([`rphone_call_core`]) and the Bluetooth headset
//! connection machine ([`rphone_headset_core`]) to platform collaborators
//! and runs their event loops.
//!
//! ```rust,no_run
//! use rphone::{PhoneApp, PhoneConfig, PhoneDeps};
//! use std::time::Duration;
//!
//! # async fn run(deps: PhoneDeps) -> anyhow::Result<()> {
//! let config = PhoneConfig::from_file("rphone.toml")?;
//! let app = PhoneApp::new(config, deps)?;
//! app.install_logging()?;
//! app.start()?;
//! app.on_adapter_enabled()?;
//!
//! // ...
//!
//! app.shutdown(Duration::from_secs(5)).await?;
//! # Ok(())
//! # }
//! ```

pub mod app;
pub mod config;

pub use app::{PhoneApp, PhoneDeps};
pub use config::PhoneConfig;

pub use rphone_call_core as call;
pub use rphone_headset_core as headset;
pub use rphone_infra_common as infra;
