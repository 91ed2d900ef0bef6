//! Composition root
//!
//! [`PhoneApp`] builds the call controller and the headset service from one
//! [`PhoneConfig`] and the platform collaborators in [`PhoneDeps`], owns
//! their event loops and tears both down together.

use crate::config::PhoneConfig;
use anyhow::{bail, Context, Result};
use parking_lot::Mutex;
use rphone_call_core::telephony::{CallManager, RadioControl};
use rphone_call_core::CallController;
use rphone_headset_core::transport::{RfcommTransport, SdpClient};
use rphone_headset_core::{HeadsetService, PrioritySettings};
use rphone_infra_common::logging::{log_welcome, setup_logging};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Platform collaborators both machines depend on
#[derive(Clone)]
pub struct PhoneDeps {
    pub call_manager: Arc<dyn CallManager>,
    pub radio: Arc<dyn RadioControl>,
    pub rfcomm: Arc<dyn RfcommTransport>,
    pub sdp: Arc<dyn SdpClient>,
    pub priorities: Arc<dyn PrioritySettings>,
}

struct LoopHandle {
    name: &'static str,
    handle: JoinHandle<()>,
}

pub struct PhoneApp {
    config: PhoneConfig,
    calls: Arc<CallController>,
    headset: Arc<HeadsetService>,
    loops: Mutex<Vec<LoopHandle>>,
}

impl PhoneApp {
    /// Build both components. Must be called from within a tokio runtime.
    pub fn new(config: PhoneConfig, deps: PhoneDeps) -> Result<Self> {
        config.validate()?;
        let calls = CallController::new(config.call.clone(), deps.call_manager, deps.radio)
            .context("failed to create call controller")?;
        let headset = HeadsetService::new(
            config.headset.clone(),
            deps.rfcomm,
            deps.sdp,
            deps.priorities,
        )
        .context("failed to create headset service")?;

        Ok(Self {
            config,
            calls: Arc::new(calls),
            headset: Arc::new(headset),
            loops: Mutex::new(Vec::new()),
        })
    }

    /// Install the global tracing subscriber described by the config
    pub fn install_logging(&self) -> Result<()> {
        setup_logging(&self.config.logging).context("failed to install logging")?;
        log_welcome(&self.config.logging.app_name, env!("CARGO_PKG_VERSION"));
        Ok(())
    }

    pub fn config(&self) -> &PhoneConfig {
        &self.config
    }

    pub fn calls(&self) -> &Arc<CallController> {
        &self.calls
    }

    pub fn headset(&self) -> &Arc<HeadsetService> {
        &self.headset
    }

    /// Start both event loops
    pub fn start(&self) -> Result<()> {
        let mut loops = self.loops.lock();
        if !loops.is_empty() {
            bail!("phone core already started");
        }

        let calls = self
            .calls
            .spawn_event_loop()
            .context("failed to start call controller loop")?;
        loops.push(LoopHandle {
            name: "call-controller",
            handle: calls,
        });

        let headset = self
            .headset
            .spawn_event_loop()
            .context("failed to start headset service loop")?;
        loops.push(LoopHandle {
            name: "headset-service",
            handle: headset,
        });

        info!("Phone core started");
        Ok(())
    }

    /// Adapter came up: repair priorities and reconnect the auto-connect headset
    pub fn on_adapter_enabled(&self) -> Result<()> {
        match self.headset.on_adapter_enabled()? {
            Some(device) => info!(device = %device, "Reconnecting auto-connect headset"),
            None => debug!("No headset to reconnect"),
        }
        Ok(())
    }

    /// Stop both components and wait up to `timeout` for their loops
    pub async fn shutdown(&self, timeout: Duration) -> Result<()> {
        self.headset.shutdown();
        self.calls.shutdown();

        let loops: Vec<LoopHandle> = self.loops.lock().drain(..).collect();
        let deadline = tokio::time::Instant::now() + timeout;
        for LoopHandle { name, handle } in loops {
            match tokio::time::timeout_at(deadline, handle).await {
                Ok(Ok(())) => debug!(task = name, "Event loop stopped"),
                Ok(Err(e)) => warn!(task = name, error = %e, "Event loop ended abnormally"),
                Err(_) => bail!("timed out waiting for the {} loop to stop", name),
            }
        }

        info!("Phone core shut down");
        Ok(())
    }
}
