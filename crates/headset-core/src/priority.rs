//! Connection priorities
//!
//! Priorities are persisted per device through [`PrioritySettings`]. The
//! [`PriorityPolicy`] keeps at most one bonded device at `AUTO_CONNECT`:
//! the device that most recently connected successfully.

use crate::address::DeviceAddress;
use crate::error::{HeadsetError, HeadsetResult};
use crate::types::Priority;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Key-value store of device priorities
pub trait PrioritySettings: Send + Sync {
    /// Stored priority, `UNDEFINED` when nothing is stored
    fn get(&self, device: &DeviceAddress) -> Priority;

    fn set(&self, device: &DeviceAddress, priority: Priority) -> HeadsetResult<()>;

    /// Every bonded device, in a stable order
    fn bonded_devices(&self) -> Vec<DeviceAddress>;
}

/// Volatile store, used in tests and when nothing should be persisted
#[derive(Debug, Default)]
pub struct InMemoryPrioritySettings {
    priorities: DashMap<DeviceAddress, Priority>,
}

impl InMemoryPrioritySettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a bonded device without overwriting its priority
    pub fn bond(&self, device: DeviceAddress) {
        self.priorities.entry(device).or_insert(Priority::UNDEFINED);
    }
}

impl PrioritySettings for InMemoryPrioritySettings {
    fn get(&self, device: &DeviceAddress) -> Priority {
        self.priorities
            .get(device)
            .map(|p| *p)
            .unwrap_or(Priority::UNDEFINED)
    }

    fn set(&self, device: &DeviceAddress, priority: Priority) -> HeadsetResult<()> {
        self.priorities.insert(*device, priority);
        Ok(())
    }

    fn bonded_devices(&self) -> Vec<DeviceAddress> {
        let mut devices: Vec<DeviceAddress> = self.priorities.iter().map(|e| *e.key()).collect();
        devices.sort();
        devices
    }
}

/// Store backed by a JSON object `{"AA:BB:CC:DD:EE:FF": 1000, ...}`,
/// rewritten on every `set`
#[derive(Debug)]
pub struct JsonFilePrioritySettings {
    path: PathBuf,
    priorities: Mutex<BTreeMap<DeviceAddress, Priority>>,
}

impl JsonFilePrioritySettings {
    /// Open the store, starting empty if the file does not exist yet
    pub fn open(path: impl AsRef<Path>) -> HeadsetResult<Self> {
        let path = path.as_ref().to_path_buf();
        let priorities = if path.exists() {
            let text = std::fs::read_to_string(&path)?;
            if text.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&text)?
            }
        } else {
            BTreeMap::new()
        };
        debug!(path = %path.display(), "Opened priority store");
        Ok(Self {
            path,
            priorities: Mutex::new(priorities),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bond(&self, device: DeviceAddress) -> HeadsetResult<()> {
        let mut priorities = self.priorities.lock();
        if priorities.contains_key(&device) {
            return Ok(());
        }
        priorities.insert(device, Priority::UNDEFINED);
        self.flush(&priorities)
    }

    fn flush(&self, priorities: &BTreeMap<DeviceAddress, Priority>) -> HeadsetResult<()> {
        let text = serde_json::to_string_pretty(priorities)?;
        std::fs::write(&self.path, text).map_err(|e| {
            HeadsetError::Store(format!("failed to write {}: {}", self.path.display(), e))
        })
    }
}

impl PrioritySettings for JsonFilePrioritySettings {
    fn get(&self, device: &DeviceAddress) -> Priority {
        self.priorities
            .lock()
            .get(device)
            .copied()
            .unwrap_or(Priority::UNDEFINED)
    }

    fn set(&self, device: &DeviceAddress, priority: Priority) -> HeadsetResult<()> {
        let mut priorities = self.priorities.lock();
        priorities.insert(*device, priority);
        self.flush(&priorities)
    }

    fn bonded_devices(&self) -> Vec<DeviceAddress> {
        self.priorities.lock().keys().copied().collect()
    }
}

/// Maintains the single-AUTO_CONNECT rule on top of a settings store
#[derive(Clone)]
pub struct PriorityPolicy {
    settings: Arc<dyn PrioritySettings>,
}

impl PriorityPolicy {
    pub fn new(settings: Arc<dyn PrioritySettings>) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &Arc<dyn PrioritySettings> {
        &self.settings
    }

    pub fn get(&self, device: &DeviceAddress) -> Priority {
        self.settings.get(device)
    }

    /// Make `device` the auto-connect device, demoting any other holder to ON
    pub fn promote(&self, device: &DeviceAddress) -> HeadsetResult<()> {
        for other in self.settings.bonded_devices() {
            if other != *device && self.settings.get(&other) >= Priority::AUTO_CONNECT {
                debug!(device = %other, "Demoting previous auto-connect device");
                self.settings.set(&other, Priority::ON)?;
            }
        }
        self.settings.set(device, Priority::AUTO_CONNECT)?;
        info!(device = %device, "Device promoted to auto-connect");
        Ok(())
    }

    /// Repair persisted state so at most one of `devices` is AUTO_CONNECT.
    ///
    /// The device with the highest priority keeps AUTO_CONNECT (first in
    /// `devices` order on ties); every other device at or above
    /// AUTO_CONNECT drops to ON. Returns the auto-connect device, if any.
    pub fn normalize(&self, devices: &[DeviceAddress]) -> HeadsetResult<Option<DeviceAddress>> {
        let mut keeper: Option<(DeviceAddress, Priority)> = None;
        for device in devices {
            let priority = self.settings.get(device);
            if priority < Priority::AUTO_CONNECT {
                continue;
            }
            match keeper {
                Some((_, best)) if best >= priority => {}
                _ => keeper = Some((*device, priority)),
            }
        }

        let Some((keep, priority)) = keeper else {
            return Ok(None);
        };

        for device in devices {
            if *device != keep && self.settings.get(device) >= Priority::AUTO_CONNECT {
                warn!(device = %device, keep = %keep, "Found extra auto-connect device, demoting");
                self.settings.set(device, Priority::ON)?;
            }
        }
        if priority != Priority::AUTO_CONNECT {
            self.settings.set(&keep, Priority::AUTO_CONNECT)?;
        }
        Ok(Some(keep))
    }

    /// Number of `devices` currently at AUTO_CONNECT or above
    pub fn auto_connect_count(&self, devices: &[DeviceAddress]) -> usize {
        devices
            .iter()
            .filter(|d| self.settings.get(d) >= Priority::AUTO_CONNECT)
            .count()
    }
}
