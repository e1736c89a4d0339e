//! Atomically swappable monitor profile snapshots.
//!
//! The apply path reads profiles many times a minute while the reload path
//! replaces them rarely; the store hands out immutable `Arc` snapshots so a
//! reload never tears or blocks an apply that is already in flight.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::{
    config::{Config, MonitorCfg},
    light_curve::ValueRange,
};

/// Resolved control profile for one physical monitor.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorProfile {
    /// Display label, informational only.
    pub name: String,
    pub brightness: ValueRange,
    pub contrast: ValueRange,
}

impl From<&MonitorCfg> for MonitorProfile {
    fn from(cfg: &MonitorCfg) -> Self {
        Self {
            name: cfg.name.clone(),
            brightness: cfg.brightness,
            contrast: cfg.contrast,
        }
    }
}

/// Holds the current ordered list of monitor profiles.
///
/// Readers take a snapshot once per apply cycle and keep using it even if a
/// reload swaps in a replacement mid-cycle; the lock guards only the pointer
/// exchange, never the read of an already obtained snapshot.
#[derive(Debug)]
pub struct ConfigStore {
    profiles: RwLock<Arc<Vec<MonitorProfile>>>,
}

impl ConfigStore {
    /// Builds the store from a validated configuration.
    ///
    /// Config validation guarantees the profile list is non-empty.
    pub fn from_config(config: &Config) -> Self {
        Self {
            profiles: RwLock::new(Arc::new(Self::profiles_of(config))),
        }
    }

    /// Returns the current snapshot.
    ///
    /// The returned value is immutable and stays valid across any number of
    /// subsequent `replace` calls.
    pub async fn snapshot(&self) -> Arc<Vec<MonitorProfile>> {
        self.profiles.read().await.clone()
    }

    /// Atomically swaps in a new snapshot built from `config`.
    ///
    /// Visible to all subsequent `snapshot` calls; previously returned
    /// snapshots are unaffected.
    pub async fn replace(&self, config: &Config) {
        let next = Arc::new(Self::profiles_of(config));
        *self.profiles.write().await = next;
    }

    fn profiles_of(config: &Config) -> Vec<MonitorProfile> {
        config.monitors.iter().map(MonitorProfile::from).collect()
    }
}
