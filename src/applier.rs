//! Per-monitor application of ambient light levels.
//!
//! Takes a light-level percentage, resolves each attached display to a
//! configured profile, maps the percentage through the profile's curves, and
//! writes brightness and contrast to the device, skipping writes whose value
//! has not changed since the last cycle.

use std::{fmt, sync::Arc};

use anyhow::{Context, Result, bail};
use dashmap::DashMap;
use log::{debug, error, info};

use crate::{
    config_store::{ConfigStore, MonitorProfile},
    light_curve::ValueRange,
    monitor::{MonitorBus, MonitorHandle},
};

/// Monitor control addressed by the applier.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum Control {
    Brightness,
    Contrast,
}

impl Control {
    fn range_of(self, profile: &MonitorProfile) -> &ValueRange {
        match self {
            Control::Brightness => &profile.brightness,
            Control::Contrast => &profile.contrast,
        }
    }

    fn write_to(self, handle: &mut dyn MonitorHandle, value: u16) -> Result<()> {
        match self {
            Control::Brightness => handle.set_brightness(value),
            Control::Contrast => handle.set_contrast(value),
        }
    }
}

impl fmt::Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Control::Brightness => write!(f, "brightness"),
            Control::Contrast => write!(f, "contrast"),
        }
    }
}

/// Applies light-level updates to every attached display.
///
/// Only one task drives `apply` at a time (the ingress service), so the
/// displays themselves need no locking; the debounce cache uses DashMap
/// because the applier is shared behind an `Arc`.
pub struct MonitorApplier {
    bus: Box<dyn MonitorBus>,
    store: Arc<ConfigStore>,
    last_applied: DashMap<(usize, Control), u16>,
}

impl MonitorApplier {
    pub fn new(bus: Box<dyn MonitorBus>, store: Arc<ConfigStore>) -> Self {
        Self {
            bus,
            store,
            last_applied: DashMap::new(),
        }
    }

    /// Applies `percent` to all attached displays.
    ///
    /// Enumeration failure aborts the whole cycle and propagates; the caller
    /// retries naturally with the next inbound update. Failures on a single
    /// display are logged and do not stop the remaining displays. Exactly
    /// one profile snapshot is used for the whole cycle, so a concurrent
    /// reload can never mix old and new profiles within one apply.
    pub async fn apply(&self, percent: i32) -> Result<()> {
        let mut monitors = self
            .bus
            .open_monitors()
            .context("display enumeration failed")?;

        if monitors.is_empty() {
            debug!("No displays attached, nothing to apply");
            return Ok(());
        }

        let profiles = self.store.snapshot().await;
        if profiles.is_empty() {
            bail!("no monitor profiles loaded");
        }

        for (idx, handle) in monitors.iter_mut().enumerate() {
            // Excess monitors degrade to the last configured profile.
            let profile = &profiles[idx.min(profiles.len() - 1)];

            for control in [Control::Brightness, Control::Contrast] {
                self.apply_control(idx, handle.as_mut(), profile, control, percent);
            }
        }

        Ok(())
    }

    fn apply_control(
        &self,
        idx: usize,
        handle: &mut dyn MonitorHandle,
        profile: &MonitorProfile,
        control: Control,
        percent: i32,
    ) {
        let target = match control.range_of(profile).map_level(percent) {
            Ok(value) => value,
            Err(e) => {
                error!(
                    "Cannot map {percent}% to {control} for '{}': {e}",
                    profile.name
                );
                return;
            }
        };

        let key = (idx, control);
        if self.last_applied.get(&key).map(|v| *v) == Some(target) {
            debug!("{control} of {} already at {target}, skipping", handle.id());
            return;
        }

        match control.write_to(handle, target) {
            Ok(()) => {
                // Cache only confirmed writes so a failed device retries
                // on the next update instead of being debounced away.
                self.last_applied.insert(key, target);
                info!(
                    "{control} of {} set to {target} ({percent}%, profile '{}')",
                    handle.id(),
                    profile.name
                );
            }
            Err(e) => {
                error!(
                    "Failed to set {control} to {target} on {}: {e}",
                    handle.id()
                );
            }
        }
    }
}
