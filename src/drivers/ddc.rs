//! DDC/CI backend for the monitor control channel.
//!
//! Talks to attached displays through the `ddc-hi` crate. Brightness and
//! contrast map to the VESA MCCS luminance and contrast VCP features.

use anyhow::{Result, anyhow};
use ddc_hi::{Ddc, Display};

use crate::monitor::{MonitorBus, MonitorHandle};

const VCP_LUMINANCE: u8 = 0x10;
const VCP_CONTRAST: u8 = 0x12;

/// Enumerates and opens displays over DDC/CI.
///
/// A fresh enumeration happens on every call so hot-plugged or removed
/// displays are picked up on the next apply cycle; handles are released
/// when the cycle drops them.
pub struct DdcBus;

impl MonitorBus for DdcBus {
    fn open_monitors(&self) -> Result<Vec<Box<dyn MonitorHandle>>> {
        Ok(Display::enumerate()
            .into_iter()
            .map(|display| Box::new(DdcMonitor { display }) as Box<dyn MonitorHandle>)
            .collect())
    }
}

struct DdcMonitor {
    display: Display,
}

impl MonitorHandle for DdcMonitor {
    fn id(&self) -> String {
        self.display
            .info
            .model_name
            .clone()
            .unwrap_or_else(|| self.display.info.id.clone())
    }

    fn set_brightness(&mut self, value: u16) -> Result<()> {
        self.display
            .handle
            .set_vcp_feature(VCP_LUMINANCE, value)
            .map_err(|e| anyhow!("set luminance on {}: {:?}", self.display.info.id, e))
    }

    fn set_contrast(&mut self, value: u16) -> Result<()> {
        self.display
            .handle
            .set_vcp_feature(VCP_CONTRAST, value)
            .map_err(|e| anyhow!("set contrast on {}: {:?}", self.display.info.id, e))
    }
}
