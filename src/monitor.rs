//! Display control abstraction and trait definitions.

use anyhow::Result;

/// Access to the physically attached displays.
///
/// Each call enumerates the displays afresh and opens a handle per display;
/// the handles are dropped at the end of the apply cycle so nothing stays
/// open between cycles. Device sets are not assumed stable between calls.
pub trait MonitorBus: Send + Sync {
    fn open_monitors(&self) -> Result<Vec<Box<dyn MonitorHandle>>>;
}

/// One opened display control channel.
///
/// Values are absolute device units; range mapping happens before the handle
/// is involved.
pub trait MonitorHandle: Send {
    /// Stable-ish identity for logging (model string or bus index).
    fn id(&self) -> String;

    fn set_brightness(&mut self, value: u16) -> Result<()>;

    fn set_contrast(&mut self, value: u16) -> Result<()>;
}
