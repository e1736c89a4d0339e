//! Light-level mapping for ambient brightness control.
//!
//! Converts a 0-100 ambient light percentage into a monitor-specific device
//! value, applying an optional power curve before scaling into the range.

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

/// Device value range for one monitor control.
///
/// Describes the achievable span of a control (brightness or contrast) in
/// native device units and how the normalized input is curved before being
/// scaled into that span.
///
/// # Example
///
/// ```
/// use luxsyncd::light_curve::ValueRange;
///
/// let range = ValueRange { min: 3, max: 100, power: 1.0 };
/// assert_eq!(range.map_level(50).unwrap(), 52);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    /// Lowest device value ever written for this control.
    pub min: u16,

    /// Highest device value ever written for this control.
    pub max: u16,

    /// Shaping exponent applied to the normalized input.
    ///
    /// 1.0 is linear; above 1.0 compresses the low end of the response,
    /// below 1.0 expands it.
    #[serde(default = "defaults::power")]
    pub power: f64,
}

mod defaults {
    pub fn power() -> f64 {
        1.0
    }
}

impl ValueRange {
    /// Maps a light-level percentage to a device value inside this range.
    ///
    /// The input is normalized, shaped with the power curve, scaled into
    /// `[min, max]`, rounded half-away-from-zero, and finally clamped to the
    /// range again. The clamp is what keeps out-of-range inputs safe: values
    /// outside `[0, 100]` are not rejected, they saturate at the bounds.
    ///
    /// A negative percentage combined with a fractional exponent has no
    /// defined curve value and is reported as an error.
    pub fn map_level(&self, percent: i32) -> Result<u16> {
        let normalized = f64::from(percent) / 100.0;
        let curved = normalized.powf(self.power);
        if !curved.is_finite() {
            bail!(
                "light level {percent}% has no defined value under power {}",
                self.power
            );
        }

        let span = f64::from(self.max) - f64::from(self.min);
        let raw = f64::from(self.min) + curved * span;

        let clamped = raw.round().clamp(f64::from(self.min), f64::from(self.max));
        Ok(clamped as u16)
    }
}
