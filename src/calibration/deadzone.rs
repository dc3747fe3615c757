//! # Deadzone Centering
//!
//! Nudges a sampled stick center toward the true midpoint.
//!
//! Sticks often rest a few counts off 128 because of mechanical bias. Before
//! a sampled center is written back, the axis byte is moved toward 128 by up
//! to the configured offset, clamped to the byte range:
//!
//! - `v > 128`: `max(v - offset, 0)`
//! - `v < 128`: `min(v + offset, 255)`
//! - `v == 128`: unchanged
//!
//! ## Usage
//!
//! ```
//! use dualsense_calibrator::calibration::deadzone::DeadzoneOffset;
//!
//! let offset = DeadzoneOffset::new(5)?;
//! assert_eq!(offset.center_axis(130), 125);
//! assert_eq!(offset.center_axis(128), 128);
//! assert_eq!(offset.visual_radius(), 10);
//! # Ok::<(), dualsense_calibrator::error::CalibrationError>(())
//! ```

use crate::error::{CalibrationError, Result};
use crate::hid::protocol::AXIS_CENTER;

/// Largest accepted offset
pub const MAX_DEADZONE_OFFSET: u8 = 20;

/// Offset used when nothing is configured
pub const DEFAULT_DEADZONE_OFFSET: u8 = 5;

/// Deadzone offset in `0..=20`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeadzoneOffset(u8);

impl Default for DeadzoneOffset {
    fn default() -> Self {
        Self(DEFAULT_DEADZONE_OFFSET)
    }
}

impl DeadzoneOffset {
    /// Validate an offset
    ///
    /// # Errors
    ///
    /// Returns `InvalidDeadzoneOffset` above [`MAX_DEADZONE_OFFSET`]
    pub fn new(offset: u8) -> Result<Self> {
        if offset > MAX_DEADZONE_OFFSET {
            return Err(CalibrationError::InvalidDeadzoneOffset(offset));
        }
        Ok(Self(offset))
    }

    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Radius of the deadzone circle drawn by a visualizer, in pixels
    #[must_use]
    pub const fn visual_radius(self) -> u32 {
        self.0 as u32 * 2
    }

    /// Apply the centering adjustment to one raw axis byte
    #[must_use]
    pub fn center_axis(self, value: u8) -> u8 {
        center_axis(value, self.0)
    }
}

impl TryFrom<u8> for DeadzoneOffset {
    type Error = CalibrationError;

    fn try_from(value: u8) -> Result<Self> {
        Self::new(value)
    }
}

impl std::fmt::Display for DeadzoneOffset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Move `value` toward [`AXIS_CENTER`] by `offset`, clamped to `0..=255`
#[inline]
#[must_use]
pub fn center_axis(value: u8, offset: u8) -> u8 {
    match value.cmp(&AXIS_CENTER) {
        std::cmp::Ordering::Greater => value.saturating_sub(offset),
        std::cmp::Ordering::Less => value.saturating_add(offset),
        std::cmp::Ordering::Equal => value,
    }
}
