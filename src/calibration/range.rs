//! # Stick Min/Max Calibration
//!
//! State machine: `Idle → ModeEntered → AwaitingUserMotion → Committed`.
//!
//! After entering mode the user sweeps both sticks through their full travel.
//! The engine does not sample during that phase; the caller supplies a gate
//! that returns once the user is done. Committing sends `[2, 1, 2]` and the
//! device computes and stores the extents itself. No reply is read.

use tracing::info;

use super::{enter_mode, ModeEntry};
use crate::error::{CalibrationError, Result};
use crate::hid::protocol::{CalibrationTarget, ReportId};
use crate::hid::CommandLink;

/// Progress of a min/max calibration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeState {
    Idle,
    ModeEntered,
    AwaitingUserMotion,
    Committed,
}

/// Stick min/max calibration routine
pub struct RangeCalibration<'l> {
    link: &'l dyn CommandLink,
    target: CalibrationTarget,
    state: RangeState,
}

impl<'l> RangeCalibration<'l> {
    pub fn new(link: &'l dyn CommandLink) -> Self {
        Self {
            link,
            target: CalibrationTarget::RANGE,
            state: RangeState::Idle,
        }
    }

    /// Create the routine and switch the device into min/max calibration mode
    pub fn begin(link: &'l dyn CommandLink) -> Result<Self> {
        let mut calibration = Self::new(link);
        calibration.enter_mode()?;
        Ok(calibration)
    }

    pub fn state(&self) -> RangeState {
        self.state
    }

    /// `Idle → ModeEntered`
    pub fn enter_mode(&mut self) -> Result<ModeEntry> {
        self.expect_state(RangeState::Idle, "enter mode")?;
        let entry = enter_mode(self.link, &self.target)?;
        self.state = RangeState::ModeEntered;
        Ok(entry)
    }

    /// `ModeEntered → AwaitingUserMotion`
    ///
    /// Blocks in `gate` while the user moves the sticks. An error from the
    /// gate leaves the routine in `ModeEntered` and nothing is committed.
    pub fn await_user_motion<F>(&mut self, gate: F) -> Result<()>
    where
        F: FnOnce() -> Result<()>,
    {
        self.expect_state(RangeState::ModeEntered, "await motion")?;
        info!("Waiting for the sticks to be moved through their full range");
        gate()?;
        self.state = RangeState::AwaitingUserMotion;
        Ok(())
    }

    /// `AwaitingUserMotion → Committed`
    pub fn commit(mut self) -> Result<()> {
        self.expect_state(RangeState::AwaitingUserMotion, "commit")?;
        self.link
            .send(ReportId::Calibration, &self.target.commit())?;
        self.state = RangeState::Committed;
        info!("Min/max calibration committed");
        Ok(())
    }

    fn expect_state(&self, expected: RangeState, action: &str) -> Result<()> {
        if self.state == expected {
            return Ok(());
        }
        Err(CalibrationError::Protocol(format!(
            "Cannot {} during range calibration in state {:?}",
            action, self.state
        )))
    }
}
