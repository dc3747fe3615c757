//! # Stick Center Calibration
//!
//! State machine: `Idle → ModeEntered → Sampling → Saved`.
//!
//! 1. Entering mode sends `[1, 1, 1]` and checks (advisory) the acceptance record.
//! 2. Each [`CenterCalibration::sample`] sends `[3, 1, 1]` and returns the raw
//!    reading so the caller can inspect it before committing.
//! 3. [`CenterCalibration::save`] samples once more, applies the deadzone
//!    centering to byte 2 and writes `[2, s0, s1, centered]`.
//!
//! Saving writes the device's active register. It only survives a power cycle
//! when the whole routine ran inside an NVS unlock bracket.

use tracing::{debug, info};

use super::deadzone::DeadzoneOffset;
use super::{enter_mode, ModeEntry};
use crate::error::{CalibrationError, Result};
use crate::hid::protocol::{
    write_back_payload, CalibrationTarget, ReportId, SampleResponse, RESPONSE_LEN,
};
use crate::hid::CommandLink;

/// Progress of a center calibration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CenterState {
    Idle,
    ModeEntered,
    Sampling,
    Saved,
}

/// Outcome of a successful save
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CenterSaved {
    /// Sample taken right before saving
    pub sample: SampleResponse,
    /// Offset applied to the axis byte
    pub offset: DeadzoneOffset,
    /// Payload written on the calibration report
    pub written: [u8; 4],
}

/// Stick center calibration routine
pub struct CenterCalibration<'l> {
    link: &'l dyn CommandLink,
    target: CalibrationTarget,
    state: CenterState,
}

impl<'l> CenterCalibration<'l> {
    /// Create an idle routine
    pub fn new(link: &'l dyn CommandLink) -> Self {
        Self {
            link,
            target: CalibrationTarget::CENTER,
            state: CenterState::Idle,
        }
    }

    /// Create the routine and switch the device into center calibration mode
    pub fn begin(link: &'l dyn CommandLink) -> Result<Self> {
        let mut calibration = Self::new(link);
        calibration.enter_mode()?;
        Ok(calibration)
    }

    pub fn state(&self) -> CenterState {
        self.state
    }

    /// `Idle → ModeEntered`
    pub fn enter_mode(&mut self) -> Result<ModeEntry> {
        if self.state != CenterState::Idle {
            return Err(self.out_of_order("enter mode"));
        }
        let entry = enter_mode(self.link, &self.target)?;
        self.state = CenterState::ModeEntered;
        Ok(entry)
    }

    /// Take a raw sample for inspection. Repeatable.
    pub fn sample(&mut self) -> Result<SampleResponse> {
        self.ensure_mode_entered("sample")?;
        let sample = self.read_sample()?;
        self.state = CenterState::Sampling;
        debug!("Center sample: {:?}", sample.to_bytes());
        Ok(sample)
    }

    /// Re-sample, center the axis byte by `offset` and write it back
    ///
    /// Terminal: consumes the routine.
    pub fn save(mut self, offset: DeadzoneOffset) -> Result<CenterSaved> {
        self.ensure_mode_entered("save")?;
        let sample = self.read_sample()?;

        let mut centered = sample.to_bytes();
        centered[2] = offset.center_axis(sample.axis_low);
        let written = write_back_payload(&centered);

        self.link.send(ReportId::Calibration, &written)?;
        self.state = CenterState::Saved;
        info!(
            "Center calibration saved (axis {} -> {}, offset {})",
            sample.axis_low, centered[2], offset
        );

        Ok(CenterSaved {
            sample,
            offset,
            written,
        })
    }

    fn read_sample(&self) -> Result<SampleResponse> {
        let reply = self
            .link
            .request(ReportId::Calibration, &self.target.sample(), RESPONSE_LEN)?;
        SampleResponse::from_bytes(&reply)
    }

    fn ensure_mode_entered(&self, action: &str) -> Result<()> {
        match self.state {
            CenterState::ModeEntered | CenterState::Sampling => Ok(()),
            _ => Err(self.out_of_order(action)),
        }
    }

    fn out_of_order(&self, action: &str) -> CalibrationError {
        CalibrationError::Protocol(format!(
            "Cannot {} during center calibration in state {:?}",
            action, self.state
        ))
    }
}
