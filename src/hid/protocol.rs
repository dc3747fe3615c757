//! # DualSense Calibration Protocol Constants and Types
//!
//! Core protocol definitions for the stick calibration command channel.
//!
//! Every calibration command travels on report `0x82` and starts with a
//! sub-command byte followed by the device and target IDs:
//!
//! ```text
//! [sub-command, device_id, target_id, value...]
//! ```
//!
//! Writes that should survive a power cycle are bracketed by the NVS
//! unlock/relock commands on report `0x80`.

use crate::error::{CalibrationError, Result};

/// HID output report IDs used by the calibration protocol.
///
/// Kept as a closed enum so the NVS and calibration channels cannot be mixed
/// up at a call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ReportId {
    /// NVS lock/unlock channel
    Nvs = 0x80,
    /// Calibration command/response channel
    Calibration = 0x82,
}

impl ReportId {
    /// Raw report ID byte
    pub const fn id(self) -> u8 {
        self as u8
    }
}

/// Sub-command: enter calibration mode (also used to query state)
pub const CMD_ENTER_MODE: u8 = 1;

/// Sub-command: commit / save a calibration value
pub const CMD_COMMIT: u8 = 2;

/// Sub-command: sample the current raw stick value
pub const CMD_SAMPLE: u8 = 3;

/// NVS unlock code
pub const NVS_UNLOCK_PAYLOAD: [u8; 6] = [3, 2, 101, 50, 64, 12];

/// NVS relock command
pub const NVS_RELOCK_PAYLOAD: [u8; 2] = [3, 1];

/// The analog stick subsystem is always device 1
pub const STICK_DEVICE_ID: u8 = 1;

/// Every calibration response is 4 bytes
pub const RESPONSE_LEN: usize = 4;

/// Status byte reported when the device accepted a mode switch
pub const MODE_ACCEPTED_STATUS: u8 = 1;

/// Flag byte reported when the device accepted a mode switch
pub const MODE_ACCEPTED_FLAG: u8 = 0xFF;

/// Raw axis value of a centered stick
pub const AXIS_CENTER: u8 = 128;

/// Raw 4-byte record as returned by the device
pub type RawRecord = [u8; RESPONSE_LEN];

/// Calibratable stick property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Target {
    /// Stick center point
    Center = 1,
    /// Stick min/max travel extents
    Range = 2,
}

impl Target {
    /// Every target, in backup order
    pub const ALL: [Target; 2] = [Target::Center, Target::Range];

    /// Raw target ID byte
    pub const fn id(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Target {
    type Error = CalibrationError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Target::Center),
            2 => Ok(Target::Range),
            other => Err(CalibrationError::Protocol(format!(
                "Unknown calibration target: {}",
                other
            ))),
        }
    }
}

/// The (device, target) pair a calibration command addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CalibrationTarget {
    pub device_id: u8,
    pub target: Target,
}

impl CalibrationTarget {
    /// Stick center calibration
    pub const CENTER: CalibrationTarget = CalibrationTarget::stick(Target::Center);

    /// Stick min/max calibration
    pub const RANGE: CalibrationTarget = CalibrationTarget::stick(Target::Range);

    /// Address `target` on the analog stick subsystem
    pub const fn stick(target: Target) -> Self {
        Self {
            device_id: STICK_DEVICE_ID,
            target,
        }
    }

    /// Raw target ID byte
    pub const fn target_id(&self) -> u8 {
        self.target.id()
    }

    /// Payload for "enter calibration mode" (and state query)
    pub const fn enter_mode(&self) -> [u8; 3] {
        [CMD_ENTER_MODE, self.device_id, self.target_id()]
    }

    /// Payload for "sample current value"
    pub const fn sample(&self) -> [u8; 3] {
        [CMD_SAMPLE, self.device_id, self.target_id()]
    }

    /// Payload for "commit" (min/max: compute and store extents)
    pub const fn commit(&self) -> [u8; 3] {
        [CMD_COMMIT, self.device_id, self.target_id()]
    }

    /// The response the device sends when it accepts the mode switch
    pub const fn acceptance(&self) -> CalibrationResponse {
        CalibrationResponse {
            device_id: self.device_id,
            target_id: self.target_id(),
            status: MODE_ACCEPTED_STATUS,
            flag: MODE_ACCEPTED_FLAG,
        }
    }
}

/// Reply to an "enter calibration mode" command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationResponse {
    pub device_id: u8,
    pub target_id: u8,
    pub status: u8,
    pub flag: u8,
}

impl CalibrationResponse {
    /// Parse a response, `None` unless it is exactly [`RESPONSE_LEN`] bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let raw: RawRecord = bytes.try_into().ok()?;
        Some(Self::from_raw(raw))
    }

    pub const fn from_raw(raw: RawRecord) -> Self {
        Self {
            device_id: raw[0],
            target_id: raw[1],
            status: raw[2],
            flag: raw[3],
        }
    }

    pub const fn to_bytes(&self) -> RawRecord {
        [self.device_id, self.target_id, self.status, self.flag]
    }

    /// Whether this response echoes the device and target of `target`
    pub fn addresses(&self, target: &CalibrationTarget) -> bool {
        self.device_id == target.device_id && self.target_id == target.target_id()
    }
}

/// One sampled raw stick reading during center calibration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleResponse {
    pub device_id: u8,
    pub target_id: u8,
    pub axis_low: u8,
    pub axis_high: u8,
}

impl SampleResponse {
    /// Parse a sample reply
    ///
    /// # Errors
    ///
    /// Returns `Protocol` if the reply is not exactly [`RESPONSE_LEN`] bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let raw: RawRecord = bytes.try_into().map_err(|_| {
            CalibrationError::Protocol(format!(
                "Sample response must be {} bytes, got {:?}",
                RESPONSE_LEN, bytes
            ))
        })?;
        Ok(Self {
            device_id: raw[0],
            target_id: raw[1],
            axis_low: raw[2],
            axis_high: raw[3],
        })
    }

    pub const fn to_bytes(&self) -> RawRecord {
        [self.device_id, self.target_id, self.axis_low, self.axis_high]
    }
}

/// Payload that writes a stored record back to the device: `[2, r0, r1, r2]`
pub const fn write_back_payload(record: &RawRecord) -> [u8; 4] {
    [CMD_COMMIT, record[0], record[1], record[2]]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_ids_are_distinct() {
        assert_eq!(ReportId::Nvs.id(), 0x80);
        assert_eq!(ReportId::Calibration.id(), 0x82);
        assert_ne!(ReportId::Nvs, ReportId::Calibration);
    }

    #[test]
    fn test_nvs_payloads() {
        assert_eq!(NVS_UNLOCK_PAYLOAD, [3, 2, 101, 50, 64, 12]);
        assert_eq!(NVS_RELOCK_PAYLOAD, [3, 1]);
    }

    #[test]
    fn test_center_target_payloads() {
        let target = CalibrationTarget::CENTER;
        assert_eq!(target.enter_mode(), [1, 1, 1]);
        assert_eq!(target.sample(), [3, 1, 1]);
        assert_eq!(target.commit(), [2, 1, 1]);
    }

    #[test]
    fn test_range_target_payloads() {
        let target = CalibrationTarget::RANGE;
        assert_eq!(target.enter_mode(), [1, 1, 2]);
        assert_eq!(target.commit(), [2, 1, 2]);
    }

    #[test]
    fn test_acceptance_record() {
        assert_eq!(
            CalibrationTarget::RANGE.acceptance().to_bytes(),
            [1, 2, 1, 0xFF]
        );
    }

    #[test]
    fn test_target_try_from() {
        assert_eq!(Target::try_from(1).unwrap(), Target::Center);
        assert_eq!(Target::try_from(2).unwrap(), Target::Range);
        assert!(matches!(
            Target::try_from(3),
            Err(CalibrationError::Protocol(_))
        ));
    }

    #[test]
    fn test_calibration_response_requires_four_bytes() {
        assert!(CalibrationResponse::from_bytes(&[1, 1, 1]).is_none());
        assert!(CalibrationResponse::from_bytes(&[1, 1, 1, 0xFF, 0]).is_none());

        let response = CalibrationResponse::from_bytes(&[1, 2, 0, 7]).unwrap();
        assert!(response.addresses(&CalibrationTarget::RANGE));
        assert!(!response.addresses(&CalibrationTarget::CENTER));
        assert_eq!(response.status, 0);
        assert_eq!(response.flag, 7);
    }

    #[test]
    fn test_sample_response_parsing() {
        let sample = SampleResponse::from_bytes(&[1, 1, 130, 0xFF]).unwrap();
        assert_eq!(sample.axis_low, 130);
        assert_eq!(sample.axis_high, 0xFF);
        assert_eq!(sample.to_bytes(), [1, 1, 130, 0xFF]);

        assert!(SampleResponse::from_bytes(&[1, 1]).is_err());
    }

    #[test]
    fn test_write_back_payload_drops_last_byte() {
        assert_eq!(write_back_payload(&[1, 2, 77, 0xFF]), [2, 1, 2, 77]);
    }
}
