//! # Calibration Engine
//!
//! Stick center and stick min/max calibration over the `0x82` command channel.
//!
//! Both routines start by switching the device into calibration mode for
//! their target. The device answers with a 4-byte acceptance record; a
//! mismatch is logged and the routine carries on, since the reply is advisory
//! and device state can lag behind the command.
//!
//! Neither routine touches the NVS on its own. Wrap them with
//! [`crate::nvs::NvsGuard`] to make the result survive a power cycle.

pub mod center;
pub mod deadzone;
pub mod range;

use tracing::{debug, warn};

use crate::error::Result;
use crate::hid::protocol::{CalibrationResponse, CalibrationTarget, ReportId, RESPONSE_LEN};
use crate::hid::CommandLink;

pub use center::{CenterCalibration, CenterSaved, CenterState};
pub use deadzone::DeadzoneOffset;
pub use range::{RangeCalibration, RangeState};

/// Reply to a calibration mode switch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeEntry {
    /// Raw reply bytes
    pub reply: Vec<u8>,
    /// Whether the reply matched the expected acceptance record
    pub accepted: bool,
}

/// Switch the device into calibration mode for `target`
///
/// # Errors
///
/// Only transport failures and timeouts. An unexpected reply is logged.
pub fn enter_mode(link: &dyn CommandLink, target: &CalibrationTarget) -> Result<ModeEntry> {
    let reply = link.request(ReportId::Calibration, &target.enter_mode(), RESPONSE_LEN)?;
    let expected = target.acceptance();
    let accepted = CalibrationResponse::from_bytes(&reply) == Some(expected);

    if accepted {
        debug!("Device entered calibration mode for {:?}", target.target);
    } else {
        warn!(
            "Unexpected calibration state for {:?}: {:?} (expected {:?})",
            target.target,
            reply,
            expected.to_bytes()
        );
    }

    Ok(ModeEntry { reply, accepted })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::session::test_support::mock_session;
    use crate::error::CalibrationError;
    use crate::hid::port_trait::mocks::MockHidPort;

    #[test]
    fn test_enter_mode_accepted() {
        let port = MockHidPort::new();
        port.push_read(&[1, 1, 1, 0xFF]);
        let session = mock_session(&port);
        let link = session.exclusive().unwrap();

        let entry = enter_mode(&link, &CalibrationTarget::CENTER).unwrap();

        assert!(entry.accepted);
        assert_eq!(port.payloads_for(0x82), vec![vec![1, 1, 1]]);
    }

    #[test]
    fn test_enter_mode_tolerates_mismatch() {
        let port = MockHidPort::new();
        port.push_read(&[1, 2, 0, 0]);
        let session = mock_session(&port);
        let link = session.exclusive().unwrap();

        let entry = enter_mode(&link, &CalibrationTarget::RANGE).unwrap();

        assert!(!entry.accepted);
        assert_eq!(entry.reply, vec![1, 2, 0, 0]);
    }

    #[test]
    fn test_enter_mode_tolerates_short_reply() {
        let port = MockHidPort::new();
        port.push_read(&[1]);
        let session = mock_session(&port);
        let link = session.exclusive().unwrap();

        let entry = enter_mode(&link, &CalibrationTarget::CENTER).unwrap();
        assert!(!entry.accepted);
    }

    #[test]
    fn test_enter_mode_timeout_is_fatal() {
        let port = MockHidPort::new();
        let session = mock_session(&port);
        let link = session.exclusive().unwrap();

        assert!(matches!(
            enter_mode(&link, &CalibrationTarget::CENTER),
            Err(CalibrationError::Timeout(_))
        ));
    }
}
