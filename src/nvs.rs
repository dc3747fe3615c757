//! # NVS Lock Controller
//!
//! Brackets permanent writes with the controller's NVS unlock/relock commands.
//!
//! Writes made while the NVS is unlocked survive a power cycle. The window is
//! kept as short as possible: [`NvsGuard`] unlocks on acquisition and relocks
//! when released or dropped, so an early return through `?` still relocks.
//!
//! ```no_run
//! use dualsense_calibrator::controller::{dualsense, SessionSettings};
//! use dualsense_calibrator::nvs::NvsGuard;
//!
//! let api = hidapi::HidApi::new()?;
//! let session = dualsense::open(&api, &SessionSettings::default())?;
//! let link = session.exclusive()?;
//!
//! let guard = NvsGuard::acquire(&link)?;
//! // ... permanent writes through `link` ...
//! guard.release()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use tracing::{debug, error, warn};

use crate::error::Result;
use crate::hid::protocol::{ReportId, NVS_RELOCK_PAYLOAD, NVS_UNLOCK_PAYLOAD};
use crate::hid::CommandLink;

/// Send the NVS unlock code. No response is read.
///
/// Only reachable through [`NvsGuard`] so every unlock is paired with a relock.
fn unlock(link: &dyn CommandLink) -> Result<()> {
    link.send(ReportId::Nvs, &NVS_UNLOCK_PAYLOAD)?;
    warn!("NVS unlocked, writes are now permanent");
    Ok(())
}

/// Send the NVS relock command. No response is read.
///
/// Safe to send at any time; also used to recover a controller left unlocked.
pub fn relock(link: &dyn CommandLink) -> Result<()> {
    link.send(ReportId::Nvs, &NVS_RELOCK_PAYLOAD)?;
    debug!("NVS relocked");
    Ok(())
}

/// Scoped NVS unlock. Relocks exactly once on every exit path.
#[must_use = "dropping the guard relocks the NVS immediately"]
pub struct NvsGuard<'l> {
    link: &'l dyn CommandLink,
    released: bool,
}

impl<'l> NvsGuard<'l> {
    /// Unlock the NVS
    ///
    /// # Errors
    ///
    /// Returns the transport error if the unlock write fails. No guard exists
    /// in that case, so nothing is relocked.
    pub fn acquire(link: &'l dyn CommandLink) -> Result<Self> {
        unlock(link)?;
        Ok(Self {
            link,
            released: false,
        })
    }

    /// Relock now and report the outcome
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        relock(self.link)
    }
}

impl Drop for NvsGuard<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = relock(self.link) {
            error!("Failed to relock NVS: {}", e);
        }
    }
}

/// Run `op` with the NVS unlocked when `permanent` is set
///
/// The relock result is only surfaced when `op` itself succeeded; an error
/// from `op` takes precedence.
pub fn bracket<T>(
    link: &dyn CommandLink,
    permanent: bool,
    op: impl FnOnce() -> Result<T>,
) -> Result<T> {
    if !permanent {
        return op();
    }

    let guard = NvsGuard::acquire(link)?;
    let value = op()?;
    guard.release()?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::session::test_support::mock_session;
    use crate::error::CalibrationError;
    use crate::hid::port_trait::mocks::MockHidPort;

    const UNLOCK_FRAME: [u8; 7] = [0x80, 3, 2, 101, 50, 64, 12];
    const RELOCK_FRAME: [u8; 3] = [0x80, 3, 1];

    #[test]
    fn test_unlock_and_relock_payloads() {
        let port = MockHidPort::new();
        let session = mock_session(&port);
        let link = session.exclusive().unwrap();

        unlock(&link).unwrap();
        relock(&link).unwrap();

        assert_eq!(
            port.get_written_data(),
            vec![UNLOCK_FRAME.to_vec(), RELOCK_FRAME.to_vec()]
        );
    }

    #[test]
    fn test_guard_relocks_on_drop() {
        let port = MockHidPort::new();
        let session = mock_session(&port);
        let link = session.exclusive().unwrap();

        {
            let _guard = NvsGuard::acquire(&link).unwrap();
            link.send(ReportId::Calibration, &[2, 1, 2]).unwrap();
        }

        assert_eq!(
            port.get_written_data(),
            vec![
                UNLOCK_FRAME.to_vec(),
                vec![0x82, 2, 1, 2],
                RELOCK_FRAME.to_vec(),
            ]
        );
    }

    #[test]
    fn test_release_relocks_once() {
        let port = MockHidPort::new();
        let session = mock_session(&port);
        let link = session.exclusive().unwrap();

        let guard = NvsGuard::acquire(&link).unwrap();
        guard.release().unwrap();

        assert_eq!(port.payloads_for(0x80), vec![vec![3, 2, 101, 50, 64, 12], vec![3, 1]]);
    }

    #[test]
    fn test_failed_unlock_does_not_relock() {
        let port = MockHidPort::new();
        port.set_fail_write_at(0);
        let session = mock_session(&port);
        let link = session.exclusive().unwrap();

        assert!(NvsGuard::acquire(&link).is_err());
        assert!(port.get_written_data().is_empty());
    }

    #[test]
    fn test_bracket_relocks_when_op_fails() {
        let port = MockHidPort::new();
        let session = mock_session(&port);
        let link = session.exclusive().unwrap();

        let result: Result<()> = bracket(&link, true, || {
            Err(CalibrationError::Protocol("boom".to_string()))
        });

        assert!(matches!(result, Err(CalibrationError::Protocol(_))));
        assert_eq!(
            port.get_written_data(),
            vec![UNLOCK_FRAME.to_vec(), RELOCK_FRAME.to_vec()]
        );
    }

    #[test]
    fn test_bracket_without_permanent_skips_nvs() {
        let port = MockHidPort::new();
        let session = mock_session(&port);
        let link = session.exclusive().unwrap();

        let value = bracket(&link, false, || Ok(7)).unwrap();

        assert_eq!(value, 7);
        assert!(port.get_written_data().is_empty());
    }
}
