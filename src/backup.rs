//! # Backup / Restore Manager
//!
//! Snapshots the device's calibration records and replays them.
//!
//! A backup queries both calibration targets with the enter-mode command and
//! keeps the 4-byte replies. Unlike calibration mode entry, a reply that
//! does not echo the device and target IDs aborts the whole backup, and
//! nothing is written to disk.
//!
//! The backup file is JSON keyed by target ID:
//!
//! ```json
//! {"1": [1, 1, 130, 255], "2": [1, 2, 1, 255]}
//! ```
//!
//! Restoring writes `[2, r0, r1, r2]` for every stored record inside an NVS
//! unlock bracket. The relock is sent even when one of those writes fails.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{CalibrationError, Result};
use crate::hid::protocol::{
    write_back_payload, CalibrationTarget, RawRecord, ReportId, Target, RESPONSE_LEN,
};
use crate::hid::CommandLink;
use crate::nvs::NvsGuard;

/// File name used when no backup path is configured
pub const DEFAULT_BACKUP_FILE: &str = "calibration_backup.json";

/// Raw calibration records keyed by target ID
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalibrationBackup {
    entries: BTreeMap<u8, RawRecord>,
}

impl CalibrationBackup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, target: Target, record: RawRecord) {
        self.entries.insert(target.id(), record);
    }

    pub fn get(&self, target: Target) -> Option<&RawRecord> {
        self.entries.get(&target.id())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records in ascending target ID order
    pub fn iter(&self) -> impl Iterator<Item = (u8, &RawRecord)> {
        self.entries.iter().map(|(id, record)| (*id, record))
    }
}

/// Durable home of the backup
#[cfg_attr(test, mockall::automock)]
pub trait BackupStorage: Send {
    /// Whether a backup has been written
    fn exists(&self) -> bool;

    /// Load the backup, `None` when none exists
    fn load(&self) -> Result<Option<CalibrationBackup>>;

    /// Replace any stored backup with `backup`
    fn save(&self, backup: &CalibrationBackup) -> Result<()>;
}

/// JSON backup file
#[derive(Debug, Clone)]
pub struct JsonBackupFile {
    path: PathBuf,
}

impl JsonBackupFile {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BackupStorage for JsonBackupFile {
    fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn load(&self) -> Result<Option<CalibrationBackup>> {
        if !self.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path)?;
        let backup = serde_json::from_str(&contents)?;
        Ok(Some(backup))
    }

    fn save(&self, backup: &CalibrationBackup) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        // Write beside the target then rename so a crash never leaves half a file
        let mut staging = self.path.clone().into_os_string();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);

        fs::write(&staging, serde_json::to_string(backup)?)?;
        fs::rename(&staging, &self.path)?;

        info!("Calibration backup saved to {}", self.path.display());
        Ok(())
    }
}

/// Query both calibration targets and collect their records
///
/// # Errors
///
/// - `Protocol`: a reply was not 4 bytes or did not echo the device/target IDs
/// - `Timeout` / `Transport`: device I/O failed
pub fn capture(link: &dyn CommandLink) -> Result<CalibrationBackup> {
    let mut backup = CalibrationBackup::new();

    for target in Target::ALL {
        let address = CalibrationTarget::stick(target);
        let reply = link.request(ReportId::Calibration, &address.enter_mode(), RESPONSE_LEN)?;

        let record: RawRecord = reply
            .as_slice()
            .try_into()
            .ok()
            .filter(|r: &RawRecord| r[0] == address.device_id && r[1] == address.target_id())
            .ok_or_else(|| {
                CalibrationError::Protocol(format!(
                    "Unexpected response while backing up {:?}: {:?}",
                    target, reply
                ))
            })?;

        debug!("Captured {:?} record {:?}", target, record);
        backup.insert(target, record);
    }

    Ok(backup)
}

/// Write every stored record back with the NVS unlocked
///
/// Records go out in ascending target ID order. The NVS is relocked on
/// every path once the unlock succeeded.
pub fn replay(link: &dyn CommandLink, backup: &CalibrationBackup) -> Result<()> {
    let guard = NvsGuard::acquire(link)?;

    for (target_id, record) in backup.iter() {
        link.send(ReportId::Calibration, &write_back_payload(record))?;
        debug!("Restored target {} from {:?}", target_id, record);
    }

    guard.release()?;
    info!("Calibration restored ({} records)", backup.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::session::test_support::mock_session;
    use crate::hid::port_trait::mocks::MockHidPort;
    use tempfile::TempDir;

    fn sample_backup() -> CalibrationBackup {
        let mut backup = CalibrationBackup::new();
        backup.insert(Target::Center, [1, 1, 130, 0xFF]);
        backup.insert(Target::Range, [1, 2, 1, 0xFF]);
        backup
    }

    #[test]
    fn test_capture_both_targets() {
        let port = MockHidPort::new();
        port.push_read(&[1, 1, 130, 0xFF]);
        port.push_read(&[1, 2, 1, 0xFF]);
        let session = mock_session(&port);
        let link = session.exclusive().unwrap();

        let backup = capture(&link).unwrap();

        assert_eq!(backup, sample_backup());
        assert_eq!(port.payloads_for(0x82), vec![vec![1, 1, 1], vec![1, 1, 2]]);
    }

    #[test]
    fn test_capture_rejects_wrong_target_echo() {
        let port = MockHidPort::new();
        port.push_read(&[1, 1, 130, 0xFF]);
        port.push_read(&[1, 1, 1, 0xFF]);
        let session = mock_session(&port);
        let link = session.exclusive().unwrap();

        match capture(&link) {
            Err(CalibrationError::Protocol(msg)) => assert!(msg.contains("Range")),
            other => panic!("Expected Protocol error, got: {:?}", other),
        }
    }

    #[test]
    fn test_capture_rejects_short_reply() {
        let port = MockHidPort::new();
        port.push_read(&[1, 1, 130]);
        let session = mock_session(&port);
        let link = session.exclusive().unwrap();

        assert!(matches!(
            capture(&link),
            Err(CalibrationError::Protocol(_))
        ));
        // Aborted before the second target was queried
        assert_eq!(port.payloads_for(0x82).len(), 1);
    }

    #[test]
    fn test_replay_writes_records_inside_nvs_bracket() {
        let port = MockHidPort::new();
        let session = mock_session(&port);
        let link = session.exclusive().unwrap();

        replay(&link, &sample_backup()).unwrap();

        assert_eq!(
            port.get_written_data(),
            vec![
                vec![0x80, 3, 2, 101, 50, 64, 12],
                vec![0x82, 2, 1, 1, 130],
                vec![0x82, 2, 1, 2, 1],
                vec![0x80, 3, 1],
            ]
        );
    }

    #[test]
    fn test_replay_relocks_once_when_second_write_fails() {
        let port = MockHidPort::new();
        // Write 0 is the unlock, write 1 the first record
        port.set_fail_write_at(1);
        let session = mock_session(&port);
        let link = session.exclusive().unwrap();

        let result = replay(&link, &sample_backup());

        assert!(matches!(result, Err(CalibrationError::Transport(_))));
        let relocks = port
            .payloads_for(0x80)
            .into_iter()
            .filter(|p| p == &vec![3, 1])
            .count();
        assert_eq!(relocks, 1);
        assert_eq!(
            port.get_written_data().last().unwrap(),
            &vec![0x80, 3, 1]
        );
        assert!(port.payloads_for(0x82).is_empty());
    }

    #[test]
    fn test_partial_replay_still_relocks() {
        let port = MockHidPort::new();
        // Write 0 is the unlock, 1 the center record, 2 the range record
        port.set_fail_write_at(2);
        let session = mock_session(&port);
        let link = session.exclusive().unwrap();

        let result = replay(&link, &sample_backup());

        assert!(matches!(result, Err(CalibrationError::Transport(_))));
        assert_eq!(
            port.get_written_data(),
            vec![
                vec![0x80, 3, 2, 101, 50, 64, 12],
                vec![0x82, 2, 1, 1, 130],
                vec![0x80, 3, 1],
            ]
        );
    }

    #[test]
    fn test_restore_of_capture_writes_back_captured_bytes() {
        let port = MockHidPort::new();
        port.push_read(&[1, 1, 133, 0x7A]);
        port.push_read(&[1, 2, 4, 0x11]);
        let session = mock_session(&port);
        let link = session.exclusive().unwrap();

        let backup = capture(&link).unwrap();
        replay(&link, &backup).unwrap();

        let restored: Vec<Vec<u8>> = port
            .payloads_for(0x82)
            .into_iter()
            .filter(|p| p[0] == 2)
            .collect();
        assert_eq!(restored, vec![vec![2, 1, 1, 133], vec![2, 1, 2, 4]]);
    }

    #[test]
    fn test_json_format_uses_string_keys() {
        let json = serde_json::to_string(&sample_backup()).unwrap();
        assert_eq!(json, r#"{"1":[1,1,130,255],"2":[1,2,1,255]}"#);

        let parsed: CalibrationBackup = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.get(Target::Range), Some(&[1, 2, 1, 0xFF]));
    }

    #[test]
    fn test_backup_file_missing_is_none() {
        let dir = TempDir::new().unwrap();
        let file = JsonBackupFile::new(dir.path().join(DEFAULT_BACKUP_FILE));

        assert!(!file.exists());
        assert_eq!(file.load().unwrap(), None);
    }

    #[test]
    fn test_backup_file_save_overwrites() {
        let dir = TempDir::new().unwrap();
        let file = JsonBackupFile::new(dir.path().join("nested").join(DEFAULT_BACKUP_FILE));

        file.save(&sample_backup()).unwrap();

        let mut replacement = CalibrationBackup::new();
        replacement.insert(Target::Center, [1, 1, 128, 0]);
        file.save(&replacement).unwrap();

        assert!(file.exists());
        assert_eq!(file.load().unwrap(), Some(replacement));
    }

    #[test]
    fn test_backup_file_corrupt_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_BACKUP_FILE);
        fs::write(&path, "not json").unwrap();

        assert!(matches!(
            JsonBackupFile::new(path).load(),
            Err(CalibrationError::Json(_))
        ));
    }
}
