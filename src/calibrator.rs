//! # Calibrator
//!
//! Collaborator-facing entry point. A front end (CLI, GUI) holds one
//! [`Calibrator`] and drives everything through it:
//!
//! - `connect` opens the controller, backs up the calibration the first time
//!   and starts the telemetry stream
//! - `center_calibration` / `range_calibration` run the calibration routines,
//!   inside an NVS unlock bracket when asked to make the result permanent
//! - `backup` / `restore` snapshot and replay calibration records
//! - `relock_nvs` recovers a controller left with its NVS unlocked
//! - `stick_position` / `subscribe` expose the live stick telemetry
//!
//! Every device operation is blocking. Run them off any thread that has to
//! stay responsive.

use std::sync::Arc;

use hidapi::HidApi;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::backup::{self, BackupStorage, CalibrationBackup, JsonBackupFile};
use crate::calibration::{
    CenterCalibration, CenterSaved, DeadzoneOffset, RangeCalibration,
};
use crate::config::Config;
use crate::controller::{dualsense, DeviceDescriptor, Session};
use crate::error::{CalibrationError, Result};
use crate::nvs;
use crate::telemetry::{StickPosition, TelemetryStream};

/// What happened to the automatic first-connect backup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoBackup {
    /// `[backup] auto_backup` is off
    Disabled,
    /// A backup already exists and was left alone
    AlreadyPresent,
    /// A new backup was captured and stored
    Created(CalibrationBackup),
    /// Capturing or storing failed; logged, the connection stays up
    Failed,
}

/// Result of a successful connect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOutcome {
    pub descriptor: DeviceDescriptor,
    pub auto_backup: AutoBackup,
}

/// Owns the session, the telemetry stream and the backup storage
pub struct Calibrator {
    config: Config,
    storage: Box<dyn BackupStorage>,
    deadzone: DeadzoneOffset,
    session: Option<Arc<Session>>,
    telemetry: Option<TelemetryStream>,
}

impl std::fmt::Debug for Calibrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Calibrator")
            .field("deadzone", &self.deadzone)
            .field("session", &self.session)
            .field("telemetry", &self.telemetry)
            .finish_non_exhaustive()
    }
}

impl Calibrator {
    /// Build a calibrator with explicit backup storage
    ///
    /// # Errors
    ///
    /// Returns `InvalidDeadzoneOffset` if the configured offset is out of range
    pub fn new(config: Config, storage: Box<dyn BackupStorage>) -> Result<Self> {
        let deadzone = config.deadzone_offset()?;
        Ok(Self {
            config,
            storage,
            deadzone,
            session: None,
            telemetry: None,
        })
    }

    /// Build a calibrator storing backups at the configured path
    pub fn from_config(config: Config) -> Result<Self> {
        let storage = JsonBackupFile::new(config.backup_path());
        Self::new(config, Box::new(storage))
    }

    /// Every attached controller interface that can be calibrated
    pub fn list_devices() -> Result<Vec<DeviceDescriptor>> {
        let api = HidApi::new()?;
        Ok(dualsense::list(&api))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Discover and open a controller, replacing any existing session
    ///
    /// # Errors
    ///
    /// - `NotFound`: no controller attached
    /// - `Hid`: HID initialization or open failed
    pub fn connect(&mut self) -> Result<ConnectOutcome> {
        self.disconnect();
        let api = HidApi::new()?;
        let session = dualsense::open(&api, &self.config.session_settings())?;
        self.attach(session)
    }

    /// Adopt an already open session
    ///
    /// Runs the first-connect backup and starts telemetry.
    pub fn attach(&mut self, session: Session) -> Result<ConnectOutcome> {
        self.disconnect();
        let session = Arc::new(session);
        let descriptor = session.descriptor().clone();
        info!("Connected to {}", descriptor);

        let auto_backup = self.auto_backup(&session);

        if self.config.telemetry.enabled {
            let stream =
                TelemetryStream::spawn(Arc::clone(&session), self.config.telemetry_settings())?;
            self.telemetry = Some(stream);
        }
        self.session = Some(session);

        Ok(ConnectOutcome {
            descriptor,
            auto_backup,
        })
    }

    /// Close the session and stop telemetry
    pub fn disconnect(&mut self) {
        if let Some(session) = self.session.take() {
            session.close();
        }
        if let Some(stream) = self.telemetry.take() {
            stream.stop();
        }
    }

    pub fn is_connected(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.is_connected())
    }

    pub fn descriptor(&self) -> Option<&DeviceDescriptor> {
        self.session.as_ref().map(|s| s.descriptor())
    }

    pub fn deadzone_offset(&self) -> DeadzoneOffset {
        self.deadzone
    }

    /// Change the offset used by later center calibrations
    pub fn set_deadzone_offset(&mut self, offset: u8) -> Result<()> {
        self.deadzone = DeadzoneOffset::new(offset)?;
        Ok(())
    }

    /// Whether calibrations should be made permanent by default
    pub fn make_permanent(&self) -> bool {
        self.config.calibration.make_permanent
    }

    /// Latest live stick position, if telemetry is running
    pub fn stick_position(&self) -> Option<StickPosition> {
        self.telemetry.as_ref().map(TelemetryStream::latest)
    }

    /// Subscribe to live stick positions, if telemetry is running
    pub fn subscribe(&self) -> Option<watch::Receiver<StickPosition>> {
        self.telemetry.as_ref().map(TelemetryStream::subscribe)
    }

    /// Run an interactive center calibration
    ///
    /// The device is switched into center calibration mode, then `driver`
    /// receives the routine to sample and finally save it. With `permanent`
    /// the whole routine runs with the NVS unlocked.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use dualsense_calibrator::calibrator::Calibrator;
    /// use dualsense_calibrator::config::Config;
    ///
    /// let mut calibrator = Calibrator::from_config(Config::default())?;
    /// calibrator.connect()?;
    ///
    /// let offset = calibrator.deadzone_offset();
    /// let saved = calibrator.center_calibration(false, |mut center| {
    ///     println!("Sampled: {:?}", center.sample()?);
    ///     center.save(offset)
    /// })?;
    /// println!("Wrote {:?}", saved.written);
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn center_calibration<T, F>(&self, permanent: bool, driver: F) -> Result<T>
    where
        F: FnOnce(CenterCalibration<'_>) -> Result<T>,
    {
        let session = self.session()?;
        let link = session.exclusive()?;
        nvs::bracket(&link, permanent, || {
            let calibration = CenterCalibration::begin(&link)?;
            driver(calibration)
        })
    }

    /// Center calibration without inspection: enter mode and save at once
    pub fn center_calibrate(&self, permanent: bool) -> Result<CenterSaved> {
        let offset = self.deadzone;
        self.center_calibration(permanent, |calibration| calibration.save(offset))
    }

    /// Run a min/max calibration
    ///
    /// `gate` blocks until the user has swept the sticks through their range.
    pub fn range_calibration<F>(&self, permanent: bool, gate: F) -> Result<()>
    where
        F: FnOnce() -> Result<()>,
    {
        let session = self.session()?;
        let link = session.exclusive()?;
        nvs::bracket(&link, permanent, || {
            let mut calibration = RangeCalibration::begin(&link)?;
            calibration.await_user_motion(gate)?;
            calibration.commit()
        })
    }

    /// Capture both calibration records and overwrite the stored backup
    pub fn backup(&self) -> Result<CalibrationBackup> {
        let session = self.session()?;
        self.backup_session(session)
    }

    /// Replay the stored backup with the NVS unlocked
    ///
    /// # Errors
    ///
    /// - `DeviceNotConnected`: checked before storage is read
    /// - `NoBackup`: nothing stored yet
    pub fn restore(&self) -> Result<CalibrationBackup> {
        let session = self.session()?;
        let stored = self.storage.load()?.ok_or(CalibrationError::NoBackup)?;

        let link = session.exclusive()?;
        backup::replay(&link, &stored)?;
        Ok(stored)
    }

    /// Send a standalone NVS relock
    ///
    /// Recovery for a controller left unlocked by an interrupted session.
    /// Unlocking is only ever done by the calibration and restore brackets.
    pub fn relock_nvs(&self) -> Result<()> {
        let session = self.session()?;
        let link = session.exclusive()?;
        nvs::relock(&link)
    }

    fn session(&self) -> Result<&Arc<Session>> {
        self.session
            .as_ref()
            .filter(|s| s.is_connected())
            .ok_or(CalibrationError::DeviceNotConnected)
    }

    fn backup_session(&self, session: &Session) -> Result<CalibrationBackup> {
        let link = session.exclusive()?;
        let captured = backup::capture(&link)?;
        drop(link);

        self.storage.save(&captured)?;
        Ok(captured)
    }

    fn auto_backup(&self, session: &Session) -> AutoBackup {
        if !self.config.backup.auto_backup {
            return AutoBackup::Disabled;
        }
        if self.storage.exists() {
            return AutoBackup::AlreadyPresent;
        }
        match self.backup_session(session) {
            Ok(captured) => AutoBackup::Created(captured),
            Err(e) => {
                warn!("Backup failed: {}", e);
                AutoBackup::Failed
            }
        }
    }
}

impl Drop for Calibrator {
    fn drop(&mut self) {
        self.disconnect();
    }
}
