//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;

use crate::backup::DEFAULT_BACKUP_FILE;
use crate::calibration::deadzone::{DeadzoneOffset, MAX_DEADZONE_OFFSET};
use crate::controller::SessionSettings;
use crate::error::{CalibrationError, Result};
use crate::telemetry::{TelemetrySettings, MIN_REPORT_LEN};

/// Application name used for platform directories
pub const APP_NAME: &str = "dualsense-calibrator";

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HID device timing
#[derive(Debug, Deserialize, Clone)]
pub struct DeviceConfig {
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    #[serde(default = "default_poll_slice_ms")]
    pub poll_slice_ms: u64,
}

/// Calibration behavior
#[derive(Debug, Deserialize, Clone)]
pub struct CalibrationConfig {
    #[serde(default = "default_deadzone_offset")]
    pub deadzone_offset: u8,

    #[serde(default)]
    pub make_permanent: bool,
}

/// Backup file handling
#[derive(Debug, Deserialize, Clone)]
pub struct BackupConfig {
    /// Empty means the platform data directory
    #[serde(default)]
    pub path: String,

    #[serde(default = "default_auto_backup")]
    pub auto_backup: bool,
}

/// Live stick sampling
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default = "default_telemetry_enabled")]
    pub enabled: bool,

    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    #[serde(default = "default_report_len")]
    pub report_len: usize,
}

/// Log output
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Empty disables file logging
    #[serde(default)]
    pub log_dir: String,
}

// Default value functions
fn default_read_timeout_ms() -> u64 { 1000 }
fn default_poll_slice_ms() -> u64 { 10 }

fn default_deadzone_offset() -> u8 { 5 }

fn default_auto_backup() -> bool { true }

fn default_telemetry_enabled() -> bool { true }
fn default_interval_ms() -> u64 { 20 }
fn default_report_len() -> usize { 64 }

fn default_log_level() -> String { "info".to_string() }

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: default_read_timeout_ms(),
            poll_slice_ms: default_poll_slice_ms(),
        }
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            deadzone_offset: default_deadzone_offset(),
            make_permanent: false,
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            auto_backup: default_auto_backup(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: default_telemetry_enabled(),
            interval_ms: default_interval_ms(),
            report_len: default_report_len(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_dir: String::new(),
        }
    }
}

fn invalid(msg: impl std::fmt::Display) -> CalibrationError {
    CalibrationError::Config(toml::de::Error::custom(msg))
}

impl Config {
    /// Platform config file location
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use dualsense_calibrator::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate configuration text
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path`, or the platform config file; defaults when that file is absent
    ///
    /// An explicitly given path must exist.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.is_file() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.device.read_timeout_ms == 0 || self.device.read_timeout_ms > 10000 {
            return Err(invalid("read_timeout_ms must be between 1 and 10000"));
        }

        if self.device.poll_slice_ms == 0 || self.device.poll_slice_ms > self.device.read_timeout_ms {
            return Err(invalid("poll_slice_ms must be between 1 and read_timeout_ms"));
        }

        if self.calibration.deadzone_offset > MAX_DEADZONE_OFFSET {
            return Err(invalid(format!(
                "deadzone_offset must be between 0 and {}",
                MAX_DEADZONE_OFFSET
            )));
        }

        if self.telemetry.interval_ms == 0 || self.telemetry.interval_ms > 1000 {
            return Err(invalid("telemetry interval_ms must be between 1 and 1000"));
        }

        if self.telemetry.report_len < MIN_REPORT_LEN || self.telemetry.report_len > 64 {
            return Err(invalid(format!(
                "telemetry report_len must be between {} and 64",
                MIN_REPORT_LEN
            )));
        }

        if !["trace", "debug", "info", "warn", "error"].contains(&self.logging.level.as_str()) {
            return Err(invalid(
                "log level must be one of: trace, debug, info, warn, error",
            ));
        }

        Ok(())
    }

    /// Session timing derived from `[device]`
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            read_timeout: Duration::from_millis(self.device.read_timeout_ms),
            poll_slice: Duration::from_millis(self.device.poll_slice_ms),
        }
    }

    /// Telemetry sampling derived from `[telemetry]`
    pub fn telemetry_settings(&self) -> TelemetrySettings {
        TelemetrySettings {
            interval: Duration::from_millis(self.telemetry.interval_ms),
            report_len: self.telemetry.report_len,
        }
    }

    /// Configured deadzone offset
    pub fn deadzone_offset(&self) -> Result<DeadzoneOffset> {
        DeadzoneOffset::new(self.calibration.deadzone_offset)
    }

    /// Where the calibration backup lives
    pub fn backup_path(&self) -> PathBuf {
        if !self.backup.path.is_empty() {
            return PathBuf::from(&self.backup.path);
        }
        ProjectDirs::from("", "", APP_NAME)
            .map(|dirs| dirs.data_dir().join(DEFAULT_BACKUP_FILE))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BACKUP_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.device.read_timeout_ms, 1000);
        assert_eq!(config.calibration.deadzone_offset, 5);
        assert!(!config.calibration.make_permanent);
        assert!(config.backup.auto_backup);
        assert!(config.telemetry.enabled);
        assert_eq!(config.telemetry.interval_ms, 20);
        assert_eq!(config.telemetry.report_len, 64);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.calibration.deadzone_offset, 5);
        assert_eq!(config.device.poll_slice_ms, 10);
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let config = Config::parse(include_str!("../config/default.toml")).unwrap();
        let defaults = Config::default();

        assert_eq!(config.device.read_timeout_ms, defaults.device.read_timeout_ms);
        assert_eq!(config.calibration.deadzone_offset, defaults.calibration.deadzone_offset);
        assert_eq!(config.backup.path, defaults.backup.path);
        assert_eq!(config.telemetry.interval_ms, defaults.telemetry.interval_ms);
        assert_eq!(config.logging.log_dir, defaults.logging.log_dir);
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config = Config::parse(
            r#"
[calibration]
make_permanent = true
"#,
        )
        .unwrap();

        assert!(config.calibration.make_permanent);
        assert_eq!(config.calibration.deadzone_offset, 5);
    }

    #[test]
    fn test_invalid_deadzone_offset() {
        let result = Config::parse(
            r#"
[calibration]
deadzone_offset = 21
"#,
        );
        assert!(matches!(result, Err(CalibrationError::Config(_))));
    }

    #[test]
    fn test_invalid_read_timeout() {
        let mut config = Config::default();
        config.device.read_timeout_ms = 0;
        assert!(config.validate().is_err());

        config.device.read_timeout_ms = 10001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_poll_slice_cannot_exceed_timeout() {
        let mut config = Config::default();
        config.device.read_timeout_ms = 50;
        config.device.poll_slice_ms = 51;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_report_len() {
        let mut config = Config::default();
        config.telemetry.report_len = 4;
        assert!(config.validate().is_err());

        config.telemetry.report_len = 65;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_telemetry_interval() {
        let mut config = Config::default();
        config.telemetry.interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_derived_settings() {
        let config = Config::default();

        let session = config.session_settings();
        assert_eq!(session.read_timeout, Duration::from_millis(1000));
        assert_eq!(session.poll_slice, Duration::from_millis(10));

        let telemetry = config.telemetry_settings();
        assert_eq!(telemetry.interval, Duration::from_millis(20));

        assert_eq!(config.deadzone_offset().unwrap().get(), 5);
    }

    #[test]
    fn test_explicit_backup_path() {
        let mut config = Config::default();
        config.backup.path = "/tmp/cal.json".to_string();
        assert_eq!(config.backup_path(), PathBuf::from("/tmp/cal.json"));
    }

    #[test]
    fn test_default_backup_path_file_name() {
        let config = Config::default();
        assert!(config.backup_path().ends_with(DEFAULT_BACKUP_FILE));
    }

    #[test]
    fn test_load_config_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let toml_content = r#"
[device]
read_timeout_ms = 500

[calibration]
deadzone_offset = 12

[backup]
path = "/var/lib/cal.json"
auto_backup = false

[telemetry]
enabled = false

[logging]
level = "debug"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.device.read_timeout_ms, 500);
        assert_eq!(config.calibration.deadzone_offset, 12);
        assert!(!config.backup.auto_backup);
        assert!(!config.telemetry.enabled);
        assert_eq!(config.logging.level, "debug");

        let reloaded = Config::load_or_default(Some(temp_file.path())).unwrap();
        assert_eq!(reloaded.calibration.deadzone_offset, 12);
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let result = Config::load_or_default(Some(Path::new("/nonexistent/calibrator.toml")));
        assert!(matches!(result, Err(CalibrationError::Io(_))));
    }
}
