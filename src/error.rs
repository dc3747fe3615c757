//! # Error Types
//!
//! Custom error types for the DualSense calibrator using `thiserror`.

use std::time::Duration;

use thiserror::Error;

/// Main error type for the calibrator
#[derive(Debug, Error)]
pub enum CalibrationError {
    /// An operation needing an open session was invoked without one
    #[error("No controller connected")]
    DeviceNotConnected,

    /// Discovery found no matching controller interface
    #[error("No DualSense controller found")]
    NotFound,

    /// No HID report arrived within the read deadline
    #[error("No response from device within {0:?}")]
    Timeout(Duration),

    /// A response failed a check the protocol treats as fatal
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Restore was requested but nothing has been backed up yet
    #[error("No calibration backup found")]
    NoBackup,

    /// The HID handle rejected a read or write
    #[error("Transport error: {0}")]
    Transport(String),

    /// Deadzone offset outside of 0..=20
    #[error("Deadzone offset {0} is out of range (0-20)")]
    InvalidDeadzoneOffset(u8),

    /// HID API errors (enumeration, open)
    #[error("HID error: {0}")]
    Hid(#[from] hidapi::HidError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Backup file encoding errors
    #[error("Backup format error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the calibrator
pub type Result<T> = std::result::Result<T, CalibrationError>;
