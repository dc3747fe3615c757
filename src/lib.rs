//! # DualSense Calibrator Library
//!
//! Recalibrate the analog sticks of a PS5 DualSense controller over raw HID.
//!
//! This library provides the device-facing half of the calibrator: discovery,
//! the calibration command protocol, NVS unlock/relock, calibration backups
//! and live stick telemetry. [`calibrator::Calibrator`] ties them together for
//! a front end.

pub mod backup;
pub mod calibration;
pub mod calibrator;
pub mod config;
pub mod controller;
pub mod error;
pub mod hid;
pub mod nvs;
pub mod telemetry;
