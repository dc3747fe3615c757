//! # Controller Module
//!
//! DualSense discovery and session lifecycle.
//!
//! This module handles:
//! - Enumerating HID peripherals and picking the control interface
//! - Opening the device handle
//! - Serializing access to the handle between operations and telemetry

pub mod dualsense;
pub mod session;

pub use dualsense::{DeviceDescriptor, KnownDevice, KNOWN_DEVICES};
pub use session::{Exclusive, Session, SessionSettings};
