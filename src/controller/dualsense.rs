//! # DualSense Controller Discovery
//!
//! Finds the DualSense control interface among enumerated HID peripherals.
//!
//! ## Controller Detection
//!
//! A controller qualifies when:
//! - Vendor ID is 0x054c (Sony) and the product ID is one of the known variants
//! - The HID interface number is at least 2 (the control interface; the
//!   gamepad report interface sits below it)
//!
//! When several interfaces qualify the first one in enumeration order wins.
//! That order comes from the OS and is not stable across machines.

use std::ffi::CString;

use hidapi::{DeviceInfo, HidApi};
use tracing::{debug, info};

use super::session::{Session, SessionSettings};
use crate::error::{CalibrationError, Result};
use crate::hid::port_trait::HidApiPort;
use crate::hid::Transport;

/// Sony vendor ID
pub const SONY_VENDOR_ID: u16 = 0x054c;

/// Lowest interface number carrying the calibration channel
pub const CONTROL_INTERFACE_MIN: i32 = 2;

/// A supported controller variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownDevice {
    pub name: &'static str,
    pub vendor_id: u16,
    pub product_id: u16,
}

/// Every (vendor, product) pair this tool knows how to calibrate
pub const KNOWN_DEVICES: &[KnownDevice] = &[
    KnownDevice {
        name: "DualSense",
        vendor_id: SONY_VENDOR_ID,
        product_id: 0x0ce6,
    },
    KnownDevice {
        name: "DualSense (updated firmware)",
        vendor_id: SONY_VENDOR_ID,
        product_id: 0x0df2,
    },
    KnownDevice {
        name: "DualSense Edge",
        vendor_id: SONY_VENDOR_ID,
        product_id: 0x0da5,
    },
];

/// Look up a known variant by vendor/product ID
pub fn known_device(vendor_id: u16, product_id: u16) -> Option<&'static KnownDevice> {
    KNOWN_DEVICES
        .iter()
        .find(|d| d.vendor_id == vendor_id && d.product_id == product_id)
}

/// Identifies one candidate controller interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub vendor_id: u16,
    pub product_id: u16,
    /// `-1` when the platform does not report it
    pub interface_number: i32,
    pub path: CString,
}

impl DeviceDescriptor {
    pub fn from_device_info(info: &DeviceInfo) -> Self {
        Self {
            vendor_id: info.vendor_id(),
            product_id: info.product_id(),
            interface_number: info.interface_number(),
            path: info.path().to_owned(),
        }
    }

    /// The known variant this descriptor matches, if any
    pub fn known_device(&self) -> Option<&'static KnownDevice> {
        known_device(self.vendor_id, self.product_id)
    }

    /// Human-readable variant name
    pub fn name(&self) -> &'static str {
        self.known_device().map_or("Unknown device", |d| d.name)
    }

    /// Whether this descriptor can carry calibration traffic
    pub fn is_calibratable(&self) -> bool {
        self.known_device().is_some() && self.interface_number >= CONTROL_INTERFACE_MIN
    }
}

impl std::fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{:04x}:{:04x}] interface {} at {}",
            self.name(),
            self.vendor_id,
            self.product_id,
            self.interface_number,
            self.path.to_string_lossy()
        )
    }
}

/// Pick the first calibratable descriptor, in iteration order
pub fn select<I>(candidates: I) -> Option<DeviceDescriptor>
where
    I: IntoIterator<Item = DeviceDescriptor>,
{
    candidates.into_iter().find(|candidate| {
        if candidate.known_device().is_none() {
            return false;
        }
        if candidate.interface_number < CONTROL_INTERFACE_MIN {
            debug!(
                "Skipping {:04x}:{:04x} interface {} (not the control interface)",
                candidate.vendor_id, candidate.product_id, candidate.interface_number
            );
            return false;
        }
        true
    })
}

/// Every calibratable interface currently attached
pub fn list(api: &HidApi) -> Vec<DeviceDescriptor> {
    api.device_list()
        .map(DeviceDescriptor::from_device_info)
        .filter(DeviceDescriptor::is_calibratable)
        .collect()
}

/// Find the first calibratable interface
pub fn discover(api: &HidApi) -> Option<DeviceDescriptor> {
    select(api.device_list().map(DeviceDescriptor::from_device_info))
}

/// Discover and open a controller
///
/// # Errors
///
/// - `NotFound`: no qualifying interface is attached
/// - `Hid`: the interface could not be opened (permissions, unplugged)
///
/// # Examples
///
/// ```no_run
/// use dualsense_calibrator::controller::{dualsense, SessionSettings};
///
/// let api = hidapi::HidApi::new()?;
/// let session = dualsense::open(&api, &SessionSettings::default())?;
/// println!("Connected to: {}", session.descriptor());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn open(api: &HidApi, settings: &SessionSettings) -> Result<Session> {
    let descriptor = discover(api).ok_or(CalibrationError::NotFound)?;
    let device = api.open_path(&descriptor.path)?;
    info!("Opened {}", descriptor);

    let transport = Transport::new(
        Box::new(HidApiPort::new(device)),
        settings.read_timeout,
        settings.poll_slice,
    );
    Ok(Session::new(descriptor, transport))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(product_id: u16, interface_number: i32) -> DeviceDescriptor {
        DeviceDescriptor {
            vendor_id: SONY_VENDOR_ID,
            product_id,
            interface_number,
            path: CString::new(format!("/dev/hidraw{}", interface_number)).unwrap(),
        }
    }

    #[test]
    fn test_known_devices() {
        assert_eq!(KNOWN_DEVICES.len(), 3);
        assert!(known_device(0x054c, 0x0ce6).is_some());
        assert!(known_device(0x054c, 0x0df2).is_some());
        assert_eq!(known_device(0x054c, 0x0da5).unwrap().name, "DualSense Edge");
        assert!(known_device(0x054c, 0x05c4).is_none());
        assert!(known_device(0x045e, 0x0ce6).is_none());
    }

    #[test]
    fn test_select_rejects_gamepad_interface() {
        let candidates = vec![descriptor(0x0ce6, 0), descriptor(0x0ce6, 1)];
        assert_eq!(select(candidates), None);
    }

    #[test]
    fn test_select_rejects_unknown_interface_number() {
        assert_eq!(select(vec![descriptor(0x0ce6, -1)]), None);
    }

    #[test]
    fn test_select_accepts_control_interface() {
        let chosen = select(vec![descriptor(0x0ce6, 0), descriptor(0x0ce6, 2)]).unwrap();
        assert_eq!(chosen.interface_number, 2);
        assert_eq!(chosen.name(), "DualSense");
    }

    #[test]
    fn test_select_rejects_unknown_products() {
        let mut other = descriptor(0x05c4, 3);
        assert_eq!(select(vec![other.clone()]), None);

        other.vendor_id = 0x1234;
        other.product_id = 0x0ce6;
        assert_eq!(select(vec![other]), None);
    }

    #[test]
    fn test_select_keeps_enumeration_order() {
        let chosen = select(vec![
            descriptor(0x0da5, 3),
            descriptor(0x0ce6, 2),
        ])
        .unwrap();
        assert_eq!(chosen.product_id, 0x0da5);
    }

    #[test]
    fn test_is_calibratable() {
        assert!(descriptor(0x0df2, 2).is_calibratable());
        assert!(!descriptor(0x0df2, 1).is_calibratable());
    }

    #[test]
    fn test_display_includes_ids() {
        let text = descriptor(0x0ce6, 2).to_string();
        assert!(text.contains("054c:0ce6"));
        assert!(text.contains("interface 2"));
    }

    // Integration test - only runs with real hardware
    #[test]
    #[ignore]
    fn test_open_with_real_hardware() {
        let api = HidApi::new().expect("hidapi init failed");
        match open(&api, &SessionSettings::default()) {
            Ok(session) => {
                println!("Opened {}", session.descriptor());
                assert!(session.descriptor().is_calibratable());
            }
            Err(e) => println!("No controller detected ({}), this is OK for CI", e),
        }
    }
}
