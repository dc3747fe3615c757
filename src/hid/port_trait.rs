//! Trait abstraction for HID device operations to enable testing

use std::io;

/// Trait for raw HID report I/O
pub trait HidPort: Send {
    /// Write one output report. `data[0]` is the report ID.
    fn write_report(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Read one input report, waiting at most `timeout_ms`.
    ///
    /// Returns `Ok(0)` when nothing arrived in time.
    fn read_report(&mut self, buf: &mut [u8], timeout_ms: i32) -> io::Result<usize>;
}

/// Wrapper around `hidapi::HidDevice` that implements HidPort
pub struct HidApiPort {
    device: hidapi::HidDevice,
}

impl HidApiPort {
    pub fn new(device: hidapi::HidDevice) -> Self {
        Self { device }
    }
}

impl HidPort for HidApiPort {
    fn write_report(&mut self, data: &[u8]) -> io::Result<usize> {
        self.device.write(data).map_err(io::Error::other)
    }

    fn read_report(&mut self, buf: &mut [u8], timeout_ms: i32) -> io::Result<usize> {
        self.device
            .read_timeout(buf, timeout_ms)
            .map_err(io::Error::other)
    }
}
