//! # HID Transport Module
//!
//! Raw HID report I/O with the DualSense control interface.
//!
//! This module handles:
//! - Report-ID framing of output reports
//! - Polling reads with a bounded deadline
//! - Write-then-read round trips that cannot be interleaved by other readers
//! - Protocol constants for the calibration and NVS channels

pub mod port_trait;
pub mod protocol;

use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::error::{CalibrationError, Result};
use port_trait::HidPort;
use protocol::ReportId;

/// Default deadline for a calibration reply
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(1000);

/// Default length of one polling slice inside [`Transport::read`]
pub const DEFAULT_POLL_SLICE: Duration = Duration::from_millis(10);

/// Report-framed reader/writer over one HID port
pub struct Transport {
    port: Box<dyn HidPort>,
    read_timeout: Duration,
    poll_slice: Duration,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("read_timeout", &self.read_timeout)
            .field("poll_slice", &self.poll_slice)
            .finish_non_exhaustive()
    }
}

impl Transport {
    pub fn new(port: Box<dyn HidPort>, read_timeout: Duration, poll_slice: Duration) -> Self {
        Self {
            port,
            read_timeout,
            poll_slice: poll_slice.min(read_timeout).max(Duration::from_millis(1)),
        }
    }

    /// Configured reply deadline
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Write `payload` as one output report prefixed with `report`
    ///
    /// # Errors
    ///
    /// Returns `Transport` if the device rejects the write
    pub fn write(&mut self, report: ReportId, payload: &[u8]) -> Result<()> {
        let mut frame = Vec::with_capacity(payload.len() + 1);
        frame.push(report.id());
        frame.extend_from_slice(payload);

        self.port.write_report(&frame).map_err(|e| {
            CalibrationError::Transport(format!(
                "Failed to write report 0x{:02X}: {}",
                report.id(),
                e
            ))
        })?;

        debug!("Wrote report 0x{:02X}: {:?}", report.id(), payload);
        Ok(())
    }

    /// Read one report of at most `expected_len` bytes within the configured deadline
    pub fn read(&mut self, expected_len: usize) -> Result<Vec<u8>> {
        self.read_within(expected_len, self.read_timeout)
    }

    /// Read one report of at most `expected_len` bytes within `timeout`
    ///
    /// Polls in short slices until data arrives. There is no retry once the
    /// deadline has passed.
    ///
    /// # Errors
    ///
    /// - `Timeout`: nothing arrived before the deadline
    /// - `Transport`: the device failed the read
    pub fn read_within(&mut self, expected_len: usize, timeout: Duration) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; expected_len];
        let start = Instant::now();

        loop {
            let remaining = timeout.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                return Err(CalibrationError::Timeout(timeout));
            }

            let slice = remaining.min(self.poll_slice);
            let len = self
                .port
                .read_report(&mut buf, slice.as_millis() as i32)
                .map_err(|e| CalibrationError::Transport(format!("Failed to read report: {}", e)))?;

            if len > 0 {
                buf.truncate(len);
                trace!("Read {} bytes: {:?}", len, buf);
                return Ok(buf);
            }
        }
    }

    /// Write a command and read its reply
    pub fn request(
        &mut self,
        report: ReportId,
        payload: &[u8],
        expected_len: usize,
    ) -> Result<Vec<u8>> {
        self.write(report, payload)?;
        self.read(expected_len)
    }

    /// Single non-retrying read for the input report stream
    ///
    /// Returns `Ok(None)` when no report arrived within `wait`.
    pub fn poll_input(&mut self, max_len: usize, wait: Duration) -> Result<Option<Vec<u8>>> {
        let mut buf = vec![0u8; max_len];
        let len = self
            .port
            .read_report(&mut buf, wait.as_millis() as i32)
            .map_err(|e| CalibrationError::Transport(format!("Failed to read input report: {}", e)))?;

        if len == 0 {
            return Ok(None);
        }
        buf.truncate(len);
        Ok(Some(buf))
    }
}

/// Command channel used by the calibration engine, NVS lock and backup manager
pub trait CommandLink {
    /// Fire-and-forget write
    fn send(&self, report: ReportId, payload: &[u8]) -> Result<()>;

    /// Write then read the reply without letting another reader in between
    fn request(&self, report: ReportId, payload: &[u8], expected_len: usize) -> Result<Vec<u8>>;
}
