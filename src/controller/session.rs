//! Open device session
//!
//! A [`Session`] owns the HID handle of one connected controller. Two locks
//! guard it:
//!
//! - the transport lock, held for a single write/read round trip and shared
//!   with the telemetry reader
//! - the operation gate, held for a whole calibration, backup, restore or NVS
//!   bracket so those never interleave

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::info;

use super::dualsense::DeviceDescriptor;
use crate::error::{CalibrationError, Result};
use crate::hid::protocol::ReportId;
use crate::hid::{CommandLink, Transport, DEFAULT_POLL_SLICE, DEFAULT_READ_TIMEOUT};

/// Timing used when opening a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub read_timeout: Duration,
    pub poll_slice: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            read_timeout: DEFAULT_READ_TIMEOUT,
            poll_slice: DEFAULT_POLL_SLICE,
        }
    }
}

/// Exclusive ownership of one open controller handle
#[derive(Debug)]
pub struct Session {
    descriptor: DeviceDescriptor,
    transport: Mutex<Transport>,
    gate: Mutex<()>,
    connected: AtomicBool,
}

impl Session {
    pub fn new(descriptor: DeviceDescriptor, transport: Transport) -> Self {
        Self {
            descriptor,
            transport: Mutex::new(transport),
            gate: Mutex::new(()),
            connected: AtomicBool::new(true),
        }
    }

    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Mark the session closed. Later operations fail with `DeviceNotConnected`.
    ///
    /// Waits for a running operation to finish first, so an NVS bracket in
    /// flight still sends its relock. Must not be called while holding an
    /// [`Exclusive`] from this session.
    pub fn close(&self) {
        let _gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        if self.connected.swap(false, Ordering::AcqRel) {
            info!("Closed session for {}", self.descriptor);
        }
    }

    /// Take the operation gate, blocking until any running operation finishes
    ///
    /// # Errors
    ///
    /// Returns `DeviceNotConnected` if the session was closed
    pub fn exclusive(&self) -> Result<Exclusive<'_>> {
        self.ensure_connected()?;
        let gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        // Re-check: close() may have run while we waited on the gate
        self.ensure_connected()?;
        Ok(Exclusive {
            session: self,
            _gate: gate,
        })
    }

    /// Single read of the ordinary input report
    pub fn poll_input(&self, max_len: usize, wait: Duration) -> Result<Option<Vec<u8>>> {
        self.ensure_connected()?;
        self.transport().poll_input(max_len, wait)
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(CalibrationError::DeviceNotConnected)
        }
    }

    fn transport(&self) -> MutexGuard<'_, Transport> {
        self.transport.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Proof that the holder owns the session's operation gate
pub struct Exclusive<'a> {
    session: &'a Session,
    _gate: MutexGuard<'a, ()>,
}

impl Exclusive<'_> {
    pub fn session(&self) -> &Session {
        self.session
    }
}

impl CommandLink for Exclusive<'_> {
    fn send(&self, report: ReportId, payload: &[u8]) -> Result<()> {
        self.session.ensure_connected()?;
        self.session.transport().write(report, payload)
    }

    fn request(&self, report: ReportId, payload: &[u8], expected_len: usize) -> Result<Vec<u8>> {
        self.session.ensure_connected()?;
        self.session
            .transport()
            .request(report, payload, expected_len)
    }
}
