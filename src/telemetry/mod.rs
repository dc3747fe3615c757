//! # Telemetry Module
//!
//! Live stick positions sampled from the ordinary gamepad input report.
//!
//! This module handles:
//! - A dedicated sampling thread for the lifetime of a session
//! - Extracting (lx, ly, rx, ry) from bytes 1..=4 of each report
//! - Publishing the latest position into a single-slot watch channel
//! - Logging and skipping failed reads without stopping the stream
//!
//! Consumers only ever see the newest sample; there is no queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use crate::controller::Session;
use crate::error::{CalibrationError, Result};
use crate::hid::protocol::AXIS_CENTER;

/// Default sampling period (~50 Hz)
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(20);

/// Default input report buffer size
pub const DEFAULT_REPORT_LEN: usize = 64;

/// Shortest report that carries both sticks
pub const MIN_REPORT_LEN: usize = 5;

/// Number of samples between status log messages
const LOG_INTERVAL_SAMPLES: u64 = 500;

/// Raw stick axes, 128 = centered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StickPosition {
    pub lx: u8,
    pub ly: u8,
    pub rx: u8,
    pub ry: u8,
}

impl Default for StickPosition {
    fn default() -> Self {
        Self {
            lx: AXIS_CENTER,
            ly: AXIS_CENTER,
            rx: AXIS_CENTER,
            ry: AXIS_CENTER,
        }
    }
}

impl StickPosition {
    /// Extract stick axes from an input report, `None` when it is too short
    pub fn from_report(report: &[u8]) -> Option<Self> {
        if report.len() < MIN_REPORT_LEN {
            return None;
        }
        Some(Self {
            lx: report[1],
            ly: report[2],
            rx: report[3],
            ry: report[4],
        })
    }

    pub fn left(&self) -> (u8, u8) {
        (self.lx, self.ly)
    }

    pub fn right(&self) -> (u8, u8) {
        (self.rx, self.ry)
    }
}

/// Sampling parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetrySettings {
    pub interval: Duration,
    pub report_len: usize,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            report_len: DEFAULT_REPORT_LEN,
        }
    }
}

/// Result of one sampling step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// A new position was published
    Published(StickPosition),
    /// A report arrived but was too short
    Ignored,
    /// Nothing arrived this period
    Quiet,
    /// The read failed; logged and skipped
    Failed,
    /// The session is closed
    Disconnected,
}

/// Read one input report and publish it if it carries stick data
pub fn poll_once(
    session: &Session,
    tx: &watch::Sender<StickPosition>,
    settings: &TelemetrySettings,
) -> PollOutcome {
    match session.poll_input(settings.report_len, settings.interval) {
        Ok(Some(report)) => match StickPosition::from_report(&report) {
            Some(position) => {
                tx.send_replace(position);
                PollOutcome::Published(position)
            }
            None => {
                trace!("Ignoring {} byte input report", report.len());
                PollOutcome::Ignored
            }
        },
        Ok(None) => PollOutcome::Quiet,
        Err(CalibrationError::DeviceNotConnected) => PollOutcome::Disconnected,
        Err(e) => {
            warn!("Polling error: {}", e);
            PollOutcome::Failed
        }
    }
}

/// Background stick sampler bound to one session
///
/// Stops when [`TelemetryStream::stop`] is called, when the session closes,
/// or on drop. A stopped stream cannot be restarted.
pub struct TelemetryStream {
    stop: Arc<AtomicBool>,
    latest: watch::Receiver<StickPosition>,
    handle: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for TelemetryStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryStream")
            .field("latest", &*self.latest.borrow())
            .field("running", &self.is_running())
            .finish()
    }
}

impl TelemetryStream {
    /// Start sampling on a dedicated thread
    ///
    /// # Errors
    ///
    /// Returns `Io` if the thread cannot be spawned
    pub fn spawn(session: Arc<Session>, settings: TelemetrySettings) -> Result<Self> {
        let (tx, latest) = watch::channel(StickPosition::default());
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("stick-telemetry".to_string())
            .spawn(move || run(&session, &tx, &settings, &stop_flag))?;

        info!(
            "Telemetry started ({}ms interval)",
            settings.interval.as_millis()
        );

        Ok(Self {
            stop,
            latest,
            handle: Some(handle),
        })
    }

    /// Most recent stick position
    pub fn latest(&self) -> StickPosition {
        *self.latest.borrow()
    }

    /// Receiver that observes every published update
    pub fn subscribe(&self) -> watch::Receiver<StickPosition> {
        self.latest.clone()
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop sampling and wait for the thread to exit
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Telemetry thread panicked");
            }
        }
    }
}

impl Drop for TelemetryStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(
    session: &Session,
    tx: &watch::Sender<StickPosition>,
    settings: &TelemetrySettings,
    stop: &AtomicBool,
) {
    let mut samples: u64 = 0;

    while !stop.load(Ordering::Acquire) {
        match poll_once(session, tx, settings) {
            PollOutcome::Published(position) => {
                samples += 1;
                if samples % LOG_INTERVAL_SAMPLES == 0 {
                    debug!("Telemetry: {} samples, latest {:?}", samples, position);
                }
                thread::sleep(settings.interval);
            }
            PollOutcome::Disconnected => {
                info!("Session closed, telemetry stopping");
                break;
            }
            PollOutcome::Quiet => {}
            PollOutcome::Ignored | PollOutcome::Failed => {
                thread::sleep(settings.interval);
            }
        }
    }

    info!("Telemetry stopped after {} samples", samples);
}
