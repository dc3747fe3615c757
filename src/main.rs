//! # DualSense Calibrator
//!
//! Recalibrate the analog sticks of a PS5 DualSense controller.
//!
//! Every device command connects to the first calibratable controller,
//! creates a calibration backup on first use and then performs the
//! requested operation. Device I/O runs on a blocking worker thread.

use std::io::{self, stdout, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use bpaf::Bpaf;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use dualsense_calibrator::calibration::DeadzoneOffset;
use dualsense_calibrator::calibrator::{AutoBackup, Calibrator};
use dualsense_calibrator::config::{Config, LoggingConfig};
use dualsense_calibrator::error::CalibrationError;
use dualsense_calibrator::telemetry::StickPosition;

/// Rolling log file name prefix
const LOG_FILE_PREFIX: &str = "dualsense-calibrator.log";

#[derive(Clone, Debug, Bpaf)]
#[bpaf(options, version, descr(env!("CARGO_PKG_DESCRIPTION")))]
struct Cli {
    /// Path to a TOML config file
    #[bpaf(short, long, argument("PATH"))]
    config: Option<PathBuf>,
    #[bpaf(external(command))]
    command: Command,
}

#[derive(Clone, Debug, Bpaf)]
enum Command {
    /// List attached controllers that can be calibrated
    #[bpaf(command)]
    List,
    /// Show live stick positions until Ctrl+C
    #[bpaf(command)]
    Monitor,
    Device(#[bpaf(external(device_command))] DeviceCommand),
}

#[derive(Clone, Debug, Bpaf)]
enum DeviceCommand {
    /// Connect and create the first calibration backup
    #[bpaf(command)]
    Connect,
    /// Calibrate the stick centers interactively
    #[bpaf(command)]
    Center {
        /// Deadzone offset pulled toward the center (0-20)
        #[bpaf(short, long, argument("N"))]
        offset: Option<u8>,
        /// Store the calibration so it survives a power cycle
        #[bpaf(short, long)]
        permanent: bool,
    },
    /// Calibrate the stick min/max range
    #[bpaf(command)]
    Range {
        /// Store the calibration so it survives a power cycle
        #[bpaf(short, long)]
        permanent: bool,
    },
    /// Overwrite the backup with the current calibration
    #[bpaf(command)]
    Backup,
    /// Write the backed up calibration back to the controller
    #[bpaf(command)]
    Restore,
    /// Relock the controller's NVS after an interrupted permanent calibration
    #[bpaf(command)]
    Relock,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli().run();
    let config = Config::load_or_default(cli.config.as_deref())
        .context("Failed to load configuration")?;
    let _log_guard = init_logging(&config.logging);

    info!("DualSense Calibrator v{} starting...", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::List => blocking(list_devices).await,
        Command::Monitor => monitor(config).await,
        Command::Device(command) => blocking(move || run_device_command(config, command)).await,
    }
}

/// Log to stderr, and to a daily rolling file when `log_dir` is set
fn init_logging(logging: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let (file_layer, guard) = if logging.log_dir.is_empty() {
        (None, None)
    } else {
        let appender = tracing_appender::rolling::daily(&logging.log_dir, LOG_FILE_PREFIX);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer().with_ansi(false).with_writer(writer);
        (Some(layer), Some(guard))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .init();

    guard
}

/// Run blocking device work off the async runtime
async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await?
}

fn list_devices() -> Result<()> {
    let devices = Calibrator::list_devices()?;
    if devices.is_empty() {
        println!("No DualSense controllers found");
    }
    for device in devices {
        println!("{}", device);
    }
    Ok(())
}

fn connect(config: Config) -> Result<Calibrator> {
    let mut calibrator = Calibrator::from_config(config)?;
    let outcome = calibrator.connect()?;

    println!("Connected to {}", outcome.descriptor);
    match outcome.auto_backup {
        AutoBackup::Created(backup) => {
            println!("Saved a backup of the current calibration ({} records)", backup.len())
        }
        AutoBackup::Failed => println!("Warning: could not back up the current calibration"),
        AutoBackup::Disabled | AutoBackup::AlreadyPresent => {}
    }

    Ok(calibrator)
}

fn run_device_command(config: Config, command: DeviceCommand) -> Result<()> {
    let mut calibrator = connect(config)?;
    let default_permanent = calibrator.make_permanent();

    match command {
        DeviceCommand::Connect => {}
        DeviceCommand::Center { offset, permanent } => {
            if let Some(offset) = offset {
                calibrator.set_deadzone_offset(offset)?;
            }
            center(&calibrator, permanent || default_permanent)?;
        }
        DeviceCommand::Range { permanent } => {
            range(&calibrator, permanent || default_permanent)?;
        }
        DeviceCommand::Backup => {
            let backup = calibrator.backup()?;
            println!("Backed up {} calibration records", backup.len());
        }
        DeviceCommand::Restore => {
            let restored = calibrator.restore()?;
            println!("Restored {} calibration records", restored.len());
        }
        DeviceCommand::Relock => {
            calibrator.relock_nvs()?;
            println!("NVS relocked");
        }
    }

    calibrator.disconnect();
    Ok(())
}

fn center(calibrator: &Calibrator, permanent: bool) -> Result<()> {
    let offset = calibrator.deadzone_offset();
    println!(
        "Center calibration (offset {}, deadzone radius {}{})",
        offset,
        offset.visual_radius(),
        if permanent { ", permanent" } else { "" }
    );
    println!("Leave both sticks at rest. [r] sample, [s] save, [q] abort");

    let saved = calibrator.center_calibration(permanent, |mut center| loop {
        match prompt("> ")?.as_str() {
            "r" => {
                let sample = center.sample()?;
                println!("Sample {:?} (axis {})", sample.to_bytes(), sample.axis_low);
            }
            "s" => return center.save(offset),
            "q" => return Err(aborted("center calibration aborted")),
            other => println!("Unknown choice '{}'", other),
        }
    })?;

    println!(
        "Saved: axis {} -> {}",
        saved.sample.axis_low, saved.written[3]
    );
    Ok(())
}

fn range(calibrator: &Calibrator, permanent: bool) -> Result<()> {
    println!(
        "Min/max calibration{}",
        if permanent { " (permanent)" } else { "" }
    );

    calibrator.range_calibration(permanent, || {
        println!("Move both sticks slowly through their full range a few times.");
        range_gate(&prompt("Press Enter when done, [q] to abort ")?)
    })?;

    println!("Range calibration saved");
    Ok(())
}

/// Answer to the range prompt; `q` (also end of input) aborts before commit
fn range_gate(answer: &str) -> std::result::Result<(), CalibrationError> {
    if answer == "q" {
        return Err(aborted("range calibration aborted"));
    }
    Ok(())
}

fn aborted(message: &str) -> CalibrationError {
    CalibrationError::Io(io::Error::new(io::ErrorKind::Interrupted, message.to_string()))
}

/// Read one trimmed line from stdin; end of input reads as `q`
fn prompt(message: &str) -> io::Result<String> {
    print!("{}", message);
    stdout().flush()?;

    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok("q".to_string());
    }
    Ok(line.trim().to_lowercase())
}

async fn monitor(mut config: Config) -> Result<()> {
    config.telemetry.enabled = true;

    let (calibrator, mut positions) = blocking(move || {
        let calibrator = connect(config)?;
        let positions = calibrator
            .subscribe()
            .context("Telemetry is not running")?;
        Ok((calibrator, positions))
    })
    .await?;

    let offset = calibrator.deadzone_offset();
    println!("Press Ctrl+C to exit");

    loop {
        tokio::select! {
            changed = positions.changed() => {
                if changed.is_err() {
                    break;
                }
                let position = *positions.borrow_and_update();
                print!("\r{}", render_position(&position, offset));
                stdout().flush()?;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }
    println!();

    // Joining the telemetry thread blocks
    blocking(move || {
        drop(calibrator);
        Ok(())
    })
    .await
}

/// One status line; `*` marks a stick resting inside the deadzone radius
fn render_position(position: &StickPosition, offset: DeadzoneOffset) -> String {
    let radius = offset.visual_radius() as i32;
    let marker = |(x, y): (u8, u8)| {
        let dx = i32::from(x) - 128;
        let dy = i32::from(y) - 128;
        if dx * dx + dy * dy <= radius * radius {
            '*'
        } else {
            ' '
        }
    };

    let (lx, ly) = position.left();
    let (rx, ry) = position.right();
    format!(
        "L ({:3}, {:3}){}  R ({:3}, {:3}){}",
        lx,
        ly,
        marker(position.left()),
        rx,
        ry,
        marker(position.right())
    )
}
