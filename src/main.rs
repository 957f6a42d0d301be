//! # Sensor Datalogger
//!
//! Logs line-oriented telemetry from a remote sensor board.
//!
//! Connects to the board over a serial device (USB or a bound RFCOMM TTY) or TCP,
//! charts nothing itself, and writes every accepted record to a CSV session log.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::future::Future;
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use sensor_datalogger::config::Config;
use sensor_datalogger::events::{Event, EventReceiver};
use sensor_datalogger::logger::DataLogger;
use sensor_datalogger::transport::ConnectionState;

/// File name prefix of the diagnostic log written with `--log-file`
const DIAGNOSTIC_LOG_PREFIX: &str = "sensor-datalogger.log";

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Toggle {
    On,
    Off,
}

/// Log telemetry from a remote sensor board
#[derive(Debug, Parser)]
#[command(name = "sensor-datalogger", version, about)]
struct Opts {
    /// TOML configuration file (defaults apply when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Channel profile to load before connecting
    #[arg(short, long)]
    profile: Option<String>,

    /// Switch the board's periodic reporting on or off after connecting
    #[arg(long, value_enum)]
    auto_update: Option<Toggle>,

    /// Directory for a daily-rolling diagnostic log
    #[arg(long, value_name = "DIR")]
    log_file: Option<PathBuf>,
}

/// Main entry point for the sensor datalogger
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Set up logging with tracing subscriber
///    - Load configuration and the requested channel profile
///    - Connect and optionally toggle auto-update
///
/// 2. **Main Loop**
///    - Report pipeline events until the link is lost
///    - Handle Ctrl+C for graceful shutdown
///
/// 3. **Graceful Shutdown**
///    - Stop the receive loop and close the session log
///    - Log ingest statistics
///
/// # Errors
///
/// Returns error if:
/// - Configuration or profile cannot be loaded
/// - The board cannot be reached
#[tokio::main]
async fn main() -> Result<()> {
    let opts = Opts::parse();
    let _guard = init_tracing(opts.log_file.as_deref());

    info!("Sensor Datalogger v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = match &opts.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };

    let (mut logger, mut events) = DataLogger::new(config);

    if let Some(name) = &opts.profile {
        let count = logger
            .load_profile(name)
            .with_context(|| format!("Failed to load profile '{}'", name))?;
        info!("Profile '{}' loaded ({} channels)", name, count);
    }

    logger.connect().await.context("Failed to connect")?;

    if let Some(toggle) = opts.auto_update {
        logger.set_auto_update(toggle == Toggle::On).await?;
    }

    info!("Press Ctrl+C to exit");

    let state = logger.watch_state();
    match pump_events(&mut events, state, tokio::signal::ctrl_c()).await {
        Shutdown::Interrupted => info!("Received Ctrl+C, shutting down..."),
        Shutdown::LinkLost => warn!("Connection lost, shutting down..."),
        Shutdown::EventsClosed => debug!("Event queue closed, shutting down..."),
    }

    logger.disconnect().await;

    let stats = logger.stats();
    info!(
        "Lines: {}, accepted: {}, malformed: {}, rejected: {}, transform errors: {}, persist errors: {}, overflows: {}, dropped events: {}",
        stats.lines,
        stats.accepted,
        stats.malformed,
        stats.rejected,
        stats.transform_errors,
        stats.persist_errors,
        stats.overflows,
        logger.dropped_events()
    );

    Ok(())
}

/// Console logging, plus a daily-rolling file under `log_dir` if given.
///
/// The returned guard flushes the file writer when dropped.
fn init_tracing(log_dir: Option<&std::path::Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, DIAGNOSTIC_LOG_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();

    guard
}

/// Why the event loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shutdown {
    Interrupted,
    LinkLost,
    EventsClosed,
}

/// Reports events until `interrupt` fires or the link is lost.
///
/// Loss is taken from the state watch as well as the event queue, since a full
/// queue may have dropped the `Lost` event.
async fn pump_events<F: Future>(
    events: &mut EventReceiver,
    mut state: watch::Receiver<ConnectionState>,
    interrupt: F,
) -> Shutdown {
    tokio::pin!(interrupt);

    loop {
        tokio::select! {
            biased;

            _ = &mut interrupt => return Shutdown::Interrupted,

            lost = state.wait_for(|s| *s == ConnectionState::Lost) => {
                return match lost {
                    Ok(_) => Shutdown::LinkLost,
                    Err(_) => Shutdown::EventsClosed,
                };
            }

            event = events.recv() => match event {
                Some(Event::ConnectionStateChanged(ConnectionState::Lost)) => {
                    return Shutdown::LinkLost;
                }
                Some(event) => report(&event),
                None => return Shutdown::EventsClosed,
            },
        }
    }
}

fn report(event: &Event) {
    match event {
        Event::ConnectionStateChanged(state) => debug!("State event: {}", state),
        Event::LineReceived(line) => debug!("<- {}", line),
        Event::SampleAppended { channel, sample } => {
            debug!("Channel {}: t={} value={}", channel, sample.timestamp, sample.value);
        }
        Event::RecordRejected(reason) => debug!("Rejected: {}", reason),
        Event::DecodeError(reason) => debug!("Undecodable line: {}", reason),
        Event::Notice { title, message } => warn!("{}: {}", title, message),
    }
}
