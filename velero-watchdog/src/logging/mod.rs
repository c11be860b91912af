//! Logging setup.
//!
//! Console output always; an optional rolling log file when file logging
//! is enabled. `RUST_LOG` overrides the configured level.

use std::path::PathBuf;

use chrono::Local;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Filter applied to dependencies regardless of the configured level.
const DEPENDENCY_FILTER: &str = "kube=warn,hyper=warn,reqwest=warn,rustls=warn";

/// Timestamps in the server's local timezone.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// Logging options.
#[derive(Debug, Clone)]
pub struct LoggingSettings {
    /// Level for the watchdog's own events (`trace`..`error`).
    pub level: String,
    /// Also write to a rolling file.
    pub save_to_file: bool,
    /// Directory holding log files.
    pub folder: PathBuf,
    /// Log file name prefix.
    pub filename: String,
    /// Number of rotated files to keep.
    pub max_files: usize,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            save_to_file: false,
            folder: PathBuf::from("./logs"),
            filename: "velero-watchdog.log".to_string(),
            max_files: 5,
        }
    }
}

impl LoggingSettings {
    /// Filter directive derived from the configured level.
    pub fn filter_directive(&self) -> String {
        format!("velero_watchdog={},{}", self.level, DEPENDENCY_FILTER)
    }
}

/// Install the global subscriber.
///
/// Returns the file writer guard when file logging is enabled; keep it
/// alive for the lifetime of the process so buffered lines are flushed.
pub fn init_logging(settings: &LoggingSettings) -> crate::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.filter_directive()));

    let console = fmt::layer().with_ansi(true).with_timer(LocalTimer).boxed();

    let (file, guard) = if settings.save_to_file {
        std::fs::create_dir_all(&settings.folder)?;

        let appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix(&settings.filename)
            .max_log_files(settings.max_files.max(1))
            .build(&settings.folder)
            .map_err(|e| crate::Error::Other(format!("Failed to create log file: {}", e)))?;

        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_timer(LocalTimer)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| {
            crate::Error::Other(format!("Failed to set global default subscriber: {}", e))
        })?;

    Ok(guard)
}
