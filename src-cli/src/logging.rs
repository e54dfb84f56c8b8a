//! Structured logging using tracing.
//!
//! Provides:
//! - Human-readable console output on stderr, driven by `-v` or `RUST_LOG`
//! - Optional JSON file output with daily rotation
//!
//! Action lines such as `cp:` or `encode:` are not log events; they go
//! through the core crate's reporter.

use std::path::PathBuf;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer,
    filter::Directive,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Crates whose events are shown at the configured level.
const OWN_CRATES: [&str; 2] = ["tunemirror", "tunemirror_core"];

/// Logging configuration options.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Directory where log files are stored.
    pub log_directory: PathBuf,
    /// Log file name prefix ("tunemirror" -> "tunemirror.2024-01-15.log").
    pub log_file_prefix: String,
    /// Maximum level of our own events on the console.
    pub console_level: Level,
    /// Maximum level of our own events in the log file.
    pub file_level: Level,
    /// How often to rotate log files.
    pub rotation: LogRotation,
    /// Number of rotated files to keep.
    pub max_log_files: usize,
    /// Whether to write the JSON log file at all.
    pub file_logging: bool,
    /// Whether to include ANSI color codes in console output.
    pub console_ansi: bool,
    /// Whether to include the target module in console output.
    pub include_target: bool,
    /// Whether to log span events (enter/exit).
    pub log_span_events: bool,
}

/// Log rotation frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRotation {
    /// Create a new log file every hour.
    Hourly,
    /// Create a new log file every day.
    Daily,
    /// Never rotate (single log file).
    Never,
}

impl From<LogRotation> for Rotation {
    fn from(rotation: LogRotation) -> Self {
        match rotation {
            LogRotation::Hourly => Self::HOURLY,
            LogRotation::Daily => Self::DAILY,
            LogRotation::Never => Self::NEVER,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_directory: default_log_directory(),
            log_file_prefix: "tunemirror".to_string(),
            console_level: Level::WARN,
            file_level: Level::DEBUG,
            rotation: LogRotation::Daily,
            max_log_files: 7,
            file_logging: false,
            console_ansi: true,
            include_target: false,
            log_span_events: false,
        }
    }
}

impl LoggingConfig {
    /// Configuration for a `-v` count: none shows warnings, one shows
    /// progress, two or more show every decision.
    #[must_use]
    pub fn from_verbosity(verbosity: u8) -> Self {
        let console_level = match verbosity {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        };
        Self {
            console_level,
            include_target: verbosity >= 2,
            ..Self::default()
        }
    }

    /// Enable or disable the JSON log file.
    #[must_use]
    pub const fn with_file_logging(mut self, enabled: bool) -> Self {
        self.file_logging = enabled;
        self
    }

    /// Set the log directory.
    #[must_use]
    pub fn with_log_directory(mut self, path: PathBuf) -> Self {
        self.log_directory = path;
        self
    }

    /// Set the log rotation frequency.
    #[must_use]
    pub const fn with_rotation(mut self, rotation: LogRotation) -> Self {
        self.rotation = rotation;
        self
    }
}

/// Keeps file logging active. Dropping it flushes pending log entries.
#[derive(Debug)]
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Initialize the logging system.
///
/// The returned guard must be held until the program exits.
pub fn init(config: &LoggingConfig) -> Result<LoggingGuard, LoggingError> {
    let span_events = if config.log_span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    // RUST_LOG wins over -v
    let console_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => level_filter(Level::WARN, config.console_level)?,
    };

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(config.console_ansi)
        .with_target(config.include_target)
        .with_span_events(span_events.clone())
        .with_filter(console_filter);

    let (file_layer, file_guard) = if config.file_logging {
        if !config.log_directory.exists() {
            std::fs::create_dir_all(&config.log_directory).map_err(|e| {
                LoggingError::DirectoryCreationFailed {
                    path: config.log_directory.clone(),
                    reason: e.to_string(),
                }
            })?;
        }

        let file_appender = RollingFileAppender::builder()
            .rotation(config.rotation.into())
            .filename_prefix(&config.log_file_prefix)
            .filename_suffix("log")
            .max_log_files(config.max_log_files)
            .build(&config.log_directory)
            .map_err(|e| LoggingError::AppenderFailed(e.to_string()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let layer = fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_span_events(span_events)
            .json()
            .with_filter(level_filter(Level::INFO, config.file_level)?);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

/// Filter showing `base` for dependencies and `own` for our crates.
fn level_filter(base: Level, own: Level) -> Result<EnvFilter, LoggingError> {
    let mut filter = EnvFilter::new(level_to_directive(base));
    for krate in OWN_CRATES {
        let directive: Directive = format!("{krate}={}", level_to_directive(own))
            .parse()
            .map_err(|e: tracing_subscriber::filter::ParseError| {
                LoggingError::InvalidFilter(e.to_string())
            })?;
        filter = filter.add_directive(directive);
    }
    Ok(filter)
}

/// Get the default log directory.
#[must_use]
pub fn default_log_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tunemirror")
        .join("logs")
}

const fn level_to_directive(level: Level) -> &'static str {
    match level {
        Level::TRACE => "trace",
        Level::DEBUG => "debug",
        Level::INFO => "info",
        Level::WARN => "warn",
        Level::ERROR => "error",
    }
}

/// Errors that can occur during logging initialization.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// Failed to create the log directory.
    #[error("Failed to create log directory {path}: {reason}")]
    DirectoryCreationFailed {
        /// The path that could not be created.
        path: PathBuf,
        /// The reason for the failure.
        reason: String,
    },

    /// The rolling file appender could not be set up.
    #[error("Failed to open log file: {0}")]
    AppenderFailed(String),

    /// A filter directive did not parse.
    #[error("Invalid log filter: {0}")]
    InvalidFilter(String),

    /// A global subscriber was already installed.
    #[error("Logging already initialized: {0}")]
    AlreadyInitialized(String),
}
