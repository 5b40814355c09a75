//! Structured logging for the station analysis service
//!
//! Every entry carries the analysis component and, where one applies, the
//! station identifier. Entries are emitted through `tracing`; `init_logger`
//! installs a console subscriber and optionally mirrors to an append-only
//! log file for batch runs. Without `init_logger` every call is a no-op.

use std::fmt;
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Log Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    fn directive(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Flags,
    Baseline,
    Classifier,
    Qa,
    Ensemble,
    Report,
    Ingest,
    Config,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Flags => write!(f, "FLAGS"),
            Component::Baseline => write!(f, "BASELINE"),
            Component::Classifier => write!(f, "CLASSIFY"),
            Component::Qa => write!(f, "QA"),
            Component::Ensemble => write!(f, "ENSEMBLE"),
            Component::Report => write!(f, "REPORT"),
            Component::Ingest => write!(f, "INGEST"),
            Component::Config => write!(f, "CONFIG"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureType {
    /// Expected failure - sparse station history, short request window
    Expected,
    /// Unexpected failure - indicates caller misuse or a configuration issue
    Unexpected,
    /// Unknown - cannot determine if this is expected or not
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

// ---------------------------------------------------------------------------
// Logger Configuration
// ---------------------------------------------------------------------------

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `min_level` when set. A second call is ignored.
pub fn init_logger(min_level: LogLevel, log_file: Option<&str>, console_timestamps: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(min_level.directive()));

    let file = log_file.and_then(|path| {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Some(file),
            Err(e) => {
                eprintln!("Failed to open log file {}: {}", path, e);
                None
            }
        }
    });

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    let result = match (file, console_timestamps) {
        (Some(file), _) => builder.with_ansi(false).with_writer(Mutex::new(file)).try_init(),
        (None, true) => builder.try_init(),
        (None, false) => builder.without_time().try_init(),
    };
    // Already initialised by an earlier call or by the embedding application.
    let _ = result;
}

// ---------------------------------------------------------------------------
// Public Logging Functions
// ---------------------------------------------------------------------------

/// Log a general informational message
pub fn info(component: Component, station_id: Option<&str>, message: &str) {
    tracing::info!(component = %component, station = station_id.unwrap_or("-"), "{}", message);
}

/// Log a warning message
pub fn warn(component: Component, station_id: Option<&str>, message: &str) {
    tracing::warn!(component = %component, station = station_id.unwrap_or("-"), "{}", message);
}

/// Log an error message
pub fn error(component: Component, station_id: Option<&str>, message: &str) {
    tracing::error!(component = %component, station = station_id.unwrap_or("-"), "{}", message);
}

/// Log a debug message
pub fn debug(component: Component, station_id: Option<&str>, message: &str) {
    tracing::debug!(component = %component, station = station_id.unwrap_or("-"), "{}", message);
}

// ---------------------------------------------------------------------------
// Failure Classification Helpers
// ---------------------------------------------------------------------------

/// Classify an analysis failure from its rendered error message.
pub fn classify_analysis_failure(error_message: &str) -> FailureType {
    // A station with no data in the requested window is routine for sparse
    // networks and should not page anyone.
    if error_message.contains("No data available") {
        FailureType::Expected
    }
    // Training before use, absent feature columns, bad config: caller misuse.
    else if error_message.contains("must be trained")
        || error_message.contains("Configuration error")
        || error_message.contains("entirely absent")
    {
        FailureType::Unexpected
    } else {
        FailureType::Unknown
    }
}

/// Log an analysis failure with automatic classification
pub fn log_analysis_failure(station_id: &str, operation: &str, err: &dyn std::error::Error) {
    let error_msg = err.to_string();
    let failure_type = classify_analysis_failure(&error_msg);

    let message = format!("{} failed [{}]: {}", operation, failure_type, error_msg);

    match failure_type {
        FailureType::Expected => debug(Component::Report, Some(station_id), &message),
        FailureType::Unexpected => error(Component::Report, Some(station_id), &message),
        FailureType::Unknown => warn(Component::Report, Some(station_id), &message),
    }
}

// ---------------------------------------------------------------------------
// Summary Logging
// ---------------------------------------------------------------------------

/// Log a summary of one station analysis run
pub fn log_analysis_summary(station_id: &str, records: usize, anomalies: usize, qa_score: f64) {
    let message = format!(
        "Analysis complete: {} records, {} anomalies, QA score {:.0}/100",
        records, anomalies, qa_score
    );

    if records == 0 {
        warn(Component::Report, Some(station_id), &message);
    } else {
        info(Component::Report, Some(station_id), &message);
    }
}
