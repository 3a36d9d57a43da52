//! Logging setup for the agent binary.
//!
//! The agent has no interactive failure surface, so the log stream is where
//! every skipped database, failed query and dropped report shows up.

use crate::{InventoryError, Result};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable single-line text
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Logging options collected from the command line.
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    /// Verbosity level (0=INFO, 1=DEBUG, 2+=TRACE)
    pub verbose: u8,
    /// If true, only show ERROR level logs
    pub quiet: bool,
    /// Append logs to this file instead of stderr
    pub file: Option<PathBuf>,
    /// Line format
    pub format: LogFormat,
}

impl LogOptions {
    /// Maximum level enabled by these options.
    pub fn level(&self) -> tracing::Level {
        level_for(self.verbose, self.quiet)
    }
}

fn level_for(verbose: u8, quiet: bool) -> tracing::Level {
    match (quiet, verbose) {
        (true, _) => tracing::Level::ERROR,
        (false, 0) => tracing::Level::INFO,
        (false, 1) => tracing::Level::DEBUG,
        (false, _) => tracing::Level::TRACE,
    }
}

/// Initializes structured logging.
///
/// # Errors
/// Returns an error if the log file cannot be opened or a global subscriber
/// is already installed
///
/// # Example
/// ```rust,no_run
/// use dbinventory_core::logging::{LogOptions, init_logging};
///
/// init_logging(&LogOptions { verbose: 1, ..LogOptions::default() })
///     .expect("Failed to initialize logging");
/// ```
pub fn init_logging(options: &LogOptions) -> Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_max_level(options.level())
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let result = match (&options.file, options.format) {
        (Some(path), format) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| InventoryError::Io {
                    context: format!("Failed to open log file {}", path.display()),
                    source: e,
                })?;
            let builder = builder.with_ansi(false).with_writer(Mutex::new(file));
            match format {
                LogFormat::Text => builder.try_init(),
                LogFormat::Json => builder.json().try_init(),
            }
        }
        (None, LogFormat::Text) => builder.try_init(),
        (None, LogFormat::Json) => builder.json().try_init(),
    };

    result.map_err(|e| {
        InventoryError::configuration(format!("Failed to initialize logging: {}", e))
    })
}
