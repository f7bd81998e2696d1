//! Process-wide logging for the proxy.
//!
//! Provides dual output (stdout with colors + file) with thread-safe initialization.

use crate::config::ProxyConfig;
use crate::error::logger::LoggerError;

use common::ErrorLocation;

use std::io::stdout;
use std::panic::Location;
use std::path::Path;
use std::sync::Once;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use fern::Dispatch;
use fern::colors::Color::{Blue, Green, Magenta, Red, Yellow};
use fern::colors::ColoredLevelConfig;
use humantime::format_rfc3339;
use log::{LevelFilter, info, warn};

static INIT_LOGGER_ONCE: Once = Once::new();

static LOGGER_ALREADY_CALLED: AtomicBool = AtomicBool::new(false);

const LOG_FILE_NAME: &str = "tsdproxy.log";

const LOGGER_INITIALIZED_MESSAGE_PREFIX: &str = "Logger initialized with level: ";

const LOGGER_ALREADY_INITIALIZED_MESSAGE: &str = "Logger already initialized";

/// Initialize the logger with dual output (stdout + `{log_dir}/tsdproxy.log`).
///
/// Safe to call more than once: later calls log a warning and return Ok.
///
/// # Errors
///
/// Returns [`LoggerError::Initialize`] if:
/// - Log file cannot be created
/// - Another global logger is already installed
pub fn initialize(log_dir: &Path, level: LevelFilter) -> Result<(), LoggerError> {
    if LOGGER_ALREADY_CALLED.swap(true, Ordering::SeqCst) {
        warn!("{LOGGER_ALREADY_INITIALIZED_MESSAGE}");
        return Ok(());
    }

    let mut result = Ok(());

    INIT_LOGGER_ONCE.call_once(|| {
        result = initialize_internal(log_dir, level);
        if result.is_ok() {
            info!("{LOGGER_INITIALIZED_MESSAGE_PREFIX}{level:?}");
        }
    });

    result
}

/// Initialize the logger from the `[log]` section of a proxy config.
///
/// The file goes to [`ProxyConfig::log_dir`].
///
/// # Errors
///
/// Returns [`LoggerError::Initialize`] if no log directory can be resolved, or
/// for any reason [`initialize`] fails.
pub fn initialize_from(config: &ProxyConfig) -> Result<(), LoggerError> {
    let log_dir = config.log_dir().ok_or_else(|| LoggerError::Initialize {
        message: format!("No log directory for {}: set log.dir or state_dir", config.hostname),
        location: ErrorLocation::from(Location::caller()),
    })?;

    initialize(&log_dir, config.log.level.to_level_filter())
}

fn initialize_internal(log_dir: &Path, level: LevelFilter) -> Result<(), LoggerError> {
    let log_file_path = log_dir.join(LOG_FILE_NAME);

    let color_configuration = ColoredLevelConfig::new()
        .debug(Blue)
        .info(Green)
        .warn(Yellow)
        .error(Red)
        .trace(Magenta);

    let base_dispatch = Dispatch::new().level(level);

    let stdout_dispatch = Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "[{date} - {level}] {message} [{file}:{line}]",
                date = format_rfc3339(SystemTime::now()),
                level = color_configuration.color(record.level()),
                message = message,
                file = record.file().unwrap_or("unknown"),
                line = record.line().unwrap_or(0),
            ))
        })
        .chain(stdout());

    // File dispatch (plain text, no colors)
    let file_dispatch = Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "[{date} - {level}] {message} [{file}:{line}]",
                date = format_rfc3339(SystemTime::now()),
                level = record.level(),
                message = message,
                file = record.file().unwrap_or("unknown"),
                line = record.line().unwrap_or(0)
            ))
        })
        .chain(
            fern::log_file(&log_file_path).map_err(|e| LoggerError::Initialize {
                message: format!("Failed to create log file {}: {e}", log_file_path.display()),
                location: ErrorLocation::from(Location::caller()),
            })?,
        );

    base_dispatch
        .chain(stdout_dispatch)
        .chain(file_dispatch)
        .apply()
        .map_err(|e| LoggerError::Initialize {
            message: format!("Failed to initialize logger: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })?;

    Ok(())
}
