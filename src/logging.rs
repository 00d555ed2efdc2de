//! Process-wide logging bootstrap.
//!
//! Library code only uses the `log` macros. The binary calls [`init_logging`]
//! once; the backend writes to stderr so stdout stays clean for reports.
//!
//! # Invariants
//! - Initialization is idempotent for the same level.
//! - Re-initialization with a different level is rejected.
//! - `RUST_LOG`, when set, overrides the requested level.

use flexi_logger::{Logger, LoggerHandle, WriteMode};
use log::info;
use once_cell::sync::OnceCell;

use crate::error::{AppError, EXIT_INPUT};

static LOGGING_STATE: OnceCell<LoggingState> = OnceCell::new();

struct LoggingState {
    level: String,
    _logger: LoggerHandle,
}

/// Start the stderr logger at `level` (`error`, `warn`, `info`, `debug`, `trace`).
pub fn init_logging(level: &str) -> Result<(), AppError> {
    let level = normalize_level(level)?;

    let state = LOGGING_STATE.get_or_try_init(|| -> Result<LoggingState, AppError> {
        let logger = Logger::try_with_env_or_str(level)
            .map_err(|e| AppError::new(EXIT_INPUT, format!("Invalid log level `{level}`: {e}")))?
            .log_to_stderr()
            .write_mode(WriteMode::Direct)
            .format(flexi_logger::default_format)
            .start()
            .map_err(|e| AppError::new(EXIT_INPUT, format!("Failed to start logger: {e}")))?;

        info!(
            "event=app_start version={} level={level}",
            env!("CARGO_PKG_VERSION")
        );
        Ok(LoggingState {
            level: level.to_string(),
            _logger: logger,
        })
    })?;

    if state.level != level {
        return Err(AppError::new(
            EXIT_INPUT,
            format!(
                "Logging already initialized with level `{}`; refusing to switch to `{level}`.",
                state.level
            ),
        ));
    }
    Ok(())
}

fn normalize_level(level: &str) -> Result<&'static str, AppError> {
    match level.trim().to_ascii_lowercase().as_str() {
        "error" => Ok("error"),
        "warn" | "warning" => Ok("warn"),
        "info" => Ok("info"),
        "debug" => Ok("debug"),
        "trace" => Ok("trace"),
        other => Err(AppError::new(
            EXIT_INPUT,
            format!("Unsupported log level `{other}` (use error|warn|info|debug|trace)."),
        )),
    }
}
