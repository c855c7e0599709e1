//! Logger setup for the `dce` binary.
//!
//! The library only talks to the `log` facade. The binary routes records to
//! stderr so stdout stays reserved for reports.

use flexi_logger::{Logger, LoggerHandle};

use crate::error::AppError;

/// Start the stderr logger.
///
/// `RUST_LOG` (possibly loaded from `.env`) takes precedence over
/// `base_level`. The returned handle must stay alive for the whole run.
pub fn setup_logging(base_level: &str) -> Result<LoggerHandle, AppError> {
    Logger::try_with_env_or_str(base_level)
        .map_err(|e| AppError::new(2, format!("Invalid log specification '{base_level}': {e}")))?
        .log_to_stderr()
        .format(flexi_logger::default_format)
        .start()
        .map_err(|e| AppError::new(2, format!("Logger initialization failed: {e}")))
}
