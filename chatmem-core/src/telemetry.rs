//! Tracing subscriber setup for applications embedding chatmem.
//!
//! The library itself only emits `tracing` events; call [`init`] once at
//! startup to print them. `RUST_LOG` overrides the configured level.

use tracing_subscriber::EnvFilter;

use crate::config::GeneralConfig;
use crate::error::{ChatmemError, Result};

/// Install a global `fmt` subscriber configured from `config`.
///
/// # Errors
///
/// Returns [`ChatmemError::Config`] if the log filter is invalid or a
/// global subscriber is already installed.
pub fn init(config: &GeneralConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_level)
            .map_err(|e| ChatmemError::Config(format!("invalid log filter: {e}")))?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_line_number(true);

    let installed = if config.json_logs {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| ChatmemError::Config(format!("tracing already initialised: {e}")))
}
