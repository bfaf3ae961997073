// src/logging.rs

//! Subscriber setup for the `initdag` binary.
//!
//! The filter comes from `--log-level` if given, otherwise from the
//! `INITDAG_LOG` variable (any `EnvFilter` directive, e.g.
//! `initdag::gate=debug,info`), otherwise `info`. Output goes to stderr so
//! stdout only carries what the `[ready]` command prints.

use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::LogLevel;

pub const LOG_ENV_VAR: &str = "INITDAG_LOG";

pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    fmt()
        .with_env_filter(build_filter(cli_level))
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("installing tracing subscriber: {e}"))
}

fn build_filter(cli_level: Option<LogLevel>) -> EnvFilter {
    match cli_level {
        Some(level) => EnvFilter::new(level.as_directive()),
        None => EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("info")),
    }
}
