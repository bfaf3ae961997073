// src/cli.rs

//! Command-line interface (`clap` derive).

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::ConfigSection;

/// Run the initializers of a plan in dependency order and wait until every
/// one of them is ready.
#[derive(Debug, Clone, Parser)]
#[command(name = "initdag", version, long_about = None)]
pub struct CliArgs {
    /// Plan file (TOML).
    #[arg(long, value_name = "PATH", default_value = "Initdag.toml")]
    pub plan: PathBuf,

    /// Override `[config].poll_interval_ms`.
    #[arg(long, value_name = "MS")]
    pub poll_interval_ms: Option<u64>,

    /// Override `[config].gate_timeout_ms`.
    #[arg(long, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Logging level. Falls back to `INITDAG_LOG`, then `info`.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Validate and print the plan without running anything.
    #[arg(long)]
    pub dry_run: bool,
}

impl CliArgs {
    /// Args for running `plan` with everything else at its default.
    pub fn for_plan(plan: impl Into<PathBuf>) -> Self {
        Self {
            plan: plan.into(),
            poll_interval_ms: None,
            timeout_ms: None,
            log_level: None,
            dry_run: false,
        }
    }

    /// Apply command-line overrides on top of the plan's `[config]`.
    pub fn apply_overrides(&self, config: &mut ConfigSection) {
        if let Some(ms) = self.poll_interval_ms {
            config.poll_interval_ms = ms;
        }
        if let Some(ms) = self.timeout_ms {
            config.gate_timeout_ms = Some(ms);
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Filter directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

pub fn parse() -> CliArgs {
    CliArgs::parse()
}
