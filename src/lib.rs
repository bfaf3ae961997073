// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod gate;
pub mod logging;
pub mod registry;
pub mod types;
pub mod wait;

pub use errors::{InitdagError, TaskFailure};
pub use gate::ReadinessGate;
pub use registry::{Scheduler, TaskContext, TaskRunState};
pub use types::{ActionOutput, Capability, ProvidedEntry, TaskValue, NO_CAPABILITIES};

use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::{PlanFile, SchedulerOptions};
use crate::exec::{dependency_env, register_plan, run_command, CommandSpec};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - plan loading and validation
/// - scheduler + one command initializer per `[[task]]`
/// - the readiness gate (with the optional `gate_timeout_ms`)
/// - the `[ready]` command
pub async fn run(args: CliArgs) -> Result<()> {
    let mut plan = load_and_validate(&args.plan)?;
    args.apply_overrides(&mut plan.config);
    if plan.config.poll_interval_ms == 0 {
        return Err(InitdagError::ConfigError("--poll-interval-ms must be >= 1".to_string()).into());
    }

    if args.dry_run {
        print_dry_run(&plan);
        return Ok(());
    }

    let scheduler = Scheduler::with_options(SchedulerOptions::from(&plan.config));
    register_plan(&scheduler, &plan)?;
    info!(tasks = plan.task.len(), "plan registered; arming readiness gate");

    let gate = scheduler.arm(|scheduler| {
        info!(
            provided = ?scheduler.provided_tokens(),
            "all initializers completed"
        );
    })?;

    match plan.config.gate_timeout_ms {
        Some(ms) => {
            let limit = Duration::from_millis(ms);
            tokio::time::timeout(limit, gate)
                .await
                .map_err(|_| InitdagError::Timeout(limit))??;
        }
        None => gate.await?,
    }

    if let Some(ready) = &plan.ready {
        let spec = CommandSpec {
            name: "ready".to_string(),
            cmd: ready.cmd.clone(),
            depends: scheduler.provided_tokens(),
        };
        let env = dependency_env(&spec.depends, &scheduler);
        let output = run_command(spec, env).await?;
        if !output.is_empty() {
            println!("{output}");
        }
    }

    info!("initialization complete");
    Ok(())
}

/// Simple dry-run output: tasks in registration order with their tokens.
fn print_dry_run(plan: &PlanFile) {
    println!("initdag dry-run");
    println!("  config.poll_interval_ms = {}", plan.config.poll_interval_ms);
    if let Some(ms) = plan.config.gate_timeout_ms {
        println!("  config.gate_timeout_ms = {ms}");
    }
    println!();

    println!("tasks ({}):", plan.task.len());
    for task in plan.task.iter() {
        println!("  - {}", task.display_name());
        println!("      cmd: {}", task.cmd);
        if task.provides.is_empty() {
            println!("      provides: <anonymous>");
        } else {
            println!("      provides: {:?}", task.provides);
        }
        if !task.depends.is_empty() {
            println!("      depends: {:?}", task.depends);
        }
    }

    if let Some(ready) = &plan.ready {
        println!();
        println!("ready: {}", ready.cmd);
    }

    debug!("dry-run complete (no execution)");
}
