// src/exec/mod.rs

//! Plan execution: turn `[[task]]` entries into scheduler initializers.
//!
//! - [`command`] runs a single shell command with `tokio::process` and hands
//!   its stdout back as the task value.

pub mod command;

pub use command::{dependency_env, env_var_for, run_command, CommandSpec};

use tracing::debug;

use crate::config::PlanFile;
use crate::errors::Result;
use crate::registry::Scheduler;

/// Register every task of `plan` on `scheduler`, in file order.
///
/// Each task becomes a deferred initializer whose value is the command's
/// trimmed stdout (a `String`).
pub fn register_plan(scheduler: &Scheduler, plan: &PlanFile) -> Result<()> {
    for task in &plan.task {
        let spec = CommandSpec::from_config(task);
        let provides = scheduler.register_deferred(
            task.provides.iter().cloned(),
            task.depends.iter().cloned(),
            move |ctx| {
                let env = dependency_env(&spec.depends, ctx.scheduler());
                run_command(spec, env)
            },
        )?;
        debug!(task = %task.display_name(), ?provides, "plan task registered");
    }
    Ok(())
}
