// src/exec/command.rs

//! Shell-command initializers.

use std::process::Stdio;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::TaskConfig;
use crate::registry::Scheduler;
use crate::types::Capability;

/// Everything needed to run one plan task's command.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub name: String,
    pub cmd: String,
    pub depends: Vec<Capability>,
}

impl CommandSpec {
    pub fn from_config(task: &TaskConfig) -> Self {
        Self {
            name: task.display_name(),
            cmd: task.cmd.clone(),
            depends: task.depends.clone(),
        }
    }
}

/// Environment variable a dependency's value is exported under.
///
/// `db-ready` becomes `INITDAG_DB_READY`.
pub fn env_var_for(token: &str) -> String {
    let sanitized: String = token
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("INITDAG_{sanitized}")
}

fn shell(cmd: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(cmd);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd);
        c
    }
}

/// Environment exported to a command: one variable per dependency that
/// holds a `String` value.
pub fn dependency_env(depends: &[Capability], scheduler: &Scheduler) -> Vec<(String, String)> {
    depends
        .iter()
        .filter_map(|dep| {
            scheduler
                .provided::<String>(dep)
                .map(|value| (env_var_for(dep), value.as_str().to_string()))
        })
        .collect()
}

/// Run a plan command.
///
/// Stdout (trimmed) is returned as the task's value. A non-zero exit status
/// is an error.
pub async fn run_command(spec: CommandSpec, env: Vec<(String, String)>) -> Result<String> {
    info!(task = %spec.name, cmd = %spec.cmd, "starting initializer command");

    let mut cmd = shell(&spec.cmd);
    cmd.envs(env);

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning process for task '{}'", spec.name))?;

    // Drain stderr so the pipe never fills; log at debug.
    if let Some(stderr) = child.stderr.take() {
        let task_name = spec.name.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(task = %task_name, "stderr: {}", line);
            }
        });
    }

    let mut stdout = String::new();
    if let Some(mut out) = child.stdout.take() {
        out.read_to_string(&mut stdout)
            .await
            .with_context(|| format!("reading stdout of task '{}'", spec.name))?;
    }

    let status = child
        .wait()
        .await
        .with_context(|| format!("waiting for process of task '{}'", spec.name))?;

    info!(
        task = %spec.name,
        exit_code = status.code().unwrap_or(-1),
        success = status.success(),
        "initializer command exited"
    );

    if !status.success() {
        bail!(
            "command for task '{}' exited with code {}",
            spec.name,
            status.code().unwrap_or(-1)
        );
    }

    Ok(stdout.trim().to_string())
}
