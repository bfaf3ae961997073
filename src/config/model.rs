// src/config/model.rs

use serde::Deserialize;

/// Initialization plan as read from a TOML file, before validation.
///
/// ```toml
/// [config]
/// poll_interval_ms = 10
/// gate_timeout_ms = 30000
///
/// [[task]]
/// name = "load-config"
/// provides = ["config-loaded"]
/// cmd = "cat app.toml"
///
/// [[task]]
/// provides = ["db-ready"]
/// depends = ["config-loaded"]
/// cmd = "./migrate.sh"
///
/// [ready]
/// cmd = "echo ready"
/// ```
///
/// Tasks are an array of tables so that file order is registration order.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPlanFile {
    #[serde(default)]
    pub config: ConfigSection,

    #[serde(default)]
    pub task: Vec<TaskConfig>,

    #[serde(default)]
    pub ready: Option<ReadySection>,
}

/// A plan that passed validation.
///
/// Only obtainable through `TryFrom<RawPlanFile>` (see `validate.rs`).
#[derive(Debug, Clone)]
pub struct PlanFile {
    pub config: ConfigSection,
    pub task: Vec<TaskConfig>,
    pub ready: Option<ReadySection>,
}

impl PlanFile {
    pub(crate) fn new_unchecked(
        config: ConfigSection,
        task: Vec<TaskConfig>,
        ready: Option<ReadySection>,
    ) -> Self {
        Self {
            config,
            task,
            ready,
        }
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// How often the readiness gate checks the pending set.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Give up waiting for readiness after this many milliseconds.
    #[serde(default)]
    pub gate_timeout_ms: Option<u64>,
}

fn default_poll_interval_ms() -> u64 {
    10
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            gate_timeout_ms: None,
        }
    }
}

/// One `[[task]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    /// Optional display name; defaults to the first provided token.
    #[serde(default)]
    pub name: Option<String>,

    /// Capabilities published when `cmd` exits successfully.
    ///
    /// May be empty, in which case the scheduler makes up an anonymous one.
    #[serde(default)]
    pub provides: Vec<String>,

    /// Capabilities that must be provided before `cmd` runs.
    #[serde(default)]
    pub depends: Vec<String>,

    /// Shell command to run.
    pub cmd: String,
}

impl TaskConfig {
    /// Name used in logs and dry-run output.
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .or_else(|| self.provides.first().cloned())
            .unwrap_or_else(|| "<anonymous>".to_string())
    }
}

/// `[ready]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ReadySection {
    /// Command run once every task has succeeded.
    pub cmd: String,
}
