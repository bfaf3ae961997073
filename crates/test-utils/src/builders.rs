#![allow(dead_code)]

use initdag::config::{ConfigSection, PlanFile, RawPlanFile, ReadySection, TaskConfig};

/// Builder for `PlanFile` to simplify test setup.
pub struct PlanBuilder {
    plan: RawPlanFile,
}

impl PlanBuilder {
    pub fn new() -> Self {
        Self {
            plan: RawPlanFile {
                config: ConfigSection::default(),
                task: Vec::new(),
                ready: None,
            },
        }
    }

    pub fn with_task(mut self, task: TaskConfig) -> Self {
        self.plan.task.push(task);
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.plan.config.poll_interval_ms = ms;
        self
    }

    pub fn gate_timeout_ms(mut self, ms: u64) -> Self {
        self.plan.config.gate_timeout_ms = Some(ms);
        self
    }

    pub fn ready(mut self, cmd: &str) -> Self {
        self.plan.ready = Some(ReadySection {
            cmd: cmd.to_string(),
        });
        self
    }

    pub fn build_raw(self) -> RawPlanFile {
        self.plan
    }

    pub fn build(self) -> PlanFile {
        PlanFile::try_from(self.plan).expect("Failed to build valid plan from builder")
    }
}

impl Default for PlanBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            task: TaskConfig {
                name: None,
                provides: vec![],
                depends: vec![],
                cmd: cmd.to_string(),
            },
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.task.name = Some(name.to_string());
        self
    }

    pub fn provides(mut self, token: &str) -> Self {
        self.task.provides.push(token.to_string());
        self
    }

    pub fn depends(mut self, token: &str) -> Self {
        self.task.depends.push(token.to_string());
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}
