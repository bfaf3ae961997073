// src/registry/task_info.rs

//! Initializer metadata and lifecycle state.

use std::fmt;

use crate::registry::scheduler::TaskContext;
use crate::types::{ActionOutput, Capability, TaskValue};

/// Index of a task in registration order.
pub type TaskId = usize;

/// Boxed initializer action. Taken out of the registry when invoked, so it
/// can only ever run once.
pub type InitAction = Box<dyn FnOnce(TaskContext) -> ActionOutput + Send>;

/// Lifecycle of an initializer (internal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Registered; waiting for its dependencies or for the first pass.
    Waiting,
    /// Action invoked and not yet settled.
    Running,
    /// Completed and published its tokens.
    Succeeded,
    /// Completed without publishing anything.
    Failed,
}

impl RunState {
    pub fn is_completed(self) -> bool {
        matches!(self, RunState::Succeeded | RunState::Failed)
    }
}

/// Public, read-only view of a task's lifecycle, keyed by any of its tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskRunState {
    Waiting,
    Running,
    Succeeded,
    Failed,
}

impl From<RunState> for TaskRunState {
    fn from(state: RunState) -> Self {
        match state {
            RunState::Waiting => TaskRunState::Waiting,
            RunState::Running => TaskRunState::Running,
            RunState::Succeeded => TaskRunState::Succeeded,
            RunState::Failed => TaskRunState::Failed,
        }
    }
}

/// A registered initializer.
pub struct TaskInfo {
    pub id: TaskId,
    /// Tokens published on success. Never empty.
    pub provides: Vec<Capability>,
    /// Tokens that must be provided before the action may run.
    pub depends: Vec<Capability>,
    pub run_state: RunState,
    /// Last completion value.
    pub result: Option<TaskValue>,
    action: Option<InitAction>,
}

impl TaskInfo {
    pub fn new(
        id: TaskId,
        provides: Vec<Capability>,
        depends: Vec<Capability>,
        action: InitAction,
    ) -> Self {
        Self {
            id,
            provides,
            depends,
            run_state: RunState::Waiting,
            result: None,
            action: Some(action),
        }
    }

    /// Name used in logs: the first provided token.
    pub fn label(&self) -> &str {
        self.provides.first().map(String::as_str).unwrap_or("<none>")
    }

    /// Move the action out, transitioning `Waiting -> Running`.
    ///
    /// Returns `None` if the task is running, completed, or its action was
    /// already taken.
    pub fn start(&mut self) -> Option<InitAction> {
        if self.run_state != RunState::Waiting {
            return None;
        }
        let action = self.action.take()?;
        self.run_state = RunState::Running;
        Some(action)
    }
}

impl fmt::Debug for TaskInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskInfo")
            .field("id", &self.id)
            .field("provides", &self.provides)
            .field("depends", &self.depends)
            .field("run_state", &self.run_state)
            .field("has_result", &self.result.is_some())
            .finish_non_exhaustive()
    }
}

/// A task handed out by a pass, ready to be invoked outside the lock.
pub struct StartedTask {
    pub id: TaskId,
    pub provides: Vec<Capability>,
    pub action: InitAction,
}

impl fmt::Debug for StartedTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StartedTask")
            .field("id", &self.id)
            .field("provides", &self.provides)
            .finish_non_exhaustive()
    }
}
