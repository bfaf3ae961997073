// src/registry/state.rs

//! Registry state: providers, provided set, pending set and gate state.
//!
//! Everything in here is synchronous and performs no IO. The
//! [`Scheduler`](super::Scheduler) handle wraps it in a mutex and is the only
//! place where user actions are invoked, always with the lock released.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use tracing::{debug, warn};

use crate::errors::{InitdagError, Result, TaskFailure};
use crate::registry::task_info::{InitAction, RunState, StartedTask, TaskId, TaskInfo, TaskRunState};
use crate::types::{Capability, ProvidedEntry, TaskValue};

/// Callback receiving every task failure.
pub type FailureHandler = Arc<dyn Fn(TaskFailure) + Send + Sync>;

/// Lifecycle of the readiness gate. Terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Unarmed,
    Waiting,
    Ready,
    Failed,
}

/// Default failure handler: log and carry on.
pub fn log_failure_handler() -> FailureHandler {
    Arc::new(|failure: TaskFailure| {
        warn!(
            provides = ?failure.provides,
            error = %failure.error,
            "initialization failed unexpectedly"
        );
    })
}

pub struct RegistryState {
    /// All tasks, in registration order.
    tasks: Vec<TaskInfo>,
    /// Token -> owning task.
    providers: HashMap<Capability, TaskId>,
    provided: HashMap<Capability, ProvidedEntry>,
    pending: BTreeSet<Capability>,
    gate: GateState,
    failure_handler: FailureHandler,
}

impl fmt::Debug for RegistryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryState")
            .field("tasks", &self.tasks)
            .field("provided", &self.provided.keys().collect::<Vec<_>>())
            .field("pending", &self.pending)
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}

impl Default for RegistryState {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryState {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            providers: HashMap::new(),
            provided: HashMap::new(),
            pending: BTreeSet::new(),
            gate: GateState::Unarmed,
            failure_handler: log_failure_handler(),
        }
    }

    /// Add a task providing `provides` (already non-empty).
    ///
    /// All tokens are checked before anything is inserted, so a rejected
    /// registration leaves the registry untouched.
    pub fn insert_task(
        &mut self,
        provides: Vec<Capability>,
        depends: Vec<Capability>,
        action: InitAction,
    ) -> Result<TaskId> {
        if provides.is_empty() {
            return Err(InitdagError::ConfigError(
                "an initializer must provide at least one capability".to_string(),
            ));
        }
        if let Some(blank) = provides.iter().chain(depends.iter()).find(|t| t.trim().is_empty()) {
            return Err(InitdagError::ConfigError(format!(
                "capability tokens must not be blank (got {blank:?})"
            )));
        }

        let mut seen = HashSet::new();
        for token in &provides {
            if self.providers.contains_key(token) || !seen.insert(token.as_str()) {
                return Err(InitdagError::DuplicateProvider(token.clone()));
            }
        }

        let id = self.tasks.len();
        for token in &provides {
            self.pending.insert(token.clone());
            self.providers.insert(token.clone(), id);
        }

        debug!(task = id, ?provides, ?depends, "registered initializer");
        self.tasks.push(TaskInfo::new(id, provides, depends, action));
        Ok(id)
    }

    /// Whether every dependency of `info` has been provided.
    pub fn deps_satisfied(&self, info: &TaskInfo) -> bool {
        info.depends.iter().all(|dep| self.provided.contains_key(dep))
    }

    /// One sweep of a pass: mark every runnable task `Running` and hand its
    /// action out, in registration order.
    pub fn take_runnable(&mut self) -> Vec<StartedTask> {
        // Decide first, then mutate.
        let candidates: Vec<TaskId> = self
            .tasks
            .iter()
            .filter(|info| info.run_state == RunState::Waiting && self.deps_satisfied(info))
            .map(|info| info.id)
            .collect();

        let mut started = Vec::with_capacity(candidates.len());
        for id in candidates {
            let info = &mut self.tasks[id];
            if let Some(action) = info.start() {
                debug!(task = %info.label(), "dependencies satisfied; marking Running");
                started.push(StartedTask {
                    id,
                    provides: info.provides.clone(),
                    action,
                });
            }
        }
        started
    }

    /// Record a successful completion and publish `value` under every token.
    pub fn complete_success(&mut self, id: TaskId, value: TaskValue) -> Result<()> {
        let info = self.running_task_mut(id)?;
        info.run_state = RunState::Succeeded;
        info.result = Some(Arc::clone(&value));

        let provides = info.provides.clone();
        let at = SystemTime::now();
        for token in provides {
            debug!(token = %token, "capability provided");
            self.pending.remove(&token);
            self.provided.insert(
                token,
                ProvidedEntry {
                    at,
                    value: Arc::clone(&value),
                },
            );
        }
        Ok(())
    }

    /// Record a failed completion. Nothing is published; the task's tokens
    /// stay pending.
    pub fn complete_failure(&mut self, id: TaskId, error: anyhow::Error) -> Result<TaskFailure> {
        let info = self.running_task_mut(id)?;
        info.run_state = RunState::Failed;
        Ok(TaskFailure::new(info.provides.clone(), error))
    }

    fn running_task_mut(&mut self, id: TaskId) -> Result<&mut TaskInfo> {
        let info = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| InitdagError::InvalidState(format!("unknown task id {id}")))?;

        match info.run_state {
            RunState::Running => Ok(info),
            state if state.is_completed() => Err(InitdagError::InvalidState(format!(
                "task '{}' already run",
                info.label()
            ))),
            _ => Err(InitdagError::InvalidState(format!(
                "task '{}' completed without running",
                info.label()
            ))),
        }
    }

    pub fn failure_handler(&self) -> FailureHandler {
        Arc::clone(&self.failure_handler)
    }

    pub fn set_failure_handler(&mut self, handler: FailureHandler) {
        self.failure_handler = handler;
    }

    pub fn gate(&self) -> GateState {
        self.gate
    }

    pub fn set_gate(&mut self, gate: GateState) {
        debug!(from = ?self.gate, to = ?gate, "gate state transition");
        self.gate = gate;
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending(&self) -> Vec<Capability> {
        self.pending.iter().cloned().collect()
    }

    pub fn provided(&self, token: &str) -> Option<&ProvidedEntry> {
        self.provided.get(token)
    }

    pub fn provided_tokens(&self) -> Vec<Capability> {
        let mut tokens: Vec<_> = self.provided.keys().cloned().collect();
        tokens.sort();
        tokens
    }

    pub fn task_state(&self, token: &str) -> Option<TaskRunState> {
        let id = *self.providers.get(token)?;
        self.tasks.get(id).map(|info| info.run_state.into())
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ActionOutput;

    fn noop() -> InitAction {
        Box::new(|_ctx| ActionOutput::unit())
    }

    fn tokens(names: &[&str]) -> Vec<Capability> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn ids(started: &[StartedTask]) -> Vec<TaskId> {
        started.iter().map(|t| t.id).collect()
    }

    #[test]
    fn take_runnable_only_returns_tasks_with_satisfied_deps_in_order() {
        let mut st = RegistryState::new();
        st.insert_task(tokens(&["b"]), tokens(&["a"]), noop()).unwrap();
        st.insert_task(tokens(&["a"]), vec![], noop()).unwrap();
        st.insert_task(tokens(&["c"]), vec![], noop()).unwrap();

        let started = st.take_runnable();
        assert_eq!(ids(&started), vec![1, 2]);
        assert_eq!(st.task_state("a"), Some(TaskRunState::Running));
        assert_eq!(st.task_state("b"), Some(TaskRunState::Waiting));

        // Running tasks are not handed out twice.
        assert!(st.take_runnable().is_empty());
    }

    #[test]
    fn success_publishes_every_token_and_unblocks_dependents() {
        let mut st = RegistryState::new();
        st.insert_task(tokens(&["a", "a2"]), vec![], noop()).unwrap();
        st.insert_task(tokens(&["b"]), tokens(&["a2"]), noop()).unwrap();

        let first = st.take_runnable();
        st.complete_success(first[0].id, Arc::new(7_u32)).unwrap();

        assert_eq!(st.pending(), tokens(&["b"]));
        assert_eq!(st.provided_tokens(), tokens(&["a", "a2"]));
        assert_eq!(st.provided("a").and_then(|e| e.get::<u32>()).map(|v| *v), Some(7));

        let second = st.take_runnable();
        assert_eq!(ids(&second), vec![1]);
    }

    #[test]
    fn failure_keeps_tokens_pending_and_blocks_dependents() {
        let mut st = RegistryState::new();
        st.insert_task(tokens(&["a"]), vec![], noop()).unwrap();
        st.insert_task(tokens(&["b"]), tokens(&["a"]), noop()).unwrap();

        let first = st.take_runnable();
        let failure = st
            .complete_failure(first[0].id, anyhow::anyhow!("boom"))
            .unwrap();

        assert_eq!(failure.provides, tokens(&["a"]));
        assert_eq!(st.task_state("a"), Some(TaskRunState::Failed));
        assert_eq!(st.pending(), tokens(&["a", "b"]));
        assert!(st.take_runnable().is_empty());
    }

    #[test]
    fn duplicate_provider_is_rejected_without_partial_state() {
        let mut st = RegistryState::new();
        st.insert_task(tokens(&["a"]), vec![], noop()).unwrap();

        let err = st
            .insert_task(tokens(&["fresh", "a"]), vec![], noop())
            .unwrap_err();
        assert!(matches!(err, InitdagError::DuplicateProvider(ref t) if t == "a"));
        assert_eq!(st.task_count(), 1);
        assert_eq!(st.pending(), tokens(&["a"]));
        assert_eq!(st.task_state("fresh"), None);
    }

    #[test]
    fn token_repeated_within_one_registration_is_a_duplicate() {
        let mut st = RegistryState::new();
        let err = st
            .insert_task(tokens(&["x", "x"]), vec![], noop())
            .unwrap_err();
        assert!(matches!(err, InitdagError::DuplicateProvider(_)));
    }

    #[test]
    fn blank_tokens_are_configuration_errors() {
        let mut st = RegistryState::new();
        let err = st
            .insert_task(tokens(&["ok"]), tokens(&["  "]), noop())
            .unwrap_err();
        assert!(matches!(err, InitdagError::ConfigError(_)));
        assert_eq!(st.task_count(), 0);
    }

    #[test]
    fn completing_a_task_twice_is_an_invalid_state() {
        let mut st = RegistryState::new();
        st.insert_task(tokens(&["a"]), vec![], noop()).unwrap();
        let started = st.take_runnable();
        st.complete_success(started[0].id, Arc::new(())).unwrap();

        let err = st.complete_success(started[0].id, Arc::new(())).unwrap_err();
        assert!(matches!(err, InitdagError::InvalidState(ref m) if m.contains("already run")));
    }
}
