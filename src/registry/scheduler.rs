// src/registry/scheduler.rs

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use anyhow::anyhow;
use rand::Rng;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::config::SchedulerOptions;
use crate::errors::{InitdagError, Result, TaskFailure};
use crate::registry::state::{GateState, RegistryState};
use crate::registry::task_info::{StartedTask, TaskId, TaskRunState};
use crate::types::{ActionOutput, Capability, ProvidedEntry, TaskValue};

/// Handle to one initialization registry.
///
/// Cloning is cheap and every clone refers to the same registry. All state
/// lives behind a single mutex which is never held while user code (actions,
/// failure handlers, the gate's final action) runs.
///
/// Registration never executes anything; the first pass is started by
/// arming the readiness gate ([`Scheduler::arm`]).
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Mutex<RegistryState>>,
    options: Arc<SchedulerOptions>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self::with_options(SchedulerOptions::default())
    }

    pub fn with_options(options: SchedulerOptions) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RegistryState::new())),
            options: Arc::new(options),
        }
    }

    pub fn options(&self) -> &SchedulerOptions {
        &self.options
    }

    /// Register an initializer.
    ///
    /// If `provides` is empty an anonymous token is synthesized so the task
    /// can still be tracked. Returns the effective provides list.
    ///
    /// Fails with [`InitdagError::DuplicateProvider`] if any token already
    /// has a provider, and with [`InitdagError::ConfigError`] for blank
    /// tokens. Nothing runs until the gate is armed.
    pub fn register<P, D, A>(&self, provides: P, depends: D, action: A) -> Result<Vec<Capability>>
    where
        P: IntoIterator,
        P::Item: Into<Capability>,
        D: IntoIterator,
        D::Item: Into<Capability>,
        A: FnOnce(TaskContext) -> ActionOutput + Send + 'static,
    {
        let mut provides: Vec<Capability> = provides.into_iter().map(Into::into).collect();
        let depends: Vec<Capability> = depends.into_iter().map(Into::into).collect();

        if provides.is_empty() {
            let token = self.anonymous_token();
            warn!(
                token = %token,
                "initializer provides nothing; a random capability was created for it"
            );
            provides.push(token);
        }

        self.state()
            .insert_task(provides.clone(), depends, Box::new(action))?;
        Ok(provides)
    }

    /// [`register`](Self::register) for actions that finish synchronously.
    pub fn register_sync<P, D, F, T>(&self, provides: P, depends: D, action: F) -> Result<Vec<Capability>>
    where
        P: IntoIterator,
        P::Item: Into<Capability>,
        D: IntoIterator,
        D::Item: Into<Capability>,
        F: FnOnce(&TaskContext) -> anyhow::Result<T> + Send + 'static,
        T: Any + Send + Sync,
    {
        self.register(provides, depends, move |ctx| {
            ActionOutput::from_result(action(&ctx))
        })
    }

    /// [`register`](Self::register) for actions that return a future.
    pub fn register_deferred<P, D, F, Fut, T>(
        &self,
        provides: P,
        depends: D,
        action: F,
    ) -> Result<Vec<Capability>>
    where
        P: IntoIterator,
        P::Item: Into<Capability>,
        D: IntoIterator,
        D::Item: Into<Capability>,
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Any + Send + Sync,
    {
        self.register(provides, depends, move |ctx| {
            ActionOutput::deferred(action(ctx))
        })
    }

    /// Replace the handler that receives task failures.
    ///
    /// The default handler only logs. Arming the gate installs its own
    /// handler, overwriting whatever was set here.
    pub fn set_failure_handler<F>(&self, handler: F)
    where
        F: Fn(TaskFailure) + Send + Sync + 'static,
    {
        self.state().set_failure_handler(Arc::new(handler));
    }

    /// Typed read of a provided value.
    ///
    /// `None` if the token is not provided yet or holds another type.
    pub fn provided<T: Any + Send + Sync>(&self, token: &str) -> Option<Arc<T>> {
        self.state().provided(token).and_then(ProvidedEntry::get::<T>)
    }

    pub fn provided_entry(&self, token: &str) -> Option<ProvidedEntry> {
        self.state().provided(token).cloned()
    }

    pub fn is_provided(&self, token: &str) -> bool {
        self.state().provided(token).is_some()
    }

    /// Tokens provided so far, sorted.
    pub fn provided_tokens(&self) -> Vec<Capability> {
        self.state().provided_tokens()
    }

    pub fn has_pending(&self) -> bool {
        self.state().has_pending()
    }

    /// Tokens not provided yet, sorted.
    pub fn pending(&self) -> Vec<Capability> {
        self.state().pending()
    }

    /// Lifecycle of the task owning `token`.
    pub fn task_state(&self, token: &str) -> Option<TaskRunState> {
        self.state().task_state(token)
    }

    pub fn gate_state(&self) -> GateState {
        self.state().gate()
    }

    /// Run every runnable task until nothing new becomes runnable.
    ///
    /// Each sweep takes the runnable set under the lock, then invokes the
    /// actions without it. Synchronous completions are picked up by the next
    /// sweep; deferred completions call `run_pass` again once they settle.
    pub(crate) fn run_pass(&self) {
        loop {
            let started = self.state().take_runnable();
            if started.is_empty() {
                break;
            }
            for task in started {
                self.invoke(task);
            }
        }
    }

    fn invoke(&self, task: StartedTask) {
        let StartedTask {
            id,
            provides,
            action,
        } = task;

        debug!(task = %provides[0], "invoking initializer");

        let ctx = TaskContext {
            scheduler: self.clone(),
            provides: provides.clone(),
        };

        let output = match panic::catch_unwind(AssertUnwindSafe(move || action(ctx))) {
            Ok(output) => output,
            Err(payload) => ActionOutput::Ready(Err(anyhow!(
                "initializer panicked: {}",
                panic_message(payload.as_ref())
            ))),
        };

        match output {
            ActionOutput::Ready(result) => self.settle(id, result),
            ActionOutput::Deferred(fut) => {
                let runtime = match Handle::try_current() {
                    Ok(handle) => handle,
                    Err(_) => {
                        self.settle(
                            id,
                            Err(InitdagError::InvalidState(
                                "deferred initializer requires a Tokio runtime".to_string(),
                            )
                            .into()),
                        );
                        return;
                    }
                };

                debug!(task = %provides[0], "initializer deferred; awaiting its result");

                // The work runs in its own task so a panic surfaces as a
                // JoinError instead of losing the completion.
                let work = runtime.spawn(fut);
                let scheduler = self.clone();
                runtime.spawn(async move {
                    let result = match work.await {
                        Ok(result) => result,
                        Err(join_err) => Err(anyhow!("initializer panicked: {join_err}")),
                    };
                    scheduler.settle(id, result);
                    scheduler.run_pass();
                });
            }
        }
    }

    /// Record the outcome of a task and notify the failure handler if needed.
    fn settle(&self, id: TaskId, result: anyhow::Result<TaskValue>) {
        let failed = {
            let mut state = self.state();
            match result {
                Ok(value) => {
                    if let Err(err) = state.complete_success(id, value) {
                        warn!(task = id, error = %err, "ignoring completion");
                    }
                    None
                }
                Err(error) => match state.complete_failure(id, error) {
                    Ok(failure) => Some((failure, state.failure_handler())),
                    Err(err) => {
                        warn!(task = id, error = %err, "ignoring failure");
                        None
                    }
                },
            }
        };

        if let Some((failure, handler)) = failed {
            debug!(provides = ?failure.provides, "initializer failed; notifying failure handler");
            handler(failure);
        }
    }

    fn anonymous_token(&self) -> Capability {
        const HEX: &[u8] = b"0123456789abcdef";
        let mut rng = rand::thread_rng();
        let suffix: String = (0..self.options.anonymous_len)
            .map(|_| HEX[rng.gen_range(0..HEX.len())] as char)
            .collect();
        format!("{}{}", self.options.anonymous_prefix, suffix)
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, RegistryState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn downgrade(&self) -> WeakScheduler {
        WeakScheduler {
            inner: Arc::downgrade(&self.inner),
            options: Arc::clone(&self.options),
        }
    }
}

/// Non-owning scheduler handle, for callbacks stored inside the registry.
#[derive(Clone)]
pub(crate) struct WeakScheduler {
    inner: Weak<Mutex<RegistryState>>,
    options: Arc<SchedulerOptions>,
}

impl WeakScheduler {
    pub(crate) fn upgrade(&self) -> Option<Scheduler> {
        Some(Scheduler {
            inner: self.inner.upgrade()?,
            options: Arc::clone(&self.options),
        })
    }
}

/// What an action sees while it runs.
#[derive(Clone, Debug)]
pub struct TaskContext {
    scheduler: Scheduler,
    provides: Vec<Capability>,
}

impl TaskContext {
    /// Typed value of a (usually declared) dependency.
    pub fn get<T: Any + Send + Sync>(&self, token: &str) -> Option<Arc<T>> {
        self.scheduler.provided::<T>(token)
    }

    /// Like [`get`](Self::get) but turns a missing or mistyped value into an
    /// error, for use with `?` inside actions.
    pub fn require<T: Any + Send + Sync>(&self, token: &str) -> anyhow::Result<Arc<T>> {
        self.get::<T>(token).ok_or_else(|| {
            anyhow!(
                "capability '{token}' is not provided as {}",
                std::any::type_name::<T>()
            )
        })
    }

    /// Tokens this task will publish.
    pub fn provides(&self) -> &[Capability] {
        &self.provides
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NO_CAPABILITIES;

    fn recorder() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[test]
    fn register_runs_nothing_until_a_pass() {
        let sched = Scheduler::new();
        let log = recorder();
        let l = Arc::clone(&log);
        sched
            .register(["a"], NO_CAPABILITIES, move |_| {
                l.lock().unwrap().push("a".into());
                ActionOutput::unit()
            })
            .unwrap();

        assert!(log.lock().unwrap().is_empty());
        assert_eq!(sched.task_state("a"), Some(TaskRunState::Waiting));

        sched.run_pass();
        assert_eq!(*log.lock().unwrap(), vec!["a".to_string()]);
        assert!(!sched.has_pending());
    }

    #[test]
    fn synchronous_chain_completes_in_one_pass() {
        let sched = Scheduler::new();
        sched
            .register_sync(["c"], ["b"], |ctx| Ok(*ctx.require::<i32>("b")? * 10))
            .unwrap();
        sched
            .register_sync(["b"], ["a"], |ctx| Ok(*ctx.require::<i32>("a")? + 1))
            .unwrap();
        sched
            .register_sync(["a"], NO_CAPABILITIES, |_| Ok(1_i32))
            .unwrap();

        sched.run_pass();

        assert_eq!(sched.provided::<i32>("c").map(|v| *v), Some(20));
        assert!(sched.pending().is_empty());
    }

    #[test]
    fn anonymous_token_uses_configured_prefix_and_length() {
        let sched = Scheduler::new();
        let provides = sched
            .register(NO_CAPABILITIES, NO_CAPABILITIES, |_| ActionOutput::unit())
            .unwrap();

        assert_eq!(provides.len(), 1);
        let token = &provides[0];
        let suffix = token.strip_prefix("anonymous_").unwrap();
        assert_eq!(suffix.len(), 12);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(sched.pending(), provides);
    }

    #[test]
    fn panicking_action_is_a_task_failure() {
        let sched = Scheduler::new();
        let failures = Arc::new(Mutex::new(Vec::new()));
        let f = Arc::clone(&failures);
        sched.set_failure_handler(move |failure| {
            f.lock().unwrap().push(failure.error.to_string());
        });
        sched
            .register(["a"], NO_CAPABILITIES, |_| panic!("kaboom"))
            .unwrap();

        sched.run_pass();

        assert_eq!(sched.task_state("a"), Some(TaskRunState::Failed));
        let failures = failures.lock().unwrap();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].contains("kaboom"));
    }

    #[test]
    fn deferred_action_without_runtime_fails_instead_of_panicking() {
        let sched = Scheduler::new();
        sched
            .register_deferred(["a"], NO_CAPABILITIES, |_| async { Ok(1_u8) })
            .unwrap();

        sched.run_pass();

        assert_eq!(sched.task_state("a"), Some(TaskRunState::Failed));
        assert_eq!(sched.pending(), vec!["a".to_string()]);
    }

    #[test]
    fn provided_with_wrong_type_reads_as_none() {
        let sched = Scheduler::new();
        sched
            .register_sync(["a"], NO_CAPABILITIES, |_| Ok("text".to_string()))
            .unwrap();
        sched.run_pass();

        assert!(sched.is_provided("a"));
        assert!(sched.provided::<u64>("a").is_none());
        assert_eq!(sched.provided::<String>("a").as_deref().map(String::as_str), Some("text"));
    }
}
