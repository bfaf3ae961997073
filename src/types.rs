// src/types.rs

//! Shared vocabulary: capability tokens, task values and action outputs.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::SystemTime;

/// Canonical capability token type used throughout the scheduler.
pub type Capability = String;

/// Convenience for "provides nothing" / "depends on nothing".
pub const NO_CAPABILITIES: [&str; 0] = [];

/// Completion value of an initializer, stored under each of its tokens.
///
/// Consumers read it back with a declared type through
/// [`Scheduler::provided`](crate::registry::Scheduler::provided).
pub type TaskValue = Arc<dyn Any + Send + Sync>;

/// Boxed future returned by deferred initializers.
pub type DeferredResult = Pin<Box<dyn Future<Output = anyhow::Result<TaskValue>> + Send>>;

/// What an initializer action hands back to the scheduler.
pub enum ActionOutput {
    /// Completed synchronously, in the same pass that invoked it.
    Ready(anyhow::Result<TaskValue>),
    /// Completes later; the task stays running until the future settles.
    Deferred(DeferredResult),
}

impl ActionOutput {
    pub fn value<T: Any + Send + Sync>(value: T) -> Self {
        ActionOutput::Ready(Ok(Arc::new(value)))
    }

    pub fn unit() -> Self {
        Self::value(())
    }

    pub fn fail(err: impl Into<anyhow::Error>) -> Self {
        ActionOutput::Ready(Err(err.into()))
    }

    pub fn from_result<T: Any + Send + Sync>(result: anyhow::Result<T>) -> Self {
        match result {
            Ok(value) => Self::value(value),
            Err(err) => ActionOutput::Ready(Err(err)),
        }
    }

    pub fn deferred<F, T>(fut: F) -> Self
    where
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Any + Send + Sync,
    {
        ActionOutput::Deferred(Box::pin(async move {
            let value = fut.await?;
            Ok(Arc::new(value) as TaskValue)
        }))
    }
}

impl fmt::Debug for ActionOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionOutput::Ready(Ok(_)) => f.write_str("Ready(Ok(..))"),
            ActionOutput::Ready(Err(e)) => write!(f, "Ready(Err({e}))"),
            ActionOutput::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

/// A provided capability: when it was provided and the value it carries.
#[derive(Debug, Clone)]
pub struct ProvidedEntry {
    pub at: SystemTime,
    pub value: TaskValue,
}

impl ProvidedEntry {
    /// Typed view of the stored value; `None` if the type does not match.
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.value).downcast::<T>().ok()
    }
}
