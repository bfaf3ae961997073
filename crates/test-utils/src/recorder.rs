use std::sync::{Arc, Mutex};
use std::time::Duration;

use initdag::{ActionOutput, TaskContext};

/// Shared log of which initializers ran, in invocation order.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, name: &str) {
        self.events.lock().unwrap().push(name.to_string());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn ran(&self, name: &str) -> bool {
        self.events.lock().unwrap().iter().any(|e| e == name)
    }

    /// Position of `name` in the invocation order.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.events.lock().unwrap().iter().position(|e| e == name)
    }

    /// Synchronous action that records `name` and completes with `value`.
    pub fn sync_value<T>(&self, name: &str, value: T) -> impl FnOnce(TaskContext) -> ActionOutput + Send + use<T>
    where
        T: std::any::Any + Send + Sync,
    {
        let recorder = self.clone();
        let name = name.to_string();
        move |_ctx| {
            recorder.record(&name);
            ActionOutput::value(value)
        }
    }

    /// Synchronous action that records `name` and fails with `message`.
    pub fn sync_fail(&self, name: &str, message: &str) -> impl FnOnce(TaskContext) -> ActionOutput + Send + use<> {
        let recorder = self.clone();
        let name = name.to_string();
        let message = message.to_string();
        move |_ctx| {
            recorder.record(&name);
            ActionOutput::fail(anyhow::anyhow!(message))
        }
    }

    /// Deferred action that records `name`, sleeps for `delay`, then
    /// completes with `value`.
    pub fn delayed_value<T>(
        &self,
        name: &str,
        delay: Duration,
        value: T,
    ) -> impl FnOnce(TaskContext) -> ActionOutput + Send + use<T>
    where
        T: std::any::Any + Send + Sync,
    {
        let recorder = self.clone();
        let name = name.to_string();
        move |_ctx| {
            recorder.record(&name);
            ActionOutput::deferred(async move {
                tokio::time::sleep(delay).await;
                Ok(value)
            })
        }
    }

    /// Deferred action that records `name`, sleeps for `delay`, then fails.
    pub fn delayed_fail(
        &self,
        name: &str,
        delay: Duration,
        message: &str,
    ) -> impl FnOnce(TaskContext) -> ActionOutput + Send + use<> {
        let recorder = self.clone();
        let name = name.to_string();
        let message = message.to_string();
        move |_ctx| {
            recorder.record(&name);
            ActionOutput::deferred(async move {
                tokio::time::sleep(delay).await;
                Err::<(), _>(anyhow::anyhow!(message))
            })
        }
    }
}
