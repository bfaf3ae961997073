// src/wait/mod.rs

//! Asynchronous coordination primitives.
//!
//! All timers come from `tokio::time`. None of these helpers cancel the work
//! they wait on: when a timeout fires the wait is abandoned, and anything
//! spawned on behalf of the caller keeps running to completion.

use std::future::Future;
use std::time::Duration;

use anyhow::anyhow;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::time;
use tracing::{debug, warn};

use crate::errors::{InitdagError, Result};

/// Options for [`poll_until`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    /// Fixed delay between two predicate checks.
    pub interval: Duration,
    /// Give up with [`InitdagError::Timeout`] after this long.
    pub timeout: Option<Duration>,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(10),
            timeout: None,
        }
    }
}

impl PollOptions {
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Options for [`join_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JoinOptions {
    /// Log failures and count them as completed instead of failing the join.
    pub ignore_errors: bool,
    /// Give up with [`InitdagError::Timeout`] after this long.
    pub timeout: Option<Duration>,
}

/// Complete after `duration`.
pub async fn pause(duration: Duration) {
    time::sleep(duration).await;
}

/// Resolve once `predicate` returns true, checking every `options.interval`.
///
/// The predicate is checked before the first wait, so an already satisfied
/// condition resolves immediately.
pub async fn poll_until<P>(predicate: P, options: PollOptions) -> Result<()>
where
    P: FnMut() -> bool,
{
    let polling = poll_loop(predicate, options.interval);

    match options.timeout {
        None => {
            polling.await;
            Ok(())
        }
        Some(limit) => time::timeout(limit, polling)
            .await
            .map_err(|_| InitdagError::Timeout(limit)),
    }
}

async fn poll_loop<P>(mut predicate: P, interval: Duration)
where
    P: FnMut() -> bool,
{
    loop {
        if predicate() {
            return;
        }
        time::sleep(interval).await;
    }
}

/// Wait for every task to finish.
///
/// Each task is spawned onto the current runtime, so tasks that are still
/// running when the join fails or times out are left running, detached.
///
/// - Empty input resolves immediately.
/// - Without `ignore_errors`, the first failure to settle fails the join
///   with that error (a panic counts as a failure).
/// - With `ignore_errors`, failures are logged and counted as completed.
pub async fn join_all<I, F, T>(tasks: I, options: JoinOptions) -> Result<()>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = anyhow::Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let mut running: FuturesUnordered<_> = tasks.into_iter().map(tokio::spawn).collect();
    if running.is_empty() {
        return Ok(());
    }

    let total = running.len();
    let ignore_errors = options.ignore_errors;

    let collecting = async move {
        let mut completed = 0usize;
        while let Some(joined) = running.next().await {
            let outcome = match joined {
                Ok(result) => result.map(|_| ()),
                Err(join_err) => Err(anyhow!("joined task panicked: {join_err}")),
            };

            if let Err(err) = outcome {
                if !ignore_errors {
                    // Dropping `running` detaches the remaining tasks.
                    return Err(InitdagError::Other(err));
                }
                warn!(error = %err, "join_all ignored error");
            }

            completed += 1;
            debug!(completed, total, "join_all progress");
        }
        Ok(())
    };

    match options.timeout {
        None => collecting.await,
        Some(limit) => time::timeout(limit, collecting)
            .await
            .map_err(|_| InitdagError::Timeout(limit))?,
    }
}

/// Run `callback` on a later turn of the runtime.
///
/// The callback never runs inside the caller's stack.
pub fn fork<F>(callback: F) -> tokio::task::JoinHandle<()>
where
    F: FnOnce() + Send + 'static,
{
    tokio::spawn(async move {
        tokio::task::yield_now().await;
        callback();
    })
}
