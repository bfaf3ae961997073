// src/gate/mod.rs

//! One-shot readiness gate.
//!
//! Arming the gate starts the scheduler: it installs a failure handler that
//! rejects the gate, runs the first pass, then polls the pending set until it
//! is empty and invokes the final action.
//!
//! ```text
//! Unarmed -> Waiting -> Ready
//!                    \-> Failed
//! ```

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::errors::{InitdagError, Result, TaskFailure};
use crate::registry::scheduler::{panic_message, WeakScheduler};
use crate::registry::{GateState, Scheduler};
use crate::wait::{poll_until, PollOptions};

type Settlement = Arc<Mutex<Option<oneshot::Sender<Result<()>>>>>;

/// Resolves once every registered initializer has succeeded and the final
/// action has run, or rejects with the first task failure.
#[derive(Debug)]
pub struct ReadinessGate {
    rx: oneshot::Receiver<Result<()>>,
}

impl Future for ReadinessGate {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(InitdagError::InvalidState(
                "readiness gate dropped without settling".to_string(),
            ))),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Settle the gate once; later calls are no-ops and return `false`.
fn settle(
    settlement: &Settlement,
    scheduler: Option<&Scheduler>,
    terminal: GateState,
    outcome: Result<()>,
) -> bool {
    let sender = settlement
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take();

    let Some(sender) = sender else {
        return false;
    };

    if let Some(scheduler) = scheduler {
        scheduler.state().set_gate(terminal);
    }
    // The caller may have dropped the gate; nothing to report then.
    let _ = sender.send(outcome);
    true
}

impl Scheduler {
    /// Arm the readiness gate and start running initializers.
    ///
    /// Must be called from within a Tokio runtime. Fails with
    /// [`InitdagError::AlreadyArmed`] on any call after the first; the first
    /// gate is unaffected.
    ///
    /// `final_action` runs once the pending set is empty, right before the
    /// gate resolves. A panic inside it fails the gate.
    pub fn arm<F>(&self, final_action: F) -> Result<ReadinessGate>
    where
        F: FnOnce(&Scheduler) + Send + 'static,
    {
        let runtime = Handle::try_current().map_err(|_| {
            InitdagError::InvalidState(
                "the readiness gate must be armed inside a Tokio runtime".to_string(),
            )
        })?;

        {
            let mut state = self.state();
            if state.gate() != GateState::Unarmed {
                return Err(InitdagError::AlreadyArmed);
            }
            state.set_gate(GateState::Waiting);
        }
        info!("readiness gate armed");

        let (tx, rx) = oneshot::channel();
        let settlement: Settlement = Arc::new(Mutex::new(Some(tx)));

        // 1. Any task failure rejects the gate.
        let on_failure = Arc::clone(&settlement);
        let weak: WeakScheduler = self.downgrade();
        self.set_failure_handler(move |failure: TaskFailure| {
            warn!(
                provides = ?failure.provides,
                error = %failure.error,
                "initialization failed while waiting for readiness"
            );
            let scheduler = weak.upgrade();
            if !settle(
                &on_failure,
                scheduler.as_ref(),
                GateState::Failed,
                Err(InitdagError::TaskFailed(failure)),
            ) {
                debug!("readiness gate already settled; failure only logged");
            }
        });

        // 2. First pass.
        self.run_pass();

        // 3 + 4. Wait for the pending set to drain, then finish.
        let scheduler = self.clone();
        let interval = self.options().poll_interval;
        runtime.spawn(async move {
            let watched = scheduler.clone();
            let drained = poll_until(
                move || {
                    let state = watched.state();
                    // Stop our own timer once the gate failed; tasks keep running.
                    !state.has_pending() || state.gate() == GateState::Failed
                },
                PollOptions::every(interval),
            )
            .await;

            if let Err(err) = drained {
                settle(&settlement, Some(&scheduler), GateState::Failed, Err(err));
                return;
            }
            if scheduler.gate_state() == GateState::Failed {
                debug!("readiness gate failed; final action skipped");
                return;
            }

            let finished = panic::catch_unwind(AssertUnwindSafe(|| final_action(&scheduler)));
            let (terminal, outcome) = match finished {
                Ok(()) => (GateState::Ready, Ok(())),
                Err(payload) => (
                    GateState::Failed,
                    Err(InitdagError::Other(anyhow::anyhow!(
                        "final action panicked: {}",
                        panic_message(payload.as_ref())
                    ))),
                ),
            };

            if settle(&settlement, Some(&scheduler), terminal, outcome) {
                info!(state = ?terminal, "readiness gate settled");
            }
        });

        Ok(ReadinessGate { rx })
    }

    /// Fire-and-forget variant of [`arm`](Self::arm).
    ///
    /// Errors from arming and from the gate itself are logged, not returned.
    pub fn arm_detached<F>(&self, final_action: F)
    where
        F: FnOnce(&Scheduler) + Send + 'static,
    {
        let gate = match self.arm(final_action) {
            Ok(gate) => gate,
            Err(err) => {
                error!(error = %err, "scheduler.arm_detached failed");
                return;
            }
        };

        tokio::spawn(async move {
            if let Err(err) = gate.await {
                error!(error = %err, "scheduler.arm_detached failed");
            }
        });
    }
}
