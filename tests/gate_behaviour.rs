// tests/gate_behaviour.rs

mod common;
use crate::common::{init_tracing, with_timeout, Recorder};

use std::error::Error;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use initdag::config::SchedulerOptions;
use initdag::registry::GateState;
use initdag::{InitdagError, Scheduler, NO_CAPABILITIES};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn gate_with_no_tasks_resolves_and_runs_final_action() -> TestResult {
    init_tracing();

    let sched = Scheduler::new();
    let ran = Arc::new(AtomicBool::new(false));
    let r = Arc::clone(&ran);

    let gate = sched.arm(move |_| r.store(true, Ordering::SeqCst))?;
    with_timeout(gate).await?;

    assert!(ran.load(Ordering::SeqCst));
    assert_eq!(sched.gate_state(), GateState::Ready);
    Ok(())
}

#[tokio::test]
async fn final_action_runs_once_after_every_task() -> TestResult {
    init_tracing();

    let sched = Scheduler::new();
    let rec = Recorder::new();
    sched.register(["slow"], NO_CAPABILITIES, rec.delayed_value("slow", Duration::from_millis(40), ()))?;
    sched.register(["fast"], NO_CAPABILITIES, rec.sync_value("fast", ()))?;

    let calls = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&calls);
    let r = rec.clone();
    let gate = sched.arm(move |s| {
        c.fetch_add(1, Ordering::SeqCst);
        assert!(!s.has_pending());
        r.record("final");
    })?;
    assert_eq!(sched.gate_state(), GateState::Waiting);

    with_timeout(gate).await?;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(rec.events().last().map(String::as_str), Some("final"));
    Ok(())
}

#[tokio::test]
async fn arming_twice_fails_without_affecting_the_first_gate() -> TestResult {
    init_tracing();

    let sched = Scheduler::new();
    let rec = Recorder::new();
    sched.register(["a"], NO_CAPABILITIES, rec.delayed_value("a", Duration::from_millis(20), ()))?;

    let first = sched.arm(|_| {})?;
    let second_ran = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&second_ran);
    let err = sched
        .arm(move |_| flag.store(true, Ordering::SeqCst))
        .unwrap_err();
    assert!(matches!(err, InitdagError::AlreadyArmed));

    with_timeout(first).await?;
    assert!(!second_ran.load(Ordering::SeqCst));

    // Terminal states reject re-arming as well.
    assert!(matches!(sched.arm(|_| {}), Err(InitdagError::AlreadyArmed)));
    Ok(())
}

#[tokio::test]
async fn deferred_failure_rejects_gate_without_waiting_for_siblings() -> TestResult {
    init_tracing();

    let sched = Scheduler::new();
    let rec = Recorder::new();
    sched.register(
        ["slow"],
        NO_CAPABILITIES,
        rec.delayed_value("slow", Duration::from_millis(500), ()),
    )?;
    sched.register(
        ["broken"],
        NO_CAPABILITIES,
        rec.delayed_fail("broken", Duration::from_millis(10), "disk on fire"),
    )?;

    let start = Instant::now();
    let gate = sched.arm(|_| panic!("final action must not run"))?;
    let err = with_timeout(gate).await.unwrap_err();

    assert!(start.elapsed() < Duration::from_millis(400));
    match err {
        InitdagError::TaskFailed(failure) => {
            assert_eq!(failure.provides, vec!["broken".to_string()]);
            assert!(failure.error.to_string().contains("disk on fire"));
        }
        other => panic!("expected TaskFailed, got {other:?}"),
    }
    assert_eq!(sched.gate_state(), GateState::Failed);
    Ok(())
}

#[tokio::test]
async fn only_the_first_failure_reaches_the_gate() -> TestResult {
    init_tracing();

    let sched = Scheduler::new();
    let rec = Recorder::new();
    sched.register(["one"], NO_CAPABILITIES, rec.sync_fail("one", "first failure"))?;
    sched.register(
        ["two"],
        NO_CAPABILITIES,
        rec.delayed_fail("two", Duration::from_millis(10), "second failure"),
    )?;

    let gate = sched.arm(|_| {})?;
    let err = with_timeout(gate).await.unwrap_err();
    assert!(err.to_string().contains("first failure"));

    // The second failure still happens; it is only logged.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(sched.task_state("two"), Some(initdag::TaskRunState::Failed));
    Ok(())
}

#[tokio::test]
async fn panicking_final_action_fails_the_gate() -> TestResult {
    init_tracing();

    let sched = Scheduler::new();
    let gate = sched.arm(|_| panic!("final boom"))?;
    let err = with_timeout(gate).await.unwrap_err();

    assert!(err.to_string().contains("final boom"));
    assert_eq!(sched.gate_state(), GateState::Failed);
    Ok(())
}

#[tokio::test]
async fn arm_detached_runs_final_action() -> TestResult {
    init_tracing();

    let sched = Scheduler::new();
    let rec = Recorder::new();
    sched.register(["a"], NO_CAPABILITIES, rec.delayed_value("a", Duration::from_millis(10), ()))?;

    let r = rec.clone();
    sched.arm_detached(move |_| r.record("final"));

    with_timeout(async {
        while !rec.ran("final") {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert_eq!(sched.gate_state(), GateState::Ready);
    Ok(())
}

#[tokio::test]
async fn arm_detached_swallows_failures() -> TestResult {
    init_tracing();

    let sched = Scheduler::new();
    let rec = Recorder::new();
    sched.register(["a"], NO_CAPABILITIES, rec.sync_fail("a", "nobody is listening"))?;

    sched.arm_detached(|_| {});
    assert_eq!(sched.gate_state(), GateState::Failed);

    // A second detached arm is logged, not propagated.
    sched.arm_detached(|_| {});
    Ok(())
}

#[tokio::test]
async fn gate_polls_at_the_configured_interval() -> TestResult {
    init_tracing();

    let sched = Scheduler::with_options(SchedulerOptions {
        poll_interval: Duration::from_millis(1),
        ..SchedulerOptions::default()
    });
    sched.register(["a"], NO_CAPABILITIES, Recorder::new().delayed_value("a", Duration::from_millis(5), ()))?;

    let gate = sched.arm(|_| {})?;
    with_timeout(gate).await?;
    Ok(())
}

#[test]
fn arming_outside_a_runtime_is_an_invalid_state() {
    let sched = Scheduler::new();
    let err = sched.arm(|_| {}).unwrap_err();
    assert!(matches!(err, InitdagError::InvalidState(_)));
    assert_eq!(sched.gate_state(), GateState::Unarmed);
}
