// tests/retry_and_lifecycle.rs

mod common;

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use common::{started, TestResult};
use plumber::config::EngineSettings;
use plumber::{Backoff, DependencyGraph, Dispatcher, PlumberError, RetryPolicy, TaskHandle};
use plumber_test_utils::{Probe, ProbeEvent, RecordingSink, TaskScript};

fn dispatcher_with_retry(
    graph: DependencyGraph<i64>,
    retry: RetryPolicy,
) -> plumber::Result<Dispatcher<i64>> {
    common::init_tracing();
    let dispatcher = Dispatcher::with_settings(graph, EngineSettings::default(), retry)?;
    dispatcher.setup(Arc::new(RecordingSink::new()))?;
    dispatcher.start()?;
    Ok(dispatcher)
}

#[test]
fn retry_policy_delays_and_budget() {
    let fixed = RetryPolicy::unlimited().with_backoff(Backoff::Fixed(Duration::from_millis(5)));
    assert!(!fixed.exhausted(1_000));
    assert_eq!(fixed.delay_after(1), Duration::from_millis(5));
    assert_eq!(fixed.delay_after(7), Duration::from_millis(5));

    let exp = RetryPolicy::unlimited()
        .with_max_attempts(3)
        .with_backoff(Backoff::Exponential {
            initial: Duration::from_millis(10),
            max: Duration::from_millis(50),
        });
    assert_eq!(exp.delay_after(1), Duration::from_millis(10));
    assert_eq!(exp.delay_after(2), Duration::from_millis(20));
    assert_eq!(exp.delay_after(3), Duration::from_millis(40));
    assert_eq!(exp.delay_after(4), Duration::from_millis(50));
    assert_eq!(exp.delay_after(200), Duration::from_millis(50));
    assert!(!exp.exhausted(2));
    assert!(exp.exhausted(3));

    // Zero attempts would make the node unrunnable; it is clamped to one.
    assert_eq!(RetryPolicy::unlimited().with_max_attempts(0).max_attempts, Some(1));
    assert_eq!(RetryPolicy::default(), RetryPolicy::unlimited());
}

#[test]
fn exhausted_retries_leave_the_node_and_its_dependents_without_output() -> TestResult {
    let probe = Probe::new();
    let mut graph = DependencyGraph::new();
    graph.add(TaskScript::new("Broken").always_fail().spec(&probe))?;
    graph.add(TaskScript::new("Downstream").after("Broken").spec(&probe).output())?;
    graph.add(TaskScript::new("Fine").value(5).spec(&probe).output())?;

    let retry = RetryPolicy::unlimited()
        .with_max_attempts(3)
        .with_backoff(Backoff::Fixed(Duration::from_millis(1)));
    let dispatcher = dispatcher_with_retry(graph, retry)?;

    let outputs = dispatcher.forward(true)?;
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs.get("Fine"), Some(&5));

    assert_eq!(probe.count(&ProbeEvent::ExecuteBegin("Broken".to_string())), 3);
    assert_eq!(probe.count(&ProbeEvent::ExecuteBegin("Downstream".to_string())), 0);

    match dispatcher.node_result("Downstream", None) {
        Err(PlumberError::NodeFailed { node }) => assert_eq!(node, "Downstream"),
        other => panic!("expected NodeFailed, got {other:?}"),
    }

    // A fresh tick tries again from scratch.
    dispatcher.forward(true)?;
    assert_eq!(probe.count(&ProbeEvent::ExecuteBegin("Broken".to_string())), 6);
    Ok(())
}

#[test]
fn run_loop_yields_ticks_until_stopped() -> TestResult {
    let probe = Probe::new();
    let mut graph = DependencyGraph::new();
    let a: TaskHandle = graph.add(TaskScript::new("A").value(1).spec(&probe))?;
    graph.add(TaskScript::new("B").value(1).after(a.id()).spec(&probe).output())?;

    let (dispatcher, _sink) = started(graph)?;
    let handle = dispatcher.handle();

    let mut seen = Vec::new();
    for outputs in dispatcher.run_loop() {
        seen.push(outputs.get("B").copied());
        if seen.len() == 5 {
            handle.stop();
        }
    }

    assert_eq!(seen, vec![Some(2); 5]);
    assert!(!handle.is_running());
    assert_eq!(probe.count(&ProbeEvent::ExecuteBegin("A".to_string())), 5);

    // The loop is fused and not restartable.
    let mut again = dispatcher.run_loop();
    assert!(again.next().is_none());
    assert!(again.next().is_none());
    Ok(())
}

#[test]
fn stop_is_idempotent_and_kills_every_task_once() -> TestResult {
    let probe = Probe::new();
    let mut graph = DependencyGraph::new();
    graph.add(TaskScript::new("A").spec(&probe).output())?;
    graph.add(TaskScript::new("B").spec(&probe))?;

    let (dispatcher, _sink) = started(graph)?;
    dispatcher.forward(true)?;

    dispatcher.stop();
    dispatcher.stop();
    dispatcher.handle().stop();

    assert!(!dispatcher.is_running());
    assert_eq!(probe.count(&ProbeEvent::Killed("A".to_string())), 1);
    assert_eq!(probe.count(&ProbeEvent::Killed("B".to_string())), 1);
    assert!(matches!(dispatcher.forward(false), Err(PlumberError::Terminated)));
    assert!(matches!(
        dispatcher.node_result("A", None),
        Err(PlumberError::Terminated)
    ));
    Ok(())
}

#[test]
fn stop_releases_a_waiting_forward_promptly() -> TestResult {
    let probe = Probe::new();
    let mut graph = DependencyGraph::new();
    graph.add(TaskScript::new("Base").spec(&probe))?;
    graph.add(TaskScript::new("Hang").after("Base").hang_until_killed().spec(&probe).output())?;

    let (dispatcher, _sink) = started(graph)?;
    let handle = dispatcher.handle();
    let stopper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        handle.stop();
    });

    let begun = Instant::now();
    let result = dispatcher.forward(true);
    stopper.join().map_err(|_| "stopper thread panicked")?;

    assert!(matches!(result, Err(PlumberError::Terminated)), "got {result:?}");
    assert!(begun.elapsed() < Duration::from_secs(5));
    Ok(())
}

#[test]
fn tasks_see_the_engine_through_their_context() -> TestResult {
    let probe = Probe::new();
    let mut graph = DependencyGraph::new();
    graph.add(TaskScript::new("A").value(3).spec(&probe).output())?;

    let (dispatcher, _sink) = started(graph)?;
    let handle = dispatcher.handle();
    assert_eq!(handle.current_tick(), Some(0));
    assert_eq!(handle.result_of("A"), None);

    dispatcher.forward(true)?;
    assert_eq!(handle.current_tick(), Some(1));
    assert_eq!(handle.result_of("A"), Some(3));
    assert!(handle.is_running());

    drop(dispatcher);
    // Dropping the dispatcher stops the engine.
    assert!(!handle.is_running());
    Ok(())
}

#[test]
fn panicking_execute_is_a_fault_and_the_retry_succeeds() -> TestResult {
    let probe = Probe::new();
    let mut graph = DependencyGraph::new();
    graph.add(TaskScript::new("Explode").value(7).panic_times(1).spec(&probe))?;
    graph.add(TaskScript::new("After").value(1).after("Explode").spec(&probe).output())?;

    let (dispatcher, _sink) = started(graph)?;
    let outputs = dispatcher.forward(true)?;
    assert_eq!(outputs.get("After"), Some(&8));

    let stats = dispatcher.node_stats("Explode").ok_or("missing stats")?;
    assert_eq!(stats.faults, 1);
    assert_eq!(stats.executions, 2);
    // Default watchdog action is restart, which also applies to faults.
    assert_eq!(stats.restarts, 1);
    assert_eq!(probe.count(&ProbeEvent::Faulted("Explode".to_string())), 1);

    // The node is settled, not stuck in flight: the next tick runs normally.
    dispatcher.forward(true)?;
    assert_eq!(probe.count(&ProbeEvent::ExecuteBegin("Explode".to_string())), 3);
    Ok(())
}
