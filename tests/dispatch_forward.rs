// tests/dispatch_forward.rs

mod common;

use std::thread;
use std::time::Duration;

use common::{started, TestResult};
use plumber::{DependencyGraph, PlumberError};
use plumber_test_utils::{Probe, ProbeEvent, TaskScript};

fn ev_begin(n: &str) -> ProbeEvent {
    ProbeEvent::ExecuteBegin(n.to_string())
}

fn ev_end(n: &str) -> ProbeEvent {
    ProbeEvent::ExecuteEnd(n.to_string())
}

#[test]
fn dependency_completes_before_dependent_and_output_is_returned() -> TestResult {
    let probe = Probe::new();
    let mut graph = DependencyGraph::new();
    let a = graph.add(TaskScript::new("A").value(2).spec(&probe))?;
    graph.add(TaskScript::new("B").value(40).after(a.id()).spec(&probe).output())?;

    let (dispatcher, sink) = started(graph)?;
    let outputs = dispatcher.forward(true)?;

    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs.get("B"), Some(&42));

    let end_a = probe.positions(&ev_end("A"));
    let begin_b = probe.positions(&ev_begin("B"));
    assert_eq!(end_a.len(), 1);
    assert_eq!(begin_b.len(), 1);
    assert!(end_a[0] < begin_b[0], "A must finish before B starts: {:?}", probe.events());

    // Both tasks pushed their value into the shared sink.
    let collected = sink.collected();
    assert!(collected.contains(&("A".to_string(), 2)));
    assert!(collected.contains(&("B".to_string(), 42)));
    Ok(())
}

#[test]
fn lifecycle_runs_setup_then_start_once_per_task() -> TestResult {
    let probe = Probe::new();
    let mut graph = DependencyGraph::new();
    graph.add(TaskScript::new("A").spec(&probe))?;
    graph.add(TaskScript::new("B").after("A").spec(&probe).output())?;

    let (dispatcher, _sink) = started(graph)?;
    dispatcher.forward(true)?;
    dispatcher.forward(true)?;

    for name in ["A", "B"] {
        let n = name.to_string();
        assert_eq!(probe.count(&ProbeEvent::Constructed(n.clone())), 1);
        assert_eq!(probe.count(&ProbeEvent::Setup(n.clone())), 1);
        assert_eq!(probe.count(&ProbeEvent::Started(n.clone())), 1);
        let setup = probe.positions(&ProbeEvent::Setup(n.clone()))[0];
        let start = probe.positions(&ProbeEvent::Started(n.clone()))[0];
        let first_exec = probe.positions(&ev_begin(name))[0];
        assert!(setup < start && start < first_exec);
    }
    Ok(())
}

#[test]
fn shared_dependency_executes_once_per_tick() -> TestResult {
    let probe = Probe::new();
    let mut graph = DependencyGraph::new();
    graph.add(TaskScript::new("A").value(1).delay_ms(20).spec(&probe))?;
    graph.add(TaskScript::new("B").value(10).after("A").spec(&probe))?;
    graph.add(TaskScript::new("C").value(100).after("A").spec(&probe))?;
    graph.add(TaskScript::new("D").after("B").after("C").spec(&probe).output())?;
    graph.add(TaskScript::new("E").after("B").spec(&probe).output())?;
    graph.add(TaskScript::new("F").after("C").spec(&probe).output())?;

    let (dispatcher, _sink) = started(graph)?;

    for tick in 1..=3usize {
        let outputs = dispatcher.forward(true)?;
        assert_eq!(outputs.get("D"), Some(&112));
        assert_eq!(outputs.get("E"), Some(&11));
        assert_eq!(outputs.get("F"), Some(&101));

        for name in ["A", "B", "C", "D", "E", "F"] {
            assert_eq!(probe.count(&ev_begin(name)), tick, "node {name} in tick {tick}");
        }
    }

    let stats = dispatcher.node_stats("A").ok_or("missing stats for A")?;
    assert_eq!(stats.executions, 3);
    assert_eq!(stats.completions, 3);
    assert_eq!(stats.faults, 0);
    Ok(())
}

#[test]
fn nodes_outside_the_output_closure_never_execute() -> TestResult {
    let probe = Probe::new();
    let mut graph = DependencyGraph::new();
    graph.add(TaskScript::new("A").spec(&probe))?;
    graph.add(TaskScript::new("B").after("A").spec(&probe).output())?;
    graph.add(TaskScript::new("Unused").after("A").spec(&probe))?;

    let (dispatcher, _sink) = started(graph)?;
    dispatcher.forward(true)?;
    dispatcher.forward(true)?;

    assert_eq!(probe.count(&ev_begin("Unused")), 0);
    assert_eq!(probe.count(&ev_begin("A")), 2);
    Ok(())
}

#[test]
fn node_result_resolves_a_non_output_on_demand() -> TestResult {
    let probe = Probe::new();
    let mut graph = DependencyGraph::new();
    graph.add(TaskScript::new("A").value(5).spec(&probe))?;
    graph.add(TaskScript::new("Side").value(1).after("A").spec(&probe))?;
    graph.add(TaskScript::new("Out").after("A").spec(&probe).output())?;

    let (dispatcher, _sink) = started(graph)?;
    dispatcher.forward(true)?;

    let seen = std::sync::Mutex::new(Vec::new());
    let callback = |id: &str, v: &i64| seen.lock().unwrap().push((id.to_string(), *v));
    let value = dispatcher.node_result("Side", Some(&callback))?;

    assert_eq!(value, 6);
    // A was memoized from the tick; Side ran exactly once.
    assert_eq!(probe.count(&ev_begin("A")), 1);
    assert_eq!(probe.count(&ev_begin("Side")), 1);
    assert_eq!(seen.lock().unwrap().as_slice(), &[("Side".to_string(), 6)]);
    Ok(())
}

#[test]
fn forward_without_wait_returns_immediately() -> TestResult {
    let probe = Probe::new();
    let mut graph = DependencyGraph::new();
    graph.add(TaskScript::new("Slow").value(7).delay_ms(200).spec(&probe).output())?;

    let (dispatcher, _sink) = started(graph)?;
    let outputs = dispatcher.forward(false)?;
    assert!(outputs.is_empty());

    // Give the detached worker a chance to start before the next tick.
    thread::sleep(Duration::from_millis(20));
    let outputs = dispatcher.forward(true)?;
    assert_eq!(outputs.get("Slow"), Some(&7));
    Ok(())
}

#[test]
fn forward_before_start_is_rejected() -> TestResult {
    common::init_tracing();
    let probe = Probe::new();
    let mut graph = DependencyGraph::new();
    graph.add(TaskScript::new("A").spec(&probe).output())?;

    let dispatcher = plumber::Dispatcher::new(graph)?;
    assert!(matches!(dispatcher.forward(true), Err(PlumberError::NotStarted)));
    assert!(matches!(dispatcher.start(), Err(PlumberError::NotStarted)));

    dispatcher.setup(std::sync::Arc::new(plumber::NullSink))?;
    assert!(matches!(
        dispatcher.setup(std::sync::Arc::new(plumber::NullSink)),
        Err(PlumberError::ConfigError(_))
    ));
    dispatcher.start()?;
    assert!(matches!(dispatcher.start(), Err(PlumberError::ConfigError(_))));
    Ok(())
}
