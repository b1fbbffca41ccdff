// tests/graph_construction.rs

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::TestResult;
use plumber::exec::SharedTask;
use plumber::{DependencyGraph, GraphBuilder, NodeSpec, PlumberError, WatchdogAction, WatchdogConfig};
use plumber_test_utils::{Probe, ProbeEvent, TaskScript};

#[test]
fn unknown_dependency_is_rejected_and_graph_is_unchanged() -> TestResult {
    let probe = Probe::new();
    let mut graph = DependencyGraph::new();
    graph.add(TaskScript::new("A").spec(&probe))?;

    let result = graph.add(TaskScript::new("B").after("Missing").spec(&probe));

    match result {
        Err(PlumberError::ConfigError(msg)) => {
            assert!(msg.contains("B"));
            assert!(msg.contains("Missing"));
        }
        other => panic!("expected ConfigError, got {other:?}"),
    }
    assert_eq!(graph.len(), 1);
    assert!(!graph.contains("B"));
    assert!(graph.dependents_of("A").is_empty());
    Ok(())
}

#[test]
fn duplicate_and_self_dependencies_are_rejected() -> TestResult {
    let probe = Probe::new();
    let mut graph = DependencyGraph::new();
    graph.add(TaskScript::new("A").spec(&probe))?;

    assert!(matches!(
        graph.add(TaskScript::new("A").spec(&probe)),
        Err(PlumberError::ConfigError(_))
    ));
    assert!(matches!(
        graph.add(TaskScript::new("S").after("S").spec(&probe)),
        Err(PlumberError::ConfigError(_))
    ));
    assert_eq!(graph.node_ids().collect::<Vec<_>>(), vec!["A"]);
    Ok(())
}

#[test]
fn add_constructs_task_eagerly_and_returns_its_handle() -> TestResult {
    let probe = Probe::new();
    let mut graph = DependencyGraph::new();
    let handle = graph.add(TaskScript::new("A").spec(&probe))?;

    assert_eq!(handle.id(), "A");
    assert_eq!(handle.to_string(), "A");
    assert_eq!(probe.events(), vec![ProbeEvent::Constructed("A".to_string())]);
    Ok(())
}

#[test]
fn failing_factory_surfaces_as_construction_error() {
    let mut graph: DependencyGraph<i64> = DependencyGraph::new();
    let spec = NodeSpec::from_factory(Arc::new(|| -> anyhow::Result<SharedTask<i64>> {
        Err(anyhow::anyhow!("no connection"))
    }));

    match graph.add(spec) {
        Err(PlumberError::Construction(err)) => assert!(err.to_string().contains("no connection")),
        other => panic!("expected Construction error, got {other:?}"),
    }
    assert!(graph.is_empty());
}

#[test]
fn invalid_watchdog_is_rejected_at_add() {
    let probe = Probe::new();
    let mut graph = DependencyGraph::new();
    let result = graph.add(
        TaskScript::new("A")
            .watchdog(WatchdogConfig::enabled(WatchdogAction::Warn, Duration::ZERO))
            .spec(&probe),
    );
    assert!(matches!(result, Err(PlumberError::ConfigError(_))));
    assert!(graph.is_empty());
}

#[test]
fn graph_queries_reflect_edges_and_outputs() -> TestResult {
    let probe = Probe::new();
    let mut graph = DependencyGraph::new();
    graph.add(TaskScript::new("A").spec(&probe))?;
    graph.add(TaskScript::new("B").after("A").spec(&probe))?;
    graph.add(TaskScript::new("C").after("A").after("A").spec(&probe))?;
    graph.add(TaskScript::new("D").after("B").after("C").spec(&probe).output())?;
    graph.add(TaskScript::new("E").spec(&probe).output())?;

    assert_eq!(graph.len(), 5);
    assert_eq!(graph.outputs(), &["D".to_string(), "E".to_string()]);
    // Repeated dependencies collapse into one edge.
    assert_eq!(graph.dependencies_of("C"), &["A".to_string()]);
    assert_eq!(graph.dependents_of("A"), vec!["B".to_string(), "C".to_string()]);

    let mut closure = graph.dependency_closure("D");
    closure.sort();
    assert_eq!(closure, vec!["A", "B", "C"]);
    assert!(graph.dependency_closure("E").is_empty());
    Ok(())
}

#[test]
fn watchdog_defaults_and_overrides_apply_to_new_nodes() -> TestResult {
    let probe = Probe::new();
    let default = WatchdogConfig::enabled(WatchdogAction::Warn, Duration::from_secs(2));
    let override_cfg = WatchdogConfig::enabled(WatchdogAction::Terminate, Duration::from_millis(500));
    let mut overrides = std::collections::BTreeMap::new();
    overrides.insert("Special".to_string(), override_cfg);

    let mut graph = DependencyGraph::with_watchdog_defaults(default, overrides);
    graph.add(TaskScript::new("Plain").spec(&probe))?;
    graph.add(TaskScript::new("Special").spec(&probe))?;
    let explicit = WatchdogConfig::disabled(WatchdogAction::Restart);
    graph.add(TaskScript::new("Explicit").watchdog(explicit).spec(&probe))?;

    assert_eq!(graph.watchdog_of("Plain"), Some(default));
    assert_eq!(graph.watchdog_of("Special"), Some(override_cfg));
    assert_eq!(graph.watchdog_of("Explicit"), Some(explicit));
    assert_eq!(graph.watchdog_of("Nope"), None);
    Ok(())
}

#[test]
fn builder_accepts_forward_references() -> TestResult {
    let probe = Probe::new();
    let mut builder = GraphBuilder::new();
    builder.add(TaskScript::new("Sum").after("Left").after("Right").spec(&probe).output())?;
    builder.add(TaskScript::new("Left").value(1).spec(&probe))?;
    builder.add(TaskScript::new("Right").value(2).after("Left").spec(&probe))?;

    let graph = builder.build()?;
    assert_eq!(graph.len(), 3);
    assert_eq!(graph.outputs(), &["Sum".to_string()]);

    let (dispatcher, _sink) = common::started(graph)?;
    let outputs = dispatcher.forward(true)?;
    // Right = 2 + Left, Sum = Left + Right.
    assert_eq!(outputs.get("Sum"), Some(&4));
    Ok(())
}

#[test]
fn builder_reports_cycles() -> TestResult {
    let probe = Probe::new();
    let mut builder = GraphBuilder::new();
    builder.add(TaskScript::new("A").after("C").spec(&probe))?;
    builder.add(TaskScript::new("B").after("A").spec(&probe))?;
    builder.add(TaskScript::new("C").after("B").spec(&probe))?;

    match builder.build() {
        Err(PlumberError::DagCycle(msg)) => {
            assert!(msg.contains("cycle detected"));
            assert!(msg.contains('A') || msg.contains('B') || msg.contains('C'));
        }
        Err(e) => panic!("expected DagCycle error, got: {e:?}"),
        Ok(_) => panic!("expected error, got Ok"),
    }
    Ok(())
}

#[test]
fn builder_reports_unknown_dependencies_and_duplicates() -> TestResult {
    let probe = Probe::new();
    let mut builder = GraphBuilder::new();
    builder.add(TaskScript::new("A").spec(&probe))?;
    assert!(matches!(
        builder.add(TaskScript::new("A").spec(&probe)),
        Err(PlumberError::ConfigError(_))
    ));
    builder.add(TaskScript::new("B").after("Ghost").spec(&probe))?;

    assert!(matches!(builder.build(), Err(PlumberError::ConfigError(_))));
    Ok(())
}
