// src/dag/builder.rs

//! Two-phase graph construction.
//!
//! `DependencyGraph::add` requires dependencies to be registered first.
//! `GraphBuilder` lifts that restriction: nodes may reference dependencies
//! declared later, and the whole graph is checked for unknown references and
//! cycles in `build()`, before anything is registered.

use std::collections::BTreeMap;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::ConfigFile;
use crate::dag::graph::DependencyGraph;
use crate::dag::spec::NodeSpec;
use crate::errors::{PlumberError, Result};
use crate::exec::{SharedTask, TaskFactory};
use crate::types::{NodeId, TaskHandle};
use crate::watchdog::WatchdogConfig;

struct Declared<V> {
    factory: TaskFactory<V>,
    task: SharedTask<V>,
    deps: Vec<NodeId>,
    output: bool,
    watchdog: Option<WatchdogConfig>,
}

pub struct GraphBuilder<V> {
    declared: BTreeMap<NodeId, Declared<V>>,
    /// Declaration order.
    order: Vec<NodeId>,
    default_watchdog: WatchdogConfig,
    watchdog_overrides: BTreeMap<NodeId, WatchdogConfig>,
}

impl<V: Clone + Send + Sync + 'static> Default for GraphBuilder<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone + Send + Sync + 'static> GraphBuilder<V> {
    pub fn new() -> Self {
        Self {
            declared: BTreeMap::new(),
            order: Vec::new(),
            default_watchdog: WatchdogConfig::default(),
            watchdog_overrides: BTreeMap::new(),
        }
    }

    pub fn from_config(cfg: &ConfigFile) -> Self {
        Self {
            default_watchdog: cfg.watchdog,
            watchdog_overrides: cfg.node_watchdogs.clone(),
            ..Self::new()
        }
    }

    /// Construct the task and declare it. Dependencies are not checked yet.
    pub fn add(&mut self, spec: NodeSpec<V>) -> Result<TaskHandle> {
        let NodeSpec {
            factory,
            deps,
            output,
            watchdog,
        } = spec;

        let task = factory().map_err(PlumberError::Construction)?;
        let id = task.name().to_string();
        if self.declared.contains_key(&id) {
            return Err(PlumberError::ConfigError(format!(
                "task '{id}' is declared twice"
            )));
        }

        self.declared.insert(
            id.clone(),
            Declared {
                factory,
                task,
                deps,
                output,
                watchdog,
            },
        );
        self.order.push(id.clone());
        Ok(TaskHandle::new(id))
    }

    /// Validate the declared graph and register every node in dependency
    /// order.
    pub fn build(mut self) -> Result<DependencyGraph<V>> {
        let order = self.topological_order()?;

        let mut graph = DependencyGraph::with_watchdog_defaults(
            self.default_watchdog,
            std::mem::take(&mut self.watchdog_overrides),
        );
        for id in order {
            let Some(d) = self.declared.remove(&id) else {
                return Err(PlumberError::TaskNotFound(id));
            };
            graph.insert(id, d.factory, d.task, d.deps, d.output, d.watchdog)?;
        }
        Ok(graph)
    }

    /// Dependency-respecting registration order.
    fn topological_order(&self) -> Result<Vec<NodeId>> {
        let mut g: DiGraphMap<&str, ()> = DiGraphMap::new();

        for id in self.order.iter() {
            g.add_node(id.as_str());
        }

        for (id, d) in self.declared.iter() {
            for dep in d.deps.iter() {
                if !self.declared.contains_key(dep) {
                    return Err(PlumberError::ConfigError(format!(
                        "task '{id}' has unknown dependency '{dep}'"
                    )));
                }
                if dep == id {
                    return Err(PlumberError::ConfigError(format!(
                        "task '{id}' cannot depend on itself"
                    )));
                }
                g.add_edge(dep.as_str(), id.as_str(), ());
            }
        }

        // A topological sort fails if there is a cycle.
        match toposort(&g, None) {
            Ok(order) => Ok(order.into_iter().map(str::to_string).collect()),
            Err(cycle) => Err(PlumberError::DagCycle(format!(
                "cycle detected in task graph involving task '{}'",
                cycle.node_id()
            ))),
        }
    }
}
