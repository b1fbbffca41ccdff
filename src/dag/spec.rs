// src/dag/spec.rs

//! Declarative description of a node to be added to a graph.

use std::fmt;

use crate::exec::{factory, Task, TaskFactory};
use crate::types::NodeId;
use crate::watchdog::WatchdogConfig;

/// Everything `DependencyGraph::add` needs to register one node.
///
/// ```ignore
/// let a = graph.add(NodeSpec::new(|| Ok(Fetch::new("A"))))?;
/// let b = graph.add(
///     NodeSpec::new(|| Ok(Parse::new("B")))
///         .after(&a)
///         .output()
///         .watchdog(WatchdogConfig::enabled(WatchdogAction::Restart, Duration::from_secs(5))),
/// )?;
/// ```
pub struct NodeSpec<V> {
    pub(crate) factory: TaskFactory<V>,
    pub(crate) deps: Vec<NodeId>,
    pub(crate) output: bool,
    pub(crate) watchdog: Option<WatchdogConfig>,
}

impl<V: Clone + Send + Sync + 'static> NodeSpec<V> {
    /// Spec for a task built by `make`. The closure captures whatever
    /// construction parameters the task needs and is called again on every
    /// restart.
    pub fn new<T, F>(make: F) -> Self
    where
        T: Task<Output = V>,
        F: Fn() -> anyhow::Result<T> + Send + Sync + 'static,
    {
        Self::from_factory(factory(make))
    }
}

impl<V> NodeSpec<V> {
    pub fn from_factory(factory: TaskFactory<V>) -> Self {
        Self {
            factory,
            deps: Vec::new(),
            output: false,
            watchdog: None,
        }
    }

    /// Depend on an already registered node (by handle or id).
    pub fn after(mut self, dep: impl AsRef<str>) -> Self {
        self.deps.push(dep.as_ref().to_string());
        self
    }

    pub fn after_all<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.deps
            .extend(deps.into_iter().map(|d| d.as_ref().to_string()));
        self
    }

    /// Mark the node as an output: its value is returned by `forward()`.
    pub fn output(self) -> Self {
        self.with_output(true)
    }

    pub fn with_output(mut self, output: bool) -> Self {
        self.output = output;
        self
    }

    /// Explicit watchdog settings; without them the graph's configured
    /// default (or per-node override) applies.
    pub fn watchdog(mut self, cfg: WatchdogConfig) -> Self {
        self.watchdog = Some(cfg);
        self
    }
}

impl<V> fmt::Debug for NodeSpec<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeSpec")
            .field("deps", &self.deps)
            .field("output", &self.output)
            .field("watchdog", &self.watchdog)
            .finish_non_exhaustive()
    }
}
