// src/dag/graph.rs

use std::collections::{BTreeMap, HashMap, HashSet};

use petgraph::graph::DiGraph;
use petgraph::visit::{Dfs, Reversed};
use petgraph::Direction;
use tracing::debug;

use crate::config::ConfigFile;
use crate::dag::node::Node;
use crate::dag::spec::NodeSpec;
use crate::errors::{PlumberError, Result};
use crate::exec::{SharedTask, TaskContext, TaskFactory};
use crate::types::{NodeId, TaskHandle};
use crate::watchdog::WatchdogConfig;

/// Registry of nodes and dependency edges.
///
/// Edge direction: dependency -> dependent. For `B.after(A)` we add `A -> B`.
///
/// A node may only name dependencies that are already registered, so the
/// graph is acyclic by construction. Use [`GraphBuilder`](crate::dag::GraphBuilder)
/// to declare nodes in arbitrary order instead.
pub struct DependencyGraph<V> {
    nodes: HashMap<NodeId, Node<V>>,
    /// Node ids in registration order.
    order: Vec<NodeId>,
    edges: DiGraph<NodeId, ()>,
    outputs: Vec<NodeId>,
    default_watchdog: WatchdogConfig,
    watchdog_overrides: BTreeMap<NodeId, WatchdogConfig>,
}

impl<V: Clone + Send + Sync + 'static> Default for DependencyGraph<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone + Send + Sync + 'static> DependencyGraph<V> {
    /// Empty graph; nodes without explicit watchdog settings get a disabled
    /// watchdog with the `restart` action.
    pub fn new() -> Self {
        Self::with_watchdog_defaults(WatchdogConfig::default(), BTreeMap::new())
    }

    /// Empty graph using the `[watchdog]` defaults and `[node.<id>.watchdog]`
    /// overrides of a validated config.
    pub fn from_config(cfg: &ConfigFile) -> Self {
        Self::with_watchdog_defaults(cfg.watchdog, cfg.node_watchdogs.clone())
    }

    pub fn with_watchdog_defaults(
        default_watchdog: WatchdogConfig,
        watchdog_overrides: BTreeMap<NodeId, WatchdogConfig>,
    ) -> Self {
        Self {
            nodes: HashMap::new(),
            order: Vec::new(),
            edges: DiGraph::new(),
            outputs: Vec::new(),
            default_watchdog,
            watchdog_overrides,
        }
    }

    /// Construct the task eagerly and register it as a node.
    ///
    /// Fails with [`PlumberError::ConfigError`] if a dependency is not yet
    /// registered, the task's name is already taken, or the watchdog settings
    /// are invalid. On failure the graph is left unmodified.
    pub fn add(&mut self, spec: NodeSpec<V>) -> Result<TaskHandle> {
        let NodeSpec {
            factory,
            deps,
            output,
            watchdog,
        } = spec;

        let task = factory().map_err(PlumberError::Construction)?;
        let id = task.name().to_string();
        self.insert(id, factory, task, deps, output, watchdog)
    }

    /// Register an already constructed task. Shared with `GraphBuilder`.
    pub(crate) fn insert(
        &mut self,
        id: NodeId,
        factory: TaskFactory<V>,
        task: SharedTask<V>,
        deps: Vec<NodeId>,
        output: bool,
        watchdog: Option<WatchdogConfig>,
    ) -> Result<TaskHandle> {
        if id.trim().is_empty() {
            return Err(PlumberError::ConfigError(
                "task name must not be empty".to_string(),
            ));
        }
        if self.nodes.contains_key(&id) {
            return Err(PlumberError::ConfigError(format!(
                "task '{id}' is already registered"
            )));
        }

        let deps = dedup_preserving_order(deps);
        for dep in deps.iter() {
            if dep == &id {
                return Err(PlumberError::ConfigError(format!(
                    "task '{id}' cannot depend on itself"
                )));
            }
            if !self.nodes.contains_key(dep) {
                return Err(PlumberError::ConfigError(format!(
                    "task '{id}' has unknown dependency '{dep}' \
                     (dependencies must be added before their dependents)"
                )));
            }
        }

        let watchdog = watchdog
            .or_else(|| self.watchdog_overrides.get(&id).copied())
            .unwrap_or(self.default_watchdog);
        watchdog.validate()?;

        // Validation done; from here on nothing fails.
        let index = self.edges.add_node(id.clone());
        for dep in deps.iter() {
            let dep_index = self.nodes[dep].index;
            self.edges.add_edge(dep_index, index, ());
        }

        debug!(
            node = %id,
            deps = ?deps,
            output,
            watchdog_enabled = watchdog.enabled,
            action = %watchdog.action,
            "registered node"
        );

        self.nodes.insert(
            id.clone(),
            Node::new(id.clone(), index, deps, factory, task, watchdog),
        );
        self.order.push(id.clone());
        if output {
            self.outputs.push(id.clone());
        }

        Ok(TaskHandle::new(id))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// All node ids, in registration order.
    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|s| s.as_str())
    }

    /// Output node ids, in registration order.
    pub fn outputs(&self) -> &[NodeId] {
        &self.outputs
    }

    /// Immediate dependencies of a node, in declaration order.
    pub fn dependencies_of(&self, id: &str) -> &[NodeId] {
        self.nodes
            .get(id)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents of a node, in registration order.
    pub fn dependents_of(&self, id: &str) -> Vec<NodeId> {
        let Some(node) = self.nodes.get(id) else {
            return Vec::new();
        };
        let mut dependents: Vec<_> = self
            .edges
            .neighbors_directed(node.index, Direction::Outgoing)
            .collect();
        dependents.sort();
        dependents
            .into_iter()
            .map(|ix| self.edges[ix].clone())
            .collect()
    }

    /// Transitive dependencies of a node (not including the node itself),
    /// in registration order.
    pub fn dependency_closure(&self, id: &str) -> Vec<NodeId> {
        let Some(node) = self.nodes.get(id) else {
            return Vec::new();
        };
        let upstream = Reversed(&self.edges);
        let mut dfs = Dfs::new(upstream, node.index);
        let mut found = Vec::new();
        while let Some(ix) = dfs.next(upstream) {
            if ix != node.index {
                found.push(ix);
            }
        }
        found.sort();
        found
            .into_iter()
            .map(|ix| self.edges[ix].clone())
            .collect()
    }

    /// Effective watchdog settings of a node.
    pub fn watchdog_of(&self, id: &str) -> Option<WatchdogConfig> {
        self.nodes.get(id).map(|n| n.watchdog)
    }

    pub(crate) fn node(&self, id: &str) -> Option<&Node<V>> {
        self.nodes.get(id)
    }

    pub(crate) fn node_mut(&mut self, id: &str) -> Option<&mut Node<V>> {
        self.nodes.get_mut(id)
    }

    /// Nodes in registration order.
    pub(crate) fn nodes(&self) -> impl Iterator<Item = &Node<V>> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    pub(crate) fn nodes_mut(&mut self) -> impl Iterator<Item = &mut Node<V>> {
        self.nodes.values_mut()
    }

    /// Call `setup` on every task, in registration order.
    pub(crate) fn setup_all(
        &self,
        mut context_for: impl FnMut(&str) -> TaskContext<V>,
    ) -> Result<()> {
        for node in self.nodes() {
            debug!(node = %node.id, "setting up task");
            node.task
                .setup(context_for(&node.id))
                .map_err(|source| PlumberError::Lifecycle {
                    node: node.id.clone(),
                    phase: "setup",
                    source,
                })?;
        }
        Ok(())
    }

    /// Call `start` on every task, in registration order.
    pub(crate) fn start_all(&self) -> Result<()> {
        for node in self.nodes() {
            debug!(node = %node.id, "starting task");
            node.task
                .start()
                .map_err(|source| PlumberError::Lifecycle {
                    node: node.id.clone(),
                    phase: "start",
                    source,
                })?;
        }
        Ok(())
    }
}

fn dedup_preserving_order(deps: Vec<NodeId>) -> Vec<NodeId> {
    let mut seen = HashSet::new();
    deps.into_iter()
        .filter(|d| seen.insert(d.clone()))
        .collect()
}
