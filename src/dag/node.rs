// src/dag/node.rs

//! Node metadata: task instance, watchdog state and per-tick execution mark.

use petgraph::graph::NodeIndex;
use tokio::task::AbortHandle;

use crate::exec::{SharedTask, TaskFactory};
use crate::types::NodeId;
use crate::watchdog::WatchdogConfig;

/// Execution state of a node within one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExecState {
    /// Not yet claimed in this tick.
    Pending,
    /// Claimed by a worker that is resolving dependencies or executing.
    InFlight,
    /// Produced a value in this tick.
    Done,
    /// Gave up in this tick (bounded retry policy, failed dependency).
    Failed,
}

/// An [`ExecState`] tagged with the tick it belongs to.
///
/// A mark from an older tick reads as `Pending`, so opening a new tick does
/// not have to touch every node.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ExecMark {
    tick: u64,
    state: ExecState,
}

impl ExecMark {
    fn new() -> Self {
        Self {
            tick: 0,
            state: ExecState::Pending,
        }
    }

    pub(crate) fn state_in(&self, tick: u64) -> ExecState {
        if self.tick == tick {
            self.state
        } else {
            ExecState::Pending
        }
    }

    /// Whether a worker of an older tick still owns the node.
    pub(crate) fn in_flight_before(&self, tick: u64) -> bool {
        self.tick < tick && self.state == ExecState::InFlight
    }

    /// Whether the mark still belongs to `tick`.
    pub(crate) fn owned_by(&self, tick: u64) -> bool {
        self.tick == tick
    }

    pub(crate) fn set(&mut self, tick: u64, state: ExecState) {
        self.tick = tick;
        self.state = state;
    }
}

/// Lifetime counters of a node, exposed through `Dispatcher::node_stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeStats {
    /// `execute()` calls started.
    pub executions: u64,
    /// `execute()` calls that returned an error.
    pub faults: u64,
    /// Times the watchdog timer elapsed while `execute()` was running.
    pub timeouts: u64,
    /// Task instances replaced by a restart action.
    pub restarts: u64,
    /// Ticks in which the node produced a value.
    pub completions: u64,
}

/// A graph vertex wrapping one task instance plus its metadata.
pub(crate) struct Node<V> {
    pub(crate) id: NodeId,
    pub(crate) index: NodeIndex,
    /// Direct dependencies, in declaration order.
    pub(crate) deps: Vec<NodeId>,
    pub(crate) factory: TaskFactory<V>,
    pub(crate) task: SharedTask<V>,
    pub(crate) watchdog: WatchdogConfig,
    /// Present while the watchdog is armed, tagged with the arming tick.
    pub(crate) timer: Option<(u64, AbortHandle)>,
    pub(crate) mark: ExecMark,
    pub(crate) stats: NodeStats,
}

impl<V> Node<V> {
    pub(crate) fn new(
        id: NodeId,
        index: NodeIndex,
        deps: Vec<NodeId>,
        factory: TaskFactory<V>,
        task: SharedTask<V>,
        watchdog: WatchdogConfig,
    ) -> Self {
        Self {
            id,
            index,
            deps,
            factory,
            task,
            watchdog,
            timer: None,
            mark: ExecMark::new(),
            stats: NodeStats::default(),
        }
    }
}
