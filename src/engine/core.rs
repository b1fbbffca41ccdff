// src/engine/core.rs

//! Shared engine state.
//!
//! Everything mutable lives in one [`EngineState`] behind one mutex: the
//! dependency graph (task instances, timers, execution marks) and the
//! current tick. A single condvar is signalled whenever a node settles, a
//! tick is opened, or the engine stops.
//!
//! The lock is held only around metadata access, never across
//! `Task::execute`.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};

use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::dag::node::ExecState;
use crate::dag::DependencyGraph;
use crate::errors::{PlumberError, Result};
use crate::exec::{RetryPolicy, SharedTask, Sink};
use crate::types::{NodeId, TickOutputs};

/// Lifecycle phase of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Built,
    SetUp,
    Started,
}

/// Per-`forward()` state.
pub(crate) struct Tick<V> {
    pub(crate) id: u64,
    /// Every node settled in this tick, outputs or not.
    pub(crate) results: HashMap<NodeId, V>,
}

pub(crate) struct EngineState<V> {
    pub(crate) graph: DependencyGraph<V>,
    pub(crate) tick: Tick<V>,
    pub(crate) phase: Phase,
    /// Kept after setup so that restarted tasks get the same context.
    pub(crate) sink: Option<Arc<dyn Sink<V>>>,
}

pub(crate) struct Engine<V> {
    state: Mutex<EngineState<V>>,
    settled: Condvar,
    running: AtomicBool,
    pub(crate) runtime: Handle,
    pub(crate) retry: RetryPolicy,
}

impl<V: Clone + Send + Sync + 'static> Engine<V> {
    pub(crate) fn new(graph: DependencyGraph<V>, runtime: Handle, retry: RetryPolicy) -> Self {
        Self {
            state: Mutex::new(EngineState {
                graph,
                tick: Tick {
                    id: 0,
                    results: HashMap::new(),
                },
                phase: Phase::Built,
                sink: None,
            }),
            settled: Condvar::new(),
            running: AtomicBool::new(true),
            runtime,
            retry,
        }
    }

    /// Lock the engine state. A panic inside a task never happens under
    /// this lock, so a poisoned mutex still holds consistent data.
    pub(crate) fn lock(&self) -> MutexGuard<'_, EngineState<V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until something settles (node result, new tick, stop).
    pub(crate) fn wait<'a>(
        &self,
        guard: MutexGuard<'a, EngineState<V>>,
    ) -> MutexGuard<'a, EngineState<V>> {
        self.settled
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn notify_settled(&self) {
        self.settled.notify_all();
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Set the running flag false, cancel every watchdog, kill every task
    /// and wake all waiters. Idempotent and final.
    pub(crate) fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            debug!("stop requested but engine is already stopped");
            return;
        }
        warn!("stopping engine: cancelling watchdogs and killing all tasks");

        let tasks: Vec<(NodeId, SharedTask<V>)> = {
            let mut guard = self.lock();
            for node in guard.graph.nodes_mut() {
                if let Some((_, timer)) = node.timer.take() {
                    timer.abort();
                }
            }
            guard
                .graph
                .nodes()
                .map(|n| (n.id.clone(), Arc::clone(&n.task)))
                .collect()
        };
        self.notify_settled();

        for (id, task) in tasks {
            debug!(node = %id, "killing task");
            task.kill();
        }

        info!("engine stopped");
    }

    /// Open a new tick and return its id plus the output ids to resolve.
    pub(crate) fn begin_tick(&self) -> Result<(u64, Vec<NodeId>)> {
        let (tick, outputs) = {
            let mut guard = self.lock();
            self.ensure_started(&guard)?;
            guard.tick.id += 1;
            guard.tick.results.clear();
            (guard.tick.id, guard.graph.outputs().to_vec())
        };
        // Wake waiters of the previous tick so they can notice it is gone.
        self.notify_settled();
        debug!(tick, outputs = ?outputs, "tick opened");
        Ok((tick, outputs))
    }

    /// Id of the current tick, for resolving outside of `forward()`.
    pub(crate) fn current_tick(&self) -> Result<u64> {
        let guard = self.lock();
        self.ensure_started(&guard)?;
        Ok(guard.tick.id)
    }

    fn ensure_started(&self, state: &EngineState<V>) -> Result<()> {
        if !self.is_running() {
            return Err(PlumberError::Terminated);
        }
        if state.phase != Phase::Started {
            return Err(PlumberError::NotStarted);
        }
        Ok(())
    }

    /// Block until every output of `tick` has settled or the engine stops.
    pub(crate) fn wait_for_outputs(&self, tick: u64, outputs: &[NodeId]) -> Result<()> {
        let mut guard = self.lock();
        loop {
            if !self.is_running() {
                return Err(PlumberError::Terminated);
            }
            if guard.tick.id != tick {
                return Err(PlumberError::TickSuperseded(tick));
            }
            let unsettled = outputs.iter().any(|id| {
                guard.graph.node(id).is_some_and(|n| {
                    matches!(
                        n.mark.state_in(tick),
                        ExecState::Pending | ExecState::InFlight
                    )
                })
            });
            if !unsettled {
                return Ok(());
            }
            guard = self.wait(guard);
        }
    }
}

impl<V: Clone + Send + Sync + 'static> Engine<V> {
    /// Outputs of `tick` that have a value so far.
    pub(crate) fn collect_outputs(&self, tick: u64, outputs: &[NodeId]) -> TickOutputs<V> {
        let guard = self.lock();
        if guard.tick.id != tick {
            return TickOutputs::new();
        }
        outputs
            .iter()
            .filter_map(|id| {
                guard
                    .tick
                    .results
                    .get(id)
                    .map(|v| (id.clone(), v.clone()))
            })
            .collect()
    }

    pub(crate) fn result_of(&self, id: &str) -> Option<V> {
        self.lock().tick.results.get(id).cloned()
    }
}

/// Cloneable, non-owning handle to a running engine.
///
/// Handed to tasks through their `TaskContext`; also available from
/// `Dispatcher::handle` for other threads. All methods become no-ops once
/// the dispatcher is dropped.
pub struct EngineHandle<V> {
    engine: Weak<Engine<V>>,
}

impl<V: Clone + Send + Sync + 'static> EngineHandle<V> {
    pub(crate) fn new(engine: &Arc<Engine<V>>) -> Self {
        Self {
            engine: Arc::downgrade(engine),
        }
    }

    /// Stop the engine, as a `terminate` watchdog action would.
    pub fn stop(&self) {
        if let Some(engine) = self.engine.upgrade() {
            engine.stop();
        }
    }

    pub fn is_running(&self) -> bool {
        self.engine
            .upgrade()
            .is_some_and(|engine| engine.is_running())
    }

    /// Id of the tick currently open (0 before the first `forward()`).
    pub fn current_tick(&self) -> Option<u64> {
        self.engine.upgrade().map(|engine| engine.lock().tick.id)
    }
}

impl<V: Clone + Send + Sync + 'static> EngineHandle<V> {
    /// Value produced by `node` in the current tick, if settled.
    pub fn result_of(&self, node: &str) -> Option<V> {
        self.engine.upgrade()?.result_of(node)
    }
}

impl<V> Clone for EngineHandle<V> {
    fn clone(&self) -> Self {
        Self {
            engine: Weak::clone(&self.engine),
        }
    }
}

impl<V: Clone + Send + Sync + 'static> fmt::Debug for EngineHandle<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHandle")
            .field("running", &self.is_running())
            .finish()
    }
}
