// src/engine/resolver.rs

//! Demand-driven resolution of a node within one tick.
//!
//! `node_result` pulls the node's dependency closure depth-first, in
//! declaration order, then executes the node itself under its watchdog.
//! Each node is claimed through its execution mark before anything runs,
//! so a dependency shared by several outputs executes at most once per tick;
//! later callers wait for the first one to settle. A node still owned by a
//! worker of a superseded tick is not claimed until that worker settles, so
//! one instance never runs two `execute()` calls at once.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, error, trace, warn};

use crate::dag::node::ExecState;
use crate::engine::core::Engine;
use crate::errors::{PlumberError, Result};
use crate::types::NodeId;
use crate::watchdog::FireCause;

/// Optional callback invoked once a node produced its value.
pub type ResultCallback<'a, V> = &'a dyn Fn(&str, &V);

enum Claim<V> {
    /// Already produced in this tick.
    Settled(V),
    /// This caller owns the node for the tick and must resolve it.
    Owned(Vec<NodeId>),
}

impl<V: Clone + Send + Sync + 'static> Engine<V> {
    pub(crate) fn node_result(
        self: &Arc<Self>,
        tick: u64,
        id: &str,
        on_result: Option<ResultCallback<'_, V>>,
    ) -> Result<V> {
        let deps = match self.claim(tick, id)? {
            Claim::Settled(value) => return Ok(value),
            Claim::Owned(deps) => deps,
        };

        for dep in deps.iter() {
            if let Err(err) = self.node_result(tick, dep, None) {
                self.settle(tick, id, None);
                return Err(match err {
                    PlumberError::Terminated | PlumberError::TickSuperseded(_) => err,
                    other => {
                        debug!(node = %id, dep = %dep, tick, error = %other, "dependency produced no result");
                        PlumberError::NodeFailed {
                            node: id.to_string(),
                        }
                    }
                });
            }
        }

        self.arm(id, tick);
        let outcome = self.execute_with_retry(tick, id);
        self.disarm(id, tick);

        match outcome {
            Ok(value) => {
                self.settle(tick, id, Some(&value));
                if let Some(callback) = on_result {
                    callback(id, &value);
                }
                Ok(value)
            }
            Err(err) => {
                self.settle(tick, id, None);
                Err(err)
            }
        }
    }

    /// Memo check: return the settled value, wait for another worker, or
    /// take ownership of the node for this tick.
    fn claim(&self, tick: u64, id: &str) -> Result<Claim<V>> {
        let mut guard = self.lock();
        loop {
            if !self.is_running() {
                return Err(PlumberError::Terminated);
            }
            let state = &mut *guard;
            if state.tick.id != tick {
                return Err(PlumberError::TickSuperseded(tick));
            }
            let node = state
                .graph
                .node_mut(id)
                .ok_or_else(|| PlumberError::TaskNotFound(id.to_string()))?;

            if node.mark.in_flight_before(tick) {
                trace!(node = %id, tick, "waiting for worker of a superseded tick");
                guard = self.wait(guard);
                continue;
            }

            match node.mark.state_in(tick) {
                ExecState::Done => {
                    trace!(node = %id, tick, "memoized");
                    return state
                        .tick
                        .results
                        .get(id)
                        .cloned()
                        .map(Claim::Settled)
                        .ok_or_else(|| PlumberError::NodeFailed {
                            node: id.to_string(),
                        });
                }
                ExecState::Failed => {
                    return Err(PlumberError::NodeFailed {
                        node: id.to_string(),
                    });
                }
                ExecState::Pending => {
                    node.mark.set(tick, ExecState::InFlight);
                    return Ok(Claim::Owned(node.deps.clone()));
                }
                ExecState::InFlight => {
                    trace!(node = %id, tick, "waiting for in-flight node");
                }
            }
            guard = self.wait(guard);
        }
    }

    /// Call `execute()` on the node's current task instance until it
    /// succeeds, the engine stops, the tick is superseded, or the retry
    /// policy gives up. A restart may swap the instance between attempts.
    fn execute_with_retry(self: &Arc<Self>, tick: u64, id: &str) -> Result<V> {
        let mut failures: u32 = 0;
        loop {
            let task = {
                let mut guard = self.lock();
                if !self.is_running() {
                    return Err(PlumberError::Terminated);
                }
                let state = &mut *guard;
                if state.tick.id != tick {
                    debug!(node = %id, tick, "tick superseded; abandoning execution");
                    return Err(PlumberError::TickSuperseded(tick));
                }
                let node = state
                    .graph
                    .node_mut(id)
                    .ok_or_else(|| PlumberError::TaskNotFound(id.to_string()))?;
                node.stats.executions += 1;
                Arc::clone(&node.task)
            };

            trace!(node = %id, tick, attempt = failures + 1, "executing");
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| task.execute()))
                .unwrap_or_else(|payload| {
                    Err(anyhow::anyhow!("execute() panicked: {}", panic_message(&*payload)))
                });
            let err = match outcome {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            drop(task);

            failures += 1;
            if let Some(node) = self.lock().graph.node_mut(id) {
                node.stats.faults += 1;
            }
            if !self.is_running() {
                return Err(PlumberError::Terminated);
            }
            warn!(
                node = %id,
                tick,
                attempt = failures,
                error = %format!("{err:#}"),
                "execute failed"
            );

            self.fire(id, FireCause::Fault);

            if self.retry.exhausted(failures) {
                error!(node = %id, tick, attempts = failures, "giving up on node for this tick");
                return Err(PlumberError::RetriesExhausted {
                    node: id.to_string(),
                    attempts: failures,
                });
            }

            let delay = self.retry.delay_after(failures);
            if !delay.is_zero() {
                trace!(node = %id, delay_ms = delay.as_millis() as u64, "backing off");
                std::thread::sleep(delay);
            }
        }
    }

    /// Record the outcome of an owned node and wake everyone waiting on it.
    /// Outcomes of a superseded tick are dropped, but the node is released
    /// so the current tick can claim it.
    fn settle(&self, tick: u64, id: &str, value: Option<&V>) {
        {
            let mut guard = self.lock();
            let state = &mut *guard;
            if state.tick.id != tick {
                debug!(node = %id, tick, current = state.tick.id, "discarding result of superseded tick");
                if let Some(node) = state.graph.node_mut(id) {
                    if node.mark.owned_by(tick) {
                        node.mark.set(tick, ExecState::Failed);
                    }
                }
            } else if let Some(node) = state.graph.node_mut(id) {
                match value {
                    Some(v) => {
                        node.mark.set(tick, ExecState::Done);
                        node.stats.completions += 1;
                        state.tick.results.insert(id.to_string(), v.clone());
                        debug!(node = %id, tick, "node done");
                    }
                    None => node.mark.set(tick, ExecState::Failed),
                }
            }
        }
        self.notify_settled();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg
    } else {
        "non-string panic payload"
    }
}
