// src/watchdog/timer.rs

//! Watchdog timers and recovery actions.
//!
//! Per node: Idle -> Armed -> {Disarmed | Fired}. An armed timer is a tokio
//! task on the engine runtime that fires once per elapsed timeout until it
//! is disarmed, so a long-stalled `execute()` keeps being reported. The
//! recovery action itself runs on the blocking pool because it calls into
//! task code (`kill`, the factory, `setup`, `start`).

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use crate::engine::core::{Engine, EngineHandle, Phase};
use crate::exec::TaskContext;
use crate::types::NodeId;
use crate::watchdog::WatchdogAction;

/// Why a watchdog action is being dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireCause {
    /// The timer elapsed while `execute()` was still running.
    Timeout,
    /// `execute()` returned an error.
    Fault,
}

impl<V: Clone + Send + Sync + 'static> Engine<V> {
    /// Start the node's timer for `tick` if its watchdog is enabled and not
    /// already armed for that tick. A leftover timer of an older tick is
    /// replaced.
    pub(crate) fn arm(self: &Arc<Self>, id: &str, tick: u64) {
        let mut guard = self.lock();
        let Some(node) = guard.graph.node_mut(id) else {
            return;
        };
        if !node.watchdog.enabled {
            return;
        }
        match node.timer.take() {
            Some((owner, timer)) if owner == tick => {
                trace!(node = %id, tick, "watchdog already armed");
                node.timer = Some((owner, timer));
                return;
            }
            Some((owner, timer)) => {
                debug!(node = %id, tick, stale = owner, "replacing watchdog of an older tick");
                timer.abort();
            }
            None => {}
        }

        let period = node.watchdog.timeout;
        let handle = self
            .runtime
            .spawn(watch_node(Arc::downgrade(self), id.to_string(), period));
        node.timer = Some((tick, handle.abort_handle()));
        debug!(node = %id, tick, timeout_ms = period.as_millis() as u64, "watchdog armed");
    }

    /// Cancel the node's timer if it was armed for `tick`.
    pub(crate) fn disarm(&self, id: &str, tick: u64) {
        let timer = {
            let mut guard = self.lock();
            let Some(node) = guard.graph.node_mut(id) else {
                return;
            };
            match node.timer.take() {
                Some((owner, timer)) if owner == tick => timer,
                other => {
                    node.timer = other;
                    return;
                }
            }
        };
        if timer.is_finished() {
            debug!(node = %id, tick, "watchdog timer already finished; nothing to cancel");
            return;
        }
        timer.abort();
        debug!(node = %id, tick, "watchdog disarmed");
    }

    /// Dispatch the node's configured action.
    pub(crate) fn fire(self: &Arc<Self>, id: &str, cause: FireCause) {
        let action = {
            let mut guard = self.lock();
            let Some(node) = guard.graph.node_mut(id) else {
                return;
            };
            if cause == FireCause::Timeout {
                node.stats.timeouts += 1;
            }
            node.watchdog.action
        };

        match action {
            WatchdogAction::Warn => {
                warn!(node = %id, ?cause, "watchdog fired; action is warn, continuing");
            }
            WatchdogAction::Restart => self.restart_task(id, cause),
            WatchdogAction::Terminate => {
                error!(node = %id, ?cause, "watchdog fired; terminating engine");
                self.stop();
            }
        }
    }

    /// Kill the current instance and swap in a fresh one built by the
    /// node's factory. Identity, edges and tick state stay as they are.
    fn restart_task(self: &Arc<Self>, id: &str, cause: FireCause) {
        if !self.is_running() {
            return;
        }

        let mut guard = self.lock();
        let state = &mut *guard;
        let sink = state.sink.clone();
        let started = state.phase == Phase::Started;
        let Some(node) = state.graph.node_mut(id) else {
            return;
        };

        info!(node = %id, ?cause, restarts = node.stats.restarts + 1, "watchdog fired; restarting task");
        node.task.kill();

        let fresh = match (node.factory)() {
            Ok(task) => task,
            Err(err) => {
                error!(
                    node = %id,
                    error = %format!("{err:#}"),
                    "could not rebuild task; keeping previous instance"
                );
                return;
            }
        };
        if fresh.name() != id {
            warn!(node = %id, rebuilt = %fresh.name(), "rebuilt task reports a different name; node id is kept");
        }

        if let Some(sink) = sink {
            let ctx = TaskContext::new(id.to_string(), sink, EngineHandle::new(self));
            if let Err(err) = fresh.setup(ctx) {
                error!(node = %id, error = %format!("{err:#}"), "setup of rebuilt task failed; keeping previous instance");
                return;
            }
        }
        if started {
            if let Err(err) = fresh.start() {
                error!(node = %id, error = %format!("{err:#}"), "start of rebuilt task failed; keeping previous instance");
                return;
            }
        }

        node.task = fresh;
        node.stats.restarts += 1;
    }
}

async fn watch_node<V: Clone + Send + Sync + 'static>(
    engine: Weak<Engine<V>>,
    id: NodeId,
    period: Duration,
) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let Some(engine) = engine.upgrade() else {
            return;
        };
        if !engine.is_running() {
            return;
        }

        trace!(node = %id, "watchdog timeout elapsed");
        let node = id.clone();
        let fired = tokio::task::spawn_blocking(move || engine.fire(&node, FireCause::Timeout)).await;
        if let Err(err) = fired {
            if err.is_panic() {
                error!(node = %id, "watchdog action panicked; timer stopped");
            }
            return;
        }
    }
}
