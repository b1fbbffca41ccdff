use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use plumber::{Sink, Task, TaskContext};

/// Lifecycle events recorded by [`ScriptedTask`]s, in global order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeEvent {
    Constructed(String),
    Setup(String),
    Started(String),
    ExecuteBegin(String),
    ExecuteEnd(String),
    Faulted(String),
    Killed(String),
}

/// Shared, ordered event log.
#[derive(Debug, Clone, Default)]
pub struct Probe {
    events: Arc<Mutex<Vec<ProbeEvent>>>,
}

impl Probe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: ProbeEvent) {
        self.events.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<ProbeEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, event: &ProbeEvent) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| *e == event)
            .count()
    }

    /// Positions of every occurrence of `event`.
    pub fn positions(&self, event: &ProbeEvent) -> Vec<usize> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .enumerate()
            .filter(|(_, e)| *e == event)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

/// Script state shared by every instance built from the same factory, so
/// that failure budgets survive restarts.
#[derive(Debug)]
pub(crate) struct ScriptShared {
    pub(crate) name: String,
    pub(crate) base: i64,
    pub(crate) reads: Vec<String>,
    pub(crate) remaining_failures: AtomicU32,
    pub(crate) remaining_panics: AtomicU32,
    pub(crate) delay: Duration,
    pub(crate) hang_until_killed: bool,
}

impl ScriptShared {
    fn take_failure(&self) -> bool {
        take_one(&self.remaining_failures)
    }

    fn take_panic(&self) -> bool {
        take_one(&self.remaining_panics)
    }
}

fn take_one(budget: &AtomicU32) -> bool {
    budget
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Fake task: returns `base + sum(results of reads)`, optionally after a
/// delay. It can panic or fail a scripted number of times first, or hang
/// until killed.
pub struct ScriptedTask {
    shared: Arc<ScriptShared>,
    probe: Probe,
    ctx: Mutex<Option<TaskContext<i64>>>,
    killed: Mutex<bool>,
    kill_signal: Condvar,
}

impl ScriptedTask {
    pub(crate) fn new(shared: Arc<ScriptShared>, probe: Probe) -> Self {
        probe.record(ProbeEvent::Constructed(shared.name.clone()));
        Self {
            shared,
            probe,
            ctx: Mutex::new(None),
            killed: Mutex::new(false),
            kill_signal: Condvar::new(),
        }
    }

    fn wait_for_kill(&self) {
        let mut killed = self.killed.lock().unwrap();
        while !*killed {
            killed = self.kill_signal.wait(killed).unwrap();
        }
    }

    fn context(&self) -> Result<TaskContext<i64>> {
        self.ctx
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| anyhow!("task '{}' executed before setup", self.shared.name))
    }
}

impl Task for ScriptedTask {
    type Output = i64;

    fn name(&self) -> &str {
        &self.shared.name
    }

    fn setup(&self, ctx: TaskContext<i64>) -> Result<()> {
        self.probe.record(ProbeEvent::Setup(self.shared.name.clone()));
        *self.ctx.lock().unwrap() = Some(ctx);
        Ok(())
    }

    fn start(&self) -> Result<()> {
        self.probe.record(ProbeEvent::Started(self.shared.name.clone()));
        Ok(())
    }

    fn execute(&self) -> Result<i64> {
        let name = &self.shared.name;
        self.probe.record(ProbeEvent::ExecuteBegin(name.clone()));

        if self.shared.hang_until_killed {
            self.wait_for_kill();
            self.probe.record(ProbeEvent::Faulted(name.clone()));
            bail!("task '{name}' was killed while hung");
        }

        if !self.shared.delay.is_zero() {
            thread::sleep(self.shared.delay);
        }

        if self.shared.take_panic() {
            self.probe.record(ProbeEvent::Faulted(name.clone()));
            panic!("scripted panic in task '{name}'");
        }

        if self.shared.take_failure() {
            self.probe.record(ProbeEvent::Faulted(name.clone()));
            bail!("scripted fault in task '{name}'");
        }

        let ctx = self.context()?;
        let mut value = self.shared.base;
        for dep in self.shared.reads.iter() {
            value += ctx
                .result_of(dep)
                .ok_or_else(|| anyhow!("task '{name}' found no result for '{dep}'"))?;
        }

        ctx.sink().collect(name, &value);
        self.probe.record(ProbeEvent::ExecuteEnd(name.clone()));
        Ok(value)
    }

    fn kill(&self) {
        self.probe.record(ProbeEvent::Killed(self.shared.name.clone()));
        *self.killed.lock().unwrap() = true;
        self.kill_signal.notify_all();
    }
}

/// Sink that remembers everything handed to it.
#[derive(Debug, Default)]
pub struct RecordingSink {
    collected: Mutex<Vec<(String, i64)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collected(&self) -> Vec<(String, i64)> {
        self.collected.lock().unwrap().clone()
    }
}

impl Sink<i64> for RecordingSink {
    fn collect(&self, node: &str, value: &i64) {
        self.collected
            .lock()
            .unwrap()
            .push((node.to_string(), *value));
    }
}
