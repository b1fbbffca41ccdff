#![allow(dead_code)]

use std::sync::atomic::AtomicU32;
use std::sync::Arc;
use std::time::Duration;

use plumber::exec::{factory, TaskFactory};
use plumber::{NodeSpec, WatchdogAction, WatchdogConfig};

use crate::fake_task::{Probe, ScriptShared, ScriptedTask};

/// Builder for scripted fake tasks.
///
/// ```ignore
/// let spec = TaskScript::new("B").value(10).after("A").fail_times(2).spec(&probe).output();
/// ```
#[derive(Debug, Clone)]
pub struct TaskScript {
    name: String,
    base: i64,
    deps: Vec<String>,
    fail_times: u32,
    panic_times: u32,
    delay: Duration,
    hang_until_killed: bool,
    watchdog: Option<WatchdogConfig>,
}

impl TaskScript {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            base: 0,
            deps: Vec::new(),
            fail_times: 0,
            panic_times: 0,
            delay: Duration::ZERO,
            hang_until_killed: false,
            watchdog: None,
        }
    }

    /// Constant added to the sum of dependency results.
    pub fn value(mut self, base: i64) -> Self {
        self.base = base;
        self
    }

    /// Depend on `dep` and add its result to this task's output.
    pub fn after(mut self, dep: &str) -> Self {
        self.deps.push(dep.to_string());
        self
    }

    /// Fail this many executions (across restarts) before succeeding.
    pub fn fail_times(mut self, n: u32) -> Self {
        self.fail_times = n;
        self
    }

    /// Panic inside `execute` this many times (across restarts) before
    /// behaving normally.
    pub fn panic_times(mut self, n: u32) -> Self {
        self.panic_times = n;
        self
    }

    /// Fail forever.
    pub fn always_fail(self) -> Self {
        self.fail_times(u32::MAX)
    }

    /// Sleep before each execution outcome.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn delay_ms(self, ms: u64) -> Self {
        self.delay(Duration::from_millis(ms))
    }

    /// Block inside `execute` until the instance is killed.
    pub fn hang_until_killed(mut self) -> Self {
        self.hang_until_killed = true;
        self
    }

    pub fn watchdog(mut self, cfg: WatchdogConfig) -> Self {
        self.watchdog = Some(cfg);
        self
    }

    pub fn watchdog_ms(self, action: WatchdogAction, ms: u64) -> Self {
        self.watchdog(WatchdogConfig::enabled(action, Duration::from_millis(ms)))
    }

    /// Factory rebuilding the task on every call; all instances share the
    /// failure budget.
    pub fn factory(&self, probe: &Probe) -> TaskFactory<i64> {
        let shared = Arc::new(ScriptShared {
            name: self.name.clone(),
            base: self.base,
            reads: self.deps.clone(),
            remaining_failures: AtomicU32::new(self.fail_times),
            remaining_panics: AtomicU32::new(self.panic_times),
            delay: self.delay,
            hang_until_killed: self.hang_until_killed,
        });
        let probe = probe.clone();
        factory(move || Ok(ScriptedTask::new(Arc::clone(&shared), probe.clone())))
    }

    /// Node spec with the scripted dependencies and watchdog applied.
    pub fn spec(self, probe: &Probe) -> NodeSpec<i64> {
        let mut spec = NodeSpec::from_factory(self.factory(probe)).after_all(&self.deps);
        if let Some(cfg) = self.watchdog {
            spec = spec.watchdog(cfg);
        }
        spec
    }
}
