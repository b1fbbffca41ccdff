// src/engine/runtime.rs

use std::fmt;
use std::iter::FusedIterator;
use std::sync::Arc;

use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info, trace, warn};

use crate::config::{ConfigFile, EngineSettings};
use crate::dag::{DependencyGraph, NodeStats};
use crate::engine::core::{Engine, EngineHandle, Phase};
use crate::engine::resolver::ResultCallback;
use crate::errors::{PlumberError, Result};
use crate::exec::{RetryPolicy, Sink, TaskContext};
use crate::types::{NodeId, TickOutputs};

/// Drives ticks over an exclusively owned [`DependencyGraph`].
///
/// The dispatcher owns a tokio runtime: output resolvers run on its blocking
/// pool (one OS thread per requested output per tick) and watchdog timers run
/// as tasks on it. Its API is blocking; do not call it from async code.
///
/// ```ignore
/// let dispatcher = Dispatcher::new(graph)?;
/// dispatcher.setup(Arc::new(NullSink))?;
/// dispatcher.start()?;
/// for outputs in dispatcher.run_loop() {
///     consume(outputs);
/// }
/// ```
pub struct Dispatcher<V: Clone + Send + Sync + 'static> {
    engine: Arc<Engine<V>>,
    runtime: Option<Runtime>,
}

impl<V: Clone + Send + Sync + 'static> fmt::Debug for Dispatcher<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl<V: Clone + Send + Sync + 'static> Dispatcher<V> {
    /// Dispatcher with default engine settings and unlimited retries.
    pub fn new(graph: DependencyGraph<V>) -> Result<Self> {
        Self::with_settings(graph, EngineSettings::default(), RetryPolicy::default())
    }

    /// Dispatcher using the `[engine]` and `[retry]` sections of a config.
    pub fn with_config(graph: DependencyGraph<V>, cfg: &ConfigFile) -> Result<Self> {
        Self::with_settings(graph, cfg.engine, cfg.retry)
    }

    pub fn with_settings(
        graph: DependencyGraph<V>,
        settings: EngineSettings,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(settings.timer_threads.max(1))
            .max_blocking_threads(settings.max_workers.max(1))
            .thread_name("plumber")
            .enable_time()
            .build()?;

        info!(
            nodes = graph.len(),
            outputs = ?graph.outputs(),
            max_workers = settings.max_workers,
            "dispatcher created"
        );

        let engine = Arc::new(Engine::new(graph, runtime.handle().clone(), retry));
        Ok(Self {
            engine,
            runtime: Some(runtime),
        })
    }

    /// Inject the shared sink and an engine handle into every task and call
    /// its `setup`. Must be called exactly once, before `start`.
    pub fn setup(&self, sink: Arc<dyn Sink<V>>) -> Result<()> {
        let mut guard = self.engine.lock();
        if guard.phase != Phase::Built {
            return Err(PlumberError::ConfigError(
                "setup() may only be called once".to_string(),
            ));
        }

        let handle = EngineHandle::new(&self.engine);
        guard.graph.setup_all(|id| {
            TaskContext::new(id.to_string(), Arc::clone(&sink), handle.clone())
        })?;
        guard.sink = Some(sink);
        guard.phase = Phase::SetUp;
        info!(nodes = guard.graph.len(), "all tasks set up");
        Ok(())
    }

    /// Call `start` on every task. Must follow `setup`.
    pub fn start(&self) -> Result<()> {
        let mut guard = self.engine.lock();
        match guard.phase {
            Phase::Built => return Err(PlumberError::NotStarted),
            Phase::Started => {
                return Err(PlumberError::ConfigError(
                    "start() may only be called once".to_string(),
                ));
            }
            Phase::SetUp => {}
        }
        guard.graph.start_all()?;
        guard.phase = Phase::Started;
        info!("all tasks started");
        Ok(())
    }

    /// Run one tick.
    ///
    /// Opens a new tick and spawns one resolver per output node. With `wait`,
    /// blocks until every output has settled; otherwise returns at once with
    /// whatever outputs are already available (usually none).
    ///
    /// Task faults never surface here. Returns [`PlumberError::Terminated`]
    /// once the engine has been stopped.
    pub fn forward(&self, wait: bool) -> Result<TickOutputs<V>> {
        let (tick, outputs) = self.engine.begin_tick()?;

        for output in outputs.iter().cloned() {
            let engine = Arc::clone(&self.engine);
            self.engine.runtime.spawn_blocking(move || {
                match engine.node_result(tick, &output, None) {
                    Ok(_) => trace!(node = %output, tick, "output resolved"),
                    Err(PlumberError::Terminated) | Err(PlumberError::TickSuperseded(_)) => {
                        debug!(node = %output, tick, "output resolver abandoned")
                    }
                    Err(err) => warn!(node = %output, tick, error = %err, "output produced no result"),
                }
            });
        }

        if wait {
            self.engine.wait_for_outputs(tick, &outputs)?;
        }

        let results = self.engine.collect_outputs(tick, &outputs);
        debug!(tick, produced = results.len(), requested = outputs.len(), "tick returned");
        Ok(results)
    }

    /// Lazy, unbounded sequence of output maps, one per `forward(true)`.
    /// Ends once the engine is stopped; not restartable.
    pub fn run_loop(&self) -> Ticks<'_, V> {
        Ticks {
            dispatcher: self,
            finished: false,
        }
    }

    /// Resolve a single node (and its dependency closure) in the current
    /// tick on the calling thread.
    pub fn node_result(&self, id: &str, on_result: Option<ResultCallback<'_, V>>) -> Result<V> {
        let tick = self.engine.current_tick()?;
        self.engine.node_result(tick, id, on_result)
    }

    /// Stop the engine: cancel every watchdog, kill every task and release
    /// any caller blocked in `forward(true)`. Idempotent and final.
    pub fn stop(&self) {
        self.engine.stop();
    }

    pub fn is_running(&self) -> bool {
        self.engine.is_running()
    }

    /// Non-owning handle for tasks and other threads.
    pub fn handle(&self) -> EngineHandle<V> {
        EngineHandle::new(&self.engine)
    }

    pub fn node_stats(&self, id: &str) -> Option<NodeStats> {
        self.engine.lock().graph.node(id).map(|n| n.stats)
    }

    /// Whether the node's watchdog timer is currently armed.
    pub fn is_armed(&self, id: &str) -> bool {
        self.engine
            .lock()
            .graph
            .node(id)
            .is_some_and(|n| n.timer.is_some())
    }

    pub fn outputs(&self) -> Vec<NodeId> {
        self.engine.lock().graph.outputs().to_vec()
    }

    /// Read-only access to the graph, under the engine lock.
    pub fn inspect<R>(&self, f: impl FnOnce(&DependencyGraph<V>) -> R) -> R {
        f(&self.engine.lock().graph)
    }
}

impl<V: Clone + Send + Sync + 'static> Drop for Dispatcher<V> {
    fn drop(&mut self) {
        self.engine.stop();
        if let Some(runtime) = self.runtime.take() {
            // Workers blocked in a hung execute() must not block the caller.
            runtime.shutdown_background();
        }
    }
}

/// Iterator returned by [`Dispatcher::run_loop`].
pub struct Ticks<'a, V: Clone + Send + Sync + 'static> {
    dispatcher: &'a Dispatcher<V>,
    finished: bool,
}

impl<V: Clone + Send + Sync + 'static> Iterator for Ticks<'_, V> {
    type Item = TickOutputs<V>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.dispatcher.forward(true) {
            Ok(outputs) => Some(outputs),
            Err(PlumberError::Terminated) => {
                info!("engine terminated; tick loop ends");
                self.finished = true;
                None
            }
            Err(err) => {
                warn!(error = %err, "tick loop ends");
                self.finished = true;
                None
            }
        }
    }
}

impl<V: Clone + Send + Sync + 'static> FusedIterator for Ticks<'_, V> {}
