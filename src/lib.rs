// src/lib.rs

//! Plumber: a dependency-graph task orchestrator.
//!
//! Work units ([`Task`]s) are registered as nodes of a
//! [`DependencyGraph`]; a [`Dispatcher`] then runs ticks over it. Each tick
//! resolves the requested output nodes on demand, pulling their dependency
//! closure depth-first so that every dependency completes before its
//! dependents, and each node executes at most once per tick. A per-node
//! watchdog can restart a stalled task, terminate the engine, or just warn.
//!
//! Wiring overview:
//! - [`config`]: TOML configuration (engine sizes, retry policy, watchdog
//!   defaults and per-node overrides, log level)
//! - [`dag`]: graph, nodes, `NodeSpec`, two-phase `GraphBuilder`
//! - [`exec`]: the `Task` contract, `Sink`, `TaskContext`, retry policy
//! - [`watchdog`]: watchdog settings, timers and recovery actions
//! - [`engine`]: shared state, resolver, `Dispatcher`
//! - [`logging`]: `tracing-subscriber` setup

pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod types;
pub mod watchdog;

pub use config::{load_and_validate, ConfigFile};
pub use dag::{DependencyGraph, GraphBuilder, NodeSpec, NodeStats};
pub use engine::{Dispatcher, EngineHandle};
pub use errors::{PlumberError, Result};
pub use exec::{Backoff, NullSink, RetryPolicy, Sink, Task, TaskContext};
pub use types::{NodeId, TaskHandle, TickOutputs};
pub use watchdog::{WatchdogAction, WatchdogConfig};
