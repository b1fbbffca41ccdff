// src/exec/mod.rs

//! Execution layer: the contract between the engine and user tasks.
//!
//! - [`task`] defines the [`Task`] trait and the factory type used to build
//!   (and rebuild) task instances.
//! - [`context`] holds the [`TaskContext`] injected at setup, and the
//!   [`Sink`] collector shared by all tasks.
//! - [`retry`] describes how faulting `execute()` calls are retried.

pub mod context;
pub mod retry;
pub mod task;

pub use context::{NullSink, Sink, TaskContext};
pub use retry::{Backoff, BackoffKind, RetryPolicy};
pub use task::{factory, SharedTask, Task, TaskFactory};
