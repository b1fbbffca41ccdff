// src/exec/task.rs

//! The task contract consumed by the engine.

use std::sync::Arc;

use anyhow::Result;

use crate::exec::context::TaskContext;

/// A unit of work owned by exactly one graph node.
///
/// Lifecycle, as driven by the engine:
/// 1. the node's factory constructs the task (eagerly, at `add()` time);
/// 2. `setup` once the whole graph is built;
/// 3. `start` once after `setup`;
/// 4. `execute` once per tick in which the node is needed, re-invoked after
///    every fault until it succeeds or the engine stops;
/// 5. `kill` on engine shutdown, or right before the instance is replaced by
///    a watchdog restart.
///
/// All methods take `&self`: `kill` may be called from another thread while
/// `execute` is blocked, which is how a hung task gets a chance to unwind.
/// `setup`, `start` and `kill` may run while the graph lock is held and must
/// not call back into the engine.
pub trait Task: Send + Sync + 'static {
    type Output: Clone + Send + Sync + 'static;

    /// Declared name; becomes the node id.
    fn name(&self) -> &str;

    fn setup(&self, _ctx: TaskContext<Self::Output>) -> Result<()> {
        Ok(())
    }

    fn start(&self) -> Result<()> {
        Ok(())
    }

    /// Produce this tick's value. Returning an error signals a transient
    /// fault; the engine retries.
    fn execute(&self) -> Result<Self::Output>;

    fn kill(&self) {}
}

/// Type-erased task instance as stored in a node.
pub type SharedTask<V> = Arc<dyn Task<Output = V>>;

/// Produces a fresh task instance from the parameters captured by the
/// closure. Called once at `add()` time and again on every restart.
pub type TaskFactory<V> = Arc<dyn Fn() -> Result<SharedTask<V>> + Send + Sync>;

/// Erase a concrete task constructor into a [`TaskFactory`].
pub fn factory<T, F>(make: F) -> TaskFactory<T::Output>
where
    T: Task,
    F: Fn() -> Result<T> + Send + Sync + 'static,
{
    Arc::new(move || {
        let task = make()?;
        Ok(Arc::new(task) as SharedTask<T::Output>)
    })
}
