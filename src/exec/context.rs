// src/exec/context.rs

//! What a task receives at setup time.

use std::fmt;
use std::sync::Arc;

use crate::engine::EngineHandle;
use crate::types::NodeId;

/// Shared collector handed to every task.
///
/// The engine never calls it; tasks decide what to hand over.
pub trait Sink<V>: Send + Sync {
    fn collect(&self, node: &str, value: &V);
}

/// Sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl<V> Sink<V> for NullSink {
    fn collect(&self, _node: &str, _value: &V) {}
}

/// Per-node context injected by `setup()`.
pub struct TaskContext<V> {
    node: NodeId,
    sink: Arc<dyn Sink<V>>,
    engine: EngineHandle<V>,
}

impl<V> TaskContext<V> {
    pub(crate) fn new(node: NodeId, sink: Arc<dyn Sink<V>>, engine: EngineHandle<V>) -> Self {
        Self { node, sink, engine }
    }

    /// Id of the node this context belongs to.
    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn sink(&self) -> &Arc<dyn Sink<V>> {
        &self.sink
    }

    /// Handle to the owning engine (read results, request a stop).
    pub fn engine(&self) -> &EngineHandle<V> {
        &self.engine
    }
}

impl<V: Clone + Send + Sync + 'static> TaskContext<V> {
    /// Value produced by `node` in the current tick, if it has settled.
    ///
    /// Dependencies of the calling node are always settled by the time its
    /// `execute()` runs.
    pub fn result_of(&self, node: &str) -> Option<V> {
        self.engine.result_of(node)
    }
}

impl<V> Clone for TaskContext<V> {
    fn clone(&self) -> Self {
        Self {
            node: self.node.clone(),
            sink: Arc::clone(&self.sink),
            engine: self.engine.clone(),
        }
    }
}

impl<V> fmt::Debug for TaskContext<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("node", &self.node)
            .finish_non_exhaustive()
    }
}
