// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

use crate::types::NodeId;

#[derive(Error, Debug)]
pub enum PlumberError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Cycle detected in dependency graph: {0}")]
    DagCycle(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Failed to construct task: {0}")]
    Construction(#[source] anyhow::Error),

    #[error("Task '{node}' failed during {phase}: {source}")]
    Lifecycle {
        node: NodeId,
        phase: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("Task '{node}' gave up after {attempts} failed attempts")]
    RetriesExhausted { node: NodeId, attempts: u32 },

    #[error("Task '{node}' produced no result in this tick")]
    NodeFailed { node: NodeId },

    #[error("Tick {0} was superseded by a newer tick")]
    TickSuperseded(u64),

    #[error("Engine is not started; call setup() and start() first")]
    NotStarted,

    #[error("Engine terminated")]
    Terminated,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, PlumberError>;
