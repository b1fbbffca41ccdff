// src/dag/mod.rs

//! Dependency graph representation.
//!
//! - [`graph`] holds the [`DependencyGraph`]: nodes, edges, output set.
//! - [`node`] holds per-node metadata (task instance, watchdog timer,
//!   per-tick execution mark, counters).
//! - [`spec`] provides [`NodeSpec`], the declarative input to `add()`.
//! - [`builder`] provides [`GraphBuilder`] for two-phase construction with
//!   forward references.

pub mod builder;
pub mod graph;
pub mod node;
pub mod spec;

pub use builder::GraphBuilder;
pub use graph::DependencyGraph;
pub use node::NodeStats;
pub use spec::NodeSpec;
