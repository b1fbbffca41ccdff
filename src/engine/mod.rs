// src/engine/mod.rs

//! Orchestration engine for plumber.
//!
//! This module ties together:
//! - the shared engine state: graph, current tick, running flag ([`core`])
//! - demand-driven resolution of nodes within a tick ([`resolver`])
//! - the blocking [`Dispatcher`] API that opens ticks, spawns output
//!   resolvers and tears the engine down ([`runtime`])

pub mod core;
pub mod resolver;
pub mod runtime;

pub use self::core::EngineHandle;
pub use resolver::ResultCallback;
pub use runtime::{Dispatcher, Ticks};
