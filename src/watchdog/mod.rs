// src/watchdog/mod.rs

//! Per-node liveness supervision of `execute()`.
//!
//! - [`config`] holds [`WatchdogAction`] and [`WatchdogConfig`].
//! - [`timer`] arms/disarms timers and dispatches the recovery action
//!   (restart, terminate, warn) when one fires or `execute()` faults.

pub mod config;
pub mod timer;

pub use config::{WatchdogAction, WatchdogConfig, DEFAULT_WATCHDOG_TIMEOUT};
pub use timer::FireCause;
