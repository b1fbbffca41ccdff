// src/watchdog/config.rs

//! Per-node watchdog settings.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::errors::{PlumberError, Result};

/// What to do when a node's watchdog fires.
///
/// - `Restart`: kill the task instance, build a fresh one from the node's
///   factory and start it; the in-flight retry loop picks it up.
/// - `Terminate`: stop the whole engine.
/// - `Warn`: log and carry on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchdogAction {
    Terminate,
    Restart,
    Warn,
}

impl Default for WatchdogAction {
    fn default() -> Self {
        WatchdogAction::Restart
    }
}

impl fmt::Display for WatchdogAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WatchdogAction::Terminate => "terminate",
            WatchdogAction::Restart => "restart",
            WatchdogAction::Warn => "warn",
        };
        f.write_str(s)
    }
}

impl FromStr for WatchdogAction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "terminate" => Ok(WatchdogAction::Terminate),
            "restart" => Ok(WatchdogAction::Restart),
            "warn" => Ok(WatchdogAction::Warn),
            other => Err(format!(
                "invalid watchdog action: {other} (expected \"terminate\", \"restart\" or \"warn\")"
            )),
        }
    }
}

/// Default timeout used when nothing else is configured.
pub const DEFAULT_WATCHDOG_TIMEOUT: Duration = Duration::from_secs(60);

/// Validated watchdog configuration of a single node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatchdogConfig {
    pub enabled: bool,
    pub action: WatchdogAction,
    pub timeout: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            action: WatchdogAction::default(),
            timeout: DEFAULT_WATCHDOG_TIMEOUT,
        }
    }
}

impl WatchdogConfig {
    /// Enabled watchdog with the given action and timeout.
    pub fn enabled(action: WatchdogAction, timeout: Duration) -> Self {
        Self {
            enabled: true,
            action,
            timeout,
        }
    }

    /// Disabled watchdog. Faults still go through `action`.
    pub fn disabled(action: WatchdogAction) -> Self {
        Self {
            enabled: false,
            action,
            ..Self::default()
        }
    }

    /// Build from loosely typed parts, e.g. values coming from a host
    /// application or a config file.
    pub fn from_parts(enabled: bool, action: &str, timeout_seconds: f64) -> Result<Self> {
        let action = action
            .parse::<WatchdogAction>()
            .map_err(PlumberError::ConfigError)?;
        let timeout = timeout_from_secs(timeout_seconds)?;
        Ok(Self {
            enabled,
            action,
            timeout,
        })
    }

    /// Check the invariants `from_parts` enforces on an already typed value.
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(PlumberError::ConfigError(
                "watchdog timeout must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn timeout_from_secs(secs: f64) -> Result<Duration> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(PlumberError::ConfigError(format!(
            "watchdog timeout_seconds must be a positive number (got {secs})"
        )));
    }
    Duration::try_from_secs_f64(secs).map_err(|e| {
        PlumberError::ConfigError(format!("watchdog timeout_seconds out of range: {e}"))
    })
}
