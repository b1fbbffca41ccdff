// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::exec::RetryPolicy;
use crate::types::{LogLevel, NodeId};
use crate::watchdog::WatchdogConfig;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [engine]
/// max_workers = 64
///
/// [retry]
/// max_attempts = 5
/// backoff = "exponential"
/// backoff_ms = 10
/// max_backoff_ms = 1000
///
/// [watchdog]
/// enabled = true
/// action = "restart"
/// timeout_seconds = 30.0
///
/// [node.fetch.watchdog]
/// action = "warn"
/// timeout_seconds = 0.5
///
/// [log]
/// level = "debug"
/// ```
///
/// All sections are optional and have reasonable defaults. Enum-like values
/// stay strings here so that a typo is reported as a configuration error
/// naming the accepted values, not as a TOML error.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub engine: EngineSection,

    #[serde(default)]
    pub retry: RetrySection,

    /// Watchdog defaults for nodes added without explicit settings.
    #[serde(default)]
    pub watchdog: WatchdogSection,

    /// Per-node sections from `[node.<id>]`.
    #[serde(default)]
    pub node: BTreeMap<String, NodeSection>,

    #[serde(default)]
    pub log: LogSection,
}

/// `[engine]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    /// Upper bound on blocking worker threads (one per output per tick,
    /// plus watchdog actions).
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Runtime threads driving watchdog timers.
    #[serde(default = "default_timer_threads")]
    pub timer_threads: usize,
}

fn default_max_workers() -> usize {
    64
}

fn default_timer_threads() -> usize {
    1
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            timer_threads: default_timer_threads(),
        }
    }
}

/// `[retry]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    /// Failed attempts before a node gives up for the tick; `0` = unlimited.
    #[serde(default)]
    pub max_attempts: u32,

    /// `"none"`, `"fixed"` or `"exponential"`.
    #[serde(default = "default_backoff")]
    pub backoff: String,

    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    /// Cap for exponential backoff.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_backoff() -> String {
    "none".to_string()
}

fn default_backoff_ms() -> u64 {
    10
}

fn default_max_backoff_ms() -> u64 {
    1000
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            backoff: default_backoff(),
            backoff_ms: default_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// `[watchdog]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchdogSection {
    #[serde(default)]
    pub enabled: bool,

    /// `"terminate"`, `"restart"` or `"warn"`.
    #[serde(default = "default_action")]
    pub action: String,

    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: f64,
}

fn default_action() -> String {
    "restart".to_string()
}

fn default_timeout_seconds() -> f64 {
    60.0
}

impl Default for WatchdogSection {
    fn default() -> Self {
        Self {
            enabled: false,
            action: default_action(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

/// `[node.<id>]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct NodeSection {
    #[serde(default)]
    pub watchdog: Option<NodeWatchdogSection>,
}

/// `[node.<id>.watchdog]`: fields left out fall back to `[watchdog]`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct NodeWatchdogSection {
    #[serde(default)]
    pub enabled: Option<bool>,

    #[serde(default)]
    pub action: Option<String>,

    #[serde(default)]
    pub timeout_seconds: Option<f64>,
}

/// `[log]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LogSection {
    #[serde(default)]
    pub level: Option<String>,
}

/// Validated engine settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub max_workers: usize,
    pub timer_threads: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            timer_threads: default_timer_threads(),
        }
    }
}

/// Validated configuration. Build it with `ConfigFile::try_from(raw)` or
/// [`load_and_validate`](crate::config::load_and_validate).
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    pub engine: EngineSettings,
    pub retry: RetryPolicy,
    /// Default watchdog for nodes added without explicit settings.
    pub watchdog: WatchdogConfig,
    /// Per-node watchdog overrides, keyed by node id.
    pub node_watchdogs: BTreeMap<NodeId, WatchdogConfig>,
    pub log_level: Option<LogLevel>,
}
