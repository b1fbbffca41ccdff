// src/config/validate.rs

use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::model::{
    ConfigFile, EngineSection, EngineSettings, NodeWatchdogSection, RawConfigFile, RetrySection,
    WatchdogSection,
};
use crate::errors::{PlumberError, Result};
use crate::exec::{Backoff, BackoffKind, RetryPolicy};
use crate::types::{LogLevel, NodeId};
use crate::watchdog::WatchdogConfig;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = PlumberError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let engine = validate_engine(&raw.engine)?;
        let retry = validate_retry(&raw.retry)?;
        let watchdog = validate_watchdog(&raw.watchdog)?;
        let node_watchdogs = validate_node_watchdogs(&raw, &raw.watchdog)?;
        let log_level = validate_log(raw.log.level.as_deref())?;

        Ok(ConfigFile {
            engine,
            retry,
            watchdog,
            node_watchdogs,
            log_level,
        })
    }
}

fn validate_engine(section: &EngineSection) -> Result<EngineSettings> {
    if section.max_workers == 0 {
        return Err(PlumberError::ConfigError(
            "[engine].max_workers must be >= 1 (got 0)".to_string(),
        ));
    }
    if section.timer_threads == 0 {
        return Err(PlumberError::ConfigError(
            "[engine].timer_threads must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(EngineSettings {
        max_workers: section.max_workers,
        timer_threads: section.timer_threads,
    })
}

fn validate_retry(section: &RetrySection) -> Result<RetryPolicy> {
    let kind = section
        .backoff
        .parse::<BackoffKind>()
        .map_err(|e| PlumberError::ConfigError(format!("[retry].backoff: {e}")))?;

    let backoff = match kind {
        BackoffKind::None => Backoff::None,
        BackoffKind::Fixed => Backoff::Fixed(Duration::from_millis(section.backoff_ms)),
        BackoffKind::Exponential => {
            if section.max_backoff_ms < section.backoff_ms {
                return Err(PlumberError::ConfigError(format!(
                    "[retry].max_backoff_ms ({}) must be >= backoff_ms ({})",
                    section.max_backoff_ms, section.backoff_ms
                )));
            }
            Backoff::Exponential {
                initial: Duration::from_millis(section.backoff_ms),
                max: Duration::from_millis(section.max_backoff_ms),
            }
        }
    };

    let mut policy = RetryPolicy::unlimited().with_backoff(backoff);
    if section.max_attempts > 0 {
        policy = policy.with_max_attempts(section.max_attempts);
    }
    Ok(policy)
}

fn validate_watchdog(section: &WatchdogSection) -> Result<WatchdogConfig> {
    WatchdogConfig::from_parts(section.enabled, &section.action, section.timeout_seconds)
        .map_err(|e| prefix_config_error("[watchdog]", e))
}

fn validate_node_watchdogs(
    raw: &RawConfigFile,
    defaults: &WatchdogSection,
) -> Result<BTreeMap<NodeId, WatchdogConfig>> {
    let mut out = BTreeMap::new();
    for (id, node) in raw.node.iter() {
        let Some(ref section) = node.watchdog else {
            continue;
        };
        let cfg = merge_node_watchdog(section, defaults)
            .map_err(|e| prefix_config_error(&format!("[node.{id}.watchdog]"), e))?;
        out.insert(id.clone(), cfg);
    }
    Ok(out)
}

fn merge_node_watchdog(
    section: &NodeWatchdogSection,
    defaults: &WatchdogSection,
) -> Result<WatchdogConfig> {
    let enabled = section.enabled.unwrap_or(defaults.enabled);
    let action = section.action.as_deref().unwrap_or(&defaults.action);
    let timeout = section.timeout_seconds.unwrap_or(defaults.timeout_seconds);
    WatchdogConfig::from_parts(enabled, action, timeout)
}

fn validate_log(level: Option<&str>) -> Result<Option<LogLevel>> {
    level
        .map(|s| {
            s.parse::<LogLevel>()
                .map_err(|e| PlumberError::ConfigError(format!("[log].level: {e}")))
        })
        .transpose()
}

fn prefix_config_error(section: &str, err: PlumberError) -> PlumberError {
    match err {
        PlumberError::ConfigError(msg) => PlumberError::ConfigError(format!("{section}: {msg}")),
        other => other,
    }
}
