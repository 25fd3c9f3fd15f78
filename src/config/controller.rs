use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use super::invalid;
use crate::Result;

/// Startup, cache sync and shutdown parameters of the controller lifecycle
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ControllerConfig {
    /// Upper bound on the initial cache sync. Startup fails closed with
    /// `SyncTimeout` when any watched type is still unsynced after it.
    #[serde(default = "default_cache_sync_timeout_ms")]
    pub cache_sync_timeout_ms: u64,

    /// How often sync flags are polled while waiting
    #[serde(default = "default_cache_sync_poll_interval_ms")]
    pub cache_sync_poll_interval_ms: u64,

    /// Bound on waiting for workers to drain after shutdown (0 = unbounded)
    #[serde(default)]
    pub shutdown_timeout_ms: u64,

    /// Workers per object type when a resource does not set its own
    #[serde(default = "default_workers")]
    pub default_workers: usize,

    /// Log directory; logs go to stdout when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            cache_sync_timeout_ms: default_cache_sync_timeout_ms(),
            cache_sync_poll_interval_ms: default_cache_sync_poll_interval_ms(),
            shutdown_timeout_ms: 0,
            default_workers: default_workers(),
            log_dir: None,
        }
    }
}

impl ControllerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.cache_sync_timeout_ms == 0 {
            return Err(invalid("cache_sync_timeout_ms must be greater than 0".into()));
        }
        if self.cache_sync_poll_interval_ms == 0 {
            return Err(invalid("cache_sync_poll_interval_ms must be greater than 0".into()));
        }
        if self.cache_sync_poll_interval_ms > self.cache_sync_timeout_ms {
            return Err(invalid(format!(
                "cache_sync_poll_interval_ms ({}) cannot exceed cache_sync_timeout_ms ({})",
                self.cache_sync_poll_interval_ms, self.cache_sync_timeout_ms
            )));
        }
        if self.default_workers == 0 {
            return Err(invalid("default_workers must be at least 1".into()));
        }
        Ok(())
    }

    pub fn cache_sync_timeout(&self) -> Duration {
        Duration::from_millis(self.cache_sync_timeout_ms)
    }

    pub fn cache_sync_poll_interval(&self) -> Duration {
        Duration::from_millis(self.cache_sync_poll_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Option<Duration> {
        (self.shutdown_timeout_ms > 0).then(|| Duration::from_millis(self.shutdown_timeout_ms))
    }
}

fn default_cache_sync_timeout_ms() -> u64 {
    60_000
}
fn default_cache_sync_poll_interval_ms() -> u64 {
    100
}
fn default_workers() -> usize {
    1
}
