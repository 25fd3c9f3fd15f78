use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use super::invalid;
use crate::Result;

/// Backoff schedule applied to keys whose reconciliation failed.
///
/// The effective delay is the maximum of a per-key exponential backoff
/// (`base_delay_ms * 2^failures`, capped at `max_delay_ms`) and an overall
/// token bucket (`qps`, `burst`) shared by every key of the queue.
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct RateLimitConfig {
    /// Backoff base (unit: milliseconds)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Maximum backoff time (unit: milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Overall requeue rate
    #[serde(default = "default_qps")]
    pub qps: f64,

    /// Requeues allowed without waiting for the bucket to refill
    #[serde(default = "default_burst")]
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            qps: default_qps(),
            burst: default_burst(),
        }
    }
}

impl RateLimitConfig {
    pub fn validate(&self) -> Result<()> {
        if self.base_delay_ms == 0 {
            return Err(invalid("base_delay_ms must be greater than 0".into()));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(invalid(format!(
                "max_delay_ms ({}) must be >= base_delay_ms ({})",
                self.max_delay_ms, self.base_delay_ms
            )));
        }
        if !(self.qps.is_finite() && self.qps > 0.0) {
            return Err(invalid(format!("qps must be a positive number, got {}", self.qps)));
        }
        if self.burst == 0 {
            return Err(invalid("burst must be at least 1".into()));
        }
        Ok(())
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

fn default_base_delay_ms() -> u64 {
    5
}
fn default_max_delay_ms() -> u64 {
    1_000_000
}
fn default_qps() -> f64 {
    10.0
}
fn default_burst() -> u32 {
    100
}
