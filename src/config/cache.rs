use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use super::invalid;
use crate::Result;

/// Settings of the in-memory reference cache provider
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct CacheConfig {
    /// Period after which every cached object is re-announced as updated
    /// (0 disables resync)
    #[serde(default)]
    pub resync_period_ms: u64,

    /// Objects loaded into the mirror before the initial listing
    #[serde(default)]
    pub seed: Vec<SeedObject>,
}

/// One pre-loaded object, e.g. `{ kind = "widget", key = "ns1/foo" }`
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SeedObject {
    pub kind: String,
    pub key: String,
}

impl CacheConfig {
    pub fn validate(&self) -> Result<()> {
        for seed in &self.seed {
            if seed.kind.trim().is_empty() || seed.key.trim().is_empty() {
                return Err(invalid(format!("seed object {seed:?} needs a kind and a key")));
            }
        }
        Ok(())
    }

    pub fn resync_period(&self) -> Option<Duration> {
        (self.resync_period_ms > 0).then(|| Duration::from_millis(self.resync_period_ms))
    }
}
