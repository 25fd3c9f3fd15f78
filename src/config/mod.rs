//! Configuration management module for the reconciliation engine.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support (`CONFIG_PATH`)
//! - Environment variable overrides (`RECONCILE__` prefix)
//! - Component-wise validation
mod cache;
mod controller;
mod monitoring;
mod rate_limit;
mod resource;
pub use cache::*;
pub use controller::*;
pub use monitoring::*;
pub use rate_limit::*;
pub use resource::*;


use std::collections::HashSet;
use std::env;
use std::fmt::Debug;

use config::Config;
use config::ConfigError;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::CONFIG_PATH_ENV;
use crate::constants::ENV_PREFIX;
use crate::constants::ENV_SEPARATOR;
use crate::Error;
use crate::ObjectKey;
use crate::Result;

/// Main configuration container for the reconciliation engine
///
/// Combines all subsystem configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables (highest priority)
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct EngineConfig {
    /// Startup, sync and shutdown behaviour
    #[serde(default)]
    pub controller: ControllerConfig,
    /// Backoff schedule for failed keys
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Reference cache provider settings
    #[serde(default)]
    pub cache: CacheConfig,
    /// Metrics and monitoring settings
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    /// Watched object types
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
}

impl Debug for EngineConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let names: Vec<&str> = self.resources.iter().map(|r| r.name.as_str()).collect();
        f.debug_struct("EngineConfig")
            .field("controller", &self.controller)
            .field("resources", &names)
            .finish()
    }
}

impl EngineConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Configuration sources are merged in the following order (later sources override earlier):
    /// 1. Type defaults (lowest priority)
    /// 2. Configuration file from `CONFIG_PATH` environment variable (if set)
    /// 3. Environment variables with `RECONCILE__` prefix (highest priority)
    ///
    /// # Note
    /// Validation is deferred so that `with_override_config()` can still be
    /// applied. Callers MUST call `validate()` before using the configuration.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("CONFIG_PATH", "config/reconcile.toml");
    /// std::env::set_var("RECONCILE__CONTROLLER__DEFAULT_WORKERS", "4");
    /// let cfg = EngineConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var(CONFIG_PATH_ENV) {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        let config: Self = builder.add_source(env_source()).build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Merging order (later sources override earlier):
    /// 1. Current configuration values
    /// 2. New configuration file
    /// 3. Latest environment variables (highest priority)
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(env_source())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates configuration and returns validated instance.
    ///
    /// # Errors
    /// Returns the first violation found in any section, a duplicate
    /// resource name, or a seed object that does not fit its resource.
    pub fn validate(self) -> Result<Self> {
        self.controller.validate()?;
        self.rate_limit.validate()?;
        self.cache.validate()?;
        self.monitoring.validate()?;

        let mut names = HashSet::new();
        for resource in &self.resources {
            resource.validate()?;
            if !names.insert(resource.name.as_str()) {
                return Err(invalid(format!(
                    "resource {:?} is declared more than once",
                    resource.name
                )));
            }
        }
        for seed in &self.cache.seed {
            let Some(resource) = self.resource(&seed.kind) else {
                return Err(invalid(format!("seed object {:?} has undeclared kind", seed.key)));
            };
            ObjectKey::from(seed.key.as_str()).split(&resource.name, resource.scope)?;
        }
        Ok(self)
    }

    /// Looks up a configured resource by name
    pub fn resource(
        &self,
        name: &str,
    ) -> Option<&ResourceConfig> {
        self.resources.iter().find(|r| r.name == name)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator(ENV_SEPARATOR)
        .ignore_empty(true)
        .try_parsing(true)
}

pub(super) fn invalid(msg: String) -> Error {
    Error::Config(ConfigError::Message(msg))
}
