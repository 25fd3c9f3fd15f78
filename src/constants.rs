// -
// Object keys

/// Separator between namespace and name in a namespaced object key
pub(crate) const NAMESPACE_SEPARATOR: char = '/';

// -
// Configuration

/// Prefix of environment variables overriding configuration, e.g.
/// `RECONCILE__CONTROLLER__CACHE_SYNC_TIMEOUT_MS`
pub(crate) const ENV_PREFIX: &str = "RECONCILE";
pub(crate) const ENV_SEPARATOR: &str = "__";
/// Environment variable naming the configuration file
pub(crate) const CONFIG_PATH_ENV: &str = "CONFIG_PATH";
