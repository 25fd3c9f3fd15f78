//! Reconciliation Engine Error Hierarchy
//!
//! Errors are split by the layer that produces them. Per-key failures
//! ([`ReconcileError`], [`CacheError`]) are handled inside the worker loop and
//! never escape it; lifecycle and configuration failures surface to the caller
//! of [`crate::Controller::run`].

use std::time::Duration;

use config::ConfigError;

use crate::ControllerState;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error returned by registered handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration loading or validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Failure while reconciling a single object key
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    /// Startup/shutdown sequencing failures
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// Cache/watch provider failures
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Log file and directory failures
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    SignalSenderClosed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// Key cannot be split into its identity components
    #[error("[{kind}] malformed object key {key:?}: {reason}")]
    MalformedKey {
        kind: String,
        key: String,
        reason: &'static str,
    },

    /// Deletion payload was neither the expected object nor a tombstone of it
    #[error("[{kind}] corrupt deletion notification for {key:?}: {reason}")]
    CorruptNotification {
        kind: String,
        key: String,
        reason: String,
    },

    /// Registered handler returned an error or panicked
    #[error("[{kind}] error syncing {key:?}: {source}")]
    Handler {
        kind: String,
        key: String,
        #[source]
        source: BoxError,
    },

    /// Object is absent from the cache and no deletion snapshot exists
    #[error("[{kind}] tried to get {key:?}, but it was not found")]
    NotFound { kind: String, key: String },

    /// Cache returned an object of a different type than the registered one
    #[error("[{kind}] cached object for {key:?} is not a {expected}")]
    TypeMismatch {
        kind: String,
        key: String,
        expected: &'static str,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// Initial cache sync did not complete in time
    #[error("Timed out after {timeout:?} waiting for caches to sync: {unsynced:?}")]
    SyncTimeout {
        timeout: Duration,
        unsynced: Vec<String>,
    },

    /// Shutdown was requested before the initial sync completed
    #[error("Shutdown requested while waiting for caches to sync")]
    SyncAborted,

    #[error("Invalid controller state transition {from:?} -> {to:?}")]
    InvalidTransition {
        from: ControllerState,
        to: ControllerState,
    },

    #[error("No watched object types registered")]
    NoResources,

    #[error("Object type {0:?} registered more than once")]
    DuplicateResource(String),

    #[error("Object type {0:?} is not present in the configuration")]
    UnknownResource(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Object type {0:?} is not known to the cache")]
    UnknownKind(String),

    /// Transient provider failure; lookups failing this way are retried
    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

impl Error {
    /// Whether a per-key failure should be requeued with backoff.
    ///
    /// Handler and provider failures are transient. Malformed keys, corrupt
    /// notifications, missing objects and type mismatches cannot be fixed by
    /// retrying the same key, so they are dropped.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Reconcile(ReconcileError::Handler { .. }) => true,
            Error::Cache(CacheError::Unavailable(_)) => true,
            _ => false,
        }
    }

    /// Short label used for the reconcile error metric.
    pub fn reason(&self) -> &'static str {
        match self {
            Error::Reconcile(e) => match e {
                ReconcileError::MalformedKey { .. } => "malformed_key",
                ReconcileError::CorruptNotification { .. } => "corrupt_notification",
                ReconcileError::Handler { .. } => "handler",
                ReconcileError::NotFound { .. } => "not_found",
                ReconcileError::TypeMismatch { .. } => "type_mismatch",
            },
            Error::Cache(_) => "cache",
            Error::Lifecycle(_) => "lifecycle",
            Error::Config(_) => "config",
            Error::Io(_) => "io",
            Error::SignalSenderClosed(_) => "signal",
        }
    }
}
