//! Contract with the cache/watch provider.
//!
//! The provider keeps an eventually consistent mirror of every watched object
//! type and tells subscribers which keys changed. The engine only ever reads
//! from it; payloads are type-erased ([`DynObject`]) and downcast by the typed
//! side of each registration.
mod memory;
mod tombstone;
pub use memory::*;
pub use tombstone::*;


use std::any::Any;
use std::fmt;
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;

use crate::ObjectKey;
use crate::Result;

/// A cached object of any watched type
pub type DynObject = Arc<dyn Any + Send + Sync>;

/// Last known state delivered with a deletion.
#[derive(Clone)]
pub enum DeletedFinalState {
    /// The provider still had the object when the deletion was observed
    Object(DynObject),
    /// The object had already left the mirror; this is the last state seen
    Tombstone(Tombstone),
}

/// Recovery record for a deletion whose object was evicted before the
/// notification was delivered. Transient, never persisted.
#[derive(Clone)]
pub struct Tombstone {
    pub key: ObjectKey,
    pub last_known: DynObject,
}

impl fmt::Debug for DeletedFinalState {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            DeletedFinalState::Object(_) => f.write_str("Object(..)"),
            DeletedFinalState::Tombstone(t) => write!(f, "Tombstone({})", t.key),
        }
    }
}

/// Change notification for one key of a watched type
#[derive(Debug, Clone)]
pub enum Notification {
    Added(ObjectKey),
    Updated(ObjectKey),
    Deleted(ObjectKey, DeletedFinalState),
}

impl Notification {
    pub fn key(&self) -> &ObjectKey {
        match self {
            Notification::Added(key) | Notification::Updated(key) | Notification::Deleted(key, _) => key,
        }
    }
}

/// Receives change notifications for one watched type.
///
/// Called from the provider's execution context, concurrently with workers;
/// implementations must not block.
pub trait NotificationHandler: Send + Sync {
    fn on_notification(
        &self,
        notification: Notification,
    );
}

/// The cache/watch provider consumed by the controller.
#[cfg_attr(test, automock)]
pub trait CacheProvider: Send + Sync {
    /// Registers `handler` for change notifications of `kind`.
    fn subscribe(
        &self,
        kind: &str,
        handler: Arc<dyn NotificationHandler>,
    ) -> Result<()>;

    /// Reads the current object from the local mirror. `namespace` is empty
    /// for cluster-scoped types. `Ok(None)` means the object is absent.
    fn lookup(
        &self,
        kind: &str,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynObject>>;

    /// Starts populating the mirror of `kind`.
    fn start_sync(
        &self,
        kind: &str,
    ) -> Result<()>;

    /// Whether the initial listing of `kind` has completed. Once true, stays true.
    fn is_synced(
        &self,
        kind: &str,
    ) -> bool;
}
