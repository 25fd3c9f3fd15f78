//! Object identity: the [`Resource`] trait implemented by watched object
//! types and the [`ObjectKey`] that identifies one object within its type.
mod key;
pub use key::*;


use std::any::Any;
use std::fmt::Debug;

/// A watched object type.
///
/// Implementors only describe identity; the engine never inspects payloads.
/// Cluster-scoped objects return `None` from [`Resource::namespace`].
pub trait Resource: Any + Send + Sync + Debug {
    fn namespace(&self) -> Option<&str>;

    fn name(&self) -> &str;

    /// Key of this object within its type
    fn key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace(), self.name())
    }
}
