use std::any::type_name;
use std::sync::Arc;

use super::DeletedFinalState;
use crate::ObjectKey;
use crate::ReconcileError;
use crate::Resource;

/// Recovers the typed last-known object from a deletion payload.
///
/// A plain object is downcast directly; a tombstone must carry the same key
/// and an object of the expected type. Anything else is a
/// `CorruptNotification`: the true final state cannot be recovered, so the
/// notification is dropped rather than retried.
pub fn resolve_deleted<O>(
    kind: &str,
    key: &ObjectKey,
    state: DeletedFinalState,
) -> std::result::Result<Arc<O>, ReconcileError>
where
    O: Resource,
{
    let corrupt = |reason: String| ReconcileError::CorruptNotification {
        kind: kind.to_string(),
        key: key.to_string(),
        reason,
    };

    match state {
        DeletedFinalState::Object(obj) => obj
            .downcast::<O>()
            .map_err(|_| corrupt(format!("couldn't get object from notification, expected {}", type_name::<O>()))),
        DeletedFinalState::Tombstone(tombstone) => {
            if &tombstone.key != key {
                return Err(corrupt(format!(
                    "tombstone for {} delivered under a different key",
                    tombstone.key
                )));
            }
            tombstone
                .last_known
                .downcast::<O>()
                .map_err(|_| corrupt(format!("tombstone contained object that is not a {}", type_name::<O>())))
        }
    }
}
