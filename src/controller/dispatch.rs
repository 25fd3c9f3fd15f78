use std::any::type_name;
use std::marker::PhantomData;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::BoxError;
use crate::CacheProvider;
use crate::ObjectKey;
use crate::ReconcileError;
use crate::Reconciler;
use crate::Resource;
use crate::Result;
use crate::Scope;

/// Routes one dequeued key to the registered handler pair.
///
/// Keeps the per-type deletion snapshots: the last known state of objects
/// whose deletion was notified but not yet reconciled successfully.
pub(crate) struct Dispatcher<O, R> {
    kind: String,
    scope: Scope,
    cache: Arc<dyn CacheProvider>,
    reconciler: R,
    snapshots: DashMap<ObjectKey, Arc<O>>,
    _object: PhantomData<fn() -> O>,
}

impl<O, R> Dispatcher<O, R>
where
    O: Resource,
    R: Reconciler<O>,
{
    pub(crate) fn new(
        kind: &str,
        scope: Scope,
        cache: Arc<dyn CacheProvider>,
        reconciler: R,
    ) -> Self {
        Self {
            kind: kind.to_string(),
            scope,
            cache,
            reconciler,
            snapshots: DashMap::new(),
            _object: PhantomData,
        }
    }

    /// Remembers `last_known` as the final state of `key`. A later deletion of
    /// the same key replaces it.
    pub(crate) fn record_deletion(
        &self,
        key: ObjectKey,
        last_known: Arc<O>,
    ) {
        self.snapshots.insert(key, last_known);
    }

    pub(crate) fn has_snapshot(
        &self,
        key: &ObjectKey,
    ) -> bool {
        self.snapshots.contains_key(key)
    }

    /// Reconciles `key` against the current cache contents.
    pub(crate) async fn dispatch(
        &self,
        key: &ObjectKey,
    ) -> Result<()> {
        let (namespace, name) = key.split(&self.kind, self.scope)?;
        let cached = self.cache.lookup(&self.kind, namespace.unwrap_or(""), name)?;

        match cached {
            Some(object) => {
                let object = object.downcast::<O>().map_err(|_| ReconcileError::TypeMismatch {
                    kind: self.kind.clone(),
                    key: key.to_string(),
                    expected: type_name::<O>(),
                })?;
                if self.snapshots.remove(key).is_some() {
                    debug!(kind = %self.kind, %key, "object present again, dropping deletion snapshot");
                }
                self.reconciler
                    .created_or_updated(object)
                    .await
                    .map_err(|source| self.handler_error(key, source))?;
            }
            None => {
                let Some(last_known) = self.snapshots.get(key).map(|entry| entry.value().clone()) else {
                    return Err(ReconcileError::NotFound {
                        kind: self.kind.clone(),
                        key: key.to_string(),
                    }
                    .into());
                };
                self.reconciler
                    .deleted(last_known.clone())
                    .await
                    .map_err(|source| self.handler_error(key, source))?;
                // A newer deletion recorded meanwhile must survive.
                self.snapshots
                    .remove_if(key, |_, current| Arc::ptr_eq(current, &last_known));
            }
        }
        Ok(())
    }

    fn handler_error(
        &self,
        key: &ObjectKey,
        source: BoxError,
    ) -> crate::Error {
        ReconcileError::Handler {
            kind: self.kind.clone(),
            key: key.to_string(),
            source,
        }
        .into()
    }
}
