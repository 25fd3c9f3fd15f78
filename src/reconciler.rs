use std::sync::Arc;

use async_trait::async_trait;

use crate::BoxError;
use crate::Resource;

pub type HandlerResult = std::result::Result<(), BoxError>;

/// Handler pair registered for one watched object type.
///
/// Creations and updates are indistinguishable once coalesced in the queue, so
/// both reach [`Reconciler::created_or_updated`] with the current cached
/// object. [`Reconciler::deleted`] receives the last known state of an object
/// that is gone from the cache.
///
/// Calls for the same key never overlap. Returning an error (or panicking)
/// requeues the key with backoff; handlers must therefore be idempotent.
#[async_trait]
pub trait Reconciler<O>: Send + Sync + 'static
where
    O: Resource,
{
    async fn created_or_updated(
        &self,
        object: Arc<O>,
    ) -> HandlerResult;

    async fn deleted(
        &self,
        object: Arc<O>,
    ) -> HandlerResult;
}

#[async_trait]
impl<O, R> Reconciler<O> for Arc<R>
where
    O: Resource,
    R: Reconciler<O> + ?Sized,
{
    async fn created_or_updated(
        &self,
        object: Arc<O>,
    ) -> HandlerResult {
        (**self).created_or_updated(object).await
    }

    async fn deleted(
        &self,
        object: Arc<O>,
    ) -> HandlerResult {
        (**self).deleted(object).await
    }
}
