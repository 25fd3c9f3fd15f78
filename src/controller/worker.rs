use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::time::Instant;
use tracing::debug;
use tracing::error;
use tracing::warn;

use super::TypedWatch;
use super::WatchedType;
use crate::metrics::QUEUE_RETRIES;
use crate::metrics::RECONCILE_DURATION;
use crate::metrics::RECONCILE_ERRORS;
use crate::ObjectKey;
use crate::ReconcileError;
use crate::Reconciler;
use crate::Resource;
use crate::Result;

/// Processes keys until the queue is shut down and drained.
pub(crate) async fn run_worker<O, R>(
    watch: Arc<TypedWatch<O, R>>,
    id: usize,
) where
    O: Resource,
    R: Reconciler<O>,
{
    debug!(kind = %watch.kind(), worker = id, "worker started");
    while process_next_item(&watch).await {}
    debug!(kind = %watch.kind(), worker = id, "worker stopped");
}

/// Takes one key off the queue and reconciles it.
///
/// Returns `false` once the queue has shut down and no key is left.
pub(crate) async fn process_next_item<O, R>(watch: &TypedWatch<O, R>) -> bool
where
    O: Resource,
    R: Reconciler<O>,
{
    let Some(key) = watch.queue.get().await else {
        return false;
    };
    watch.update_depth();

    let started = Instant::now();
    let result = AssertUnwindSafe(watch.dispatcher.dispatch(&key))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| {
            Err(ReconcileError::Handler {
                kind: watch.kind().to_string(),
                key: key.to_string(),
                source: format!("handler panicked: {}", panic_message(panic.as_ref())).into(),
            }
            .into())
        });
    RECONCILE_DURATION
        .with_label_values(&[watch.kind()])
        .observe(started.elapsed().as_secs_f64());

    handle_result(watch, &key, result);
    watch.queue.done(&key);
    true
}

fn handle_result<O, R>(
    watch: &TypedWatch<O, R>,
    key: &ObjectKey,
    result: Result<()>,
) where
    O: Resource,
    R: Reconciler<O>,
{
    let kind = watch.kind();
    let Err(e) = result else {
        watch.queue.forget(key);
        return;
    };

    RECONCILE_ERRORS.with_label_values(&[kind, e.reason()]).inc();
    if e.is_retryable() {
        let delay = watch.queue.add_rate_limited(key.clone());
        QUEUE_RETRIES.with_label_values(&[kind]).inc();
        warn!(
            %kind,
            %key,
            retries = watch.queue.num_requeues(key),
            ?delay,
            "error syncing, requeuing: {}",
            e
        );
    } else {
        watch.queue.forget(key);
        error!(%kind, %key, "dropping key out of the queue: {}", e);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
