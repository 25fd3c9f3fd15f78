use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::worker::run_worker;
use super::Dispatcher;
use crate::metrics::QUEUE_ADDS;
use crate::metrics::QUEUE_DEPTH;
use crate::metrics::RECONCILE_ERRORS;
use crate::queue::default_controller_rate_limiter;
use crate::queue::RateLimitingQueue;
use crate::resolve_deleted;
use crate::CacheProvider;
use crate::Error;
use crate::Notification;
use crate::NotificationHandler;
use crate::ObjectKey;
use crate::RateLimitConfig;
use crate::Reconciler;
use crate::Resource;
use crate::ResourceConfig;

/// Snapshot of one type's queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    /// Keys waiting to be handed to a worker
    pub pending: usize,
    /// Keys currently being reconciled
    pub in_flight: usize,
    pub shutting_down: bool,
}

/// Queue state of a single key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyStatus {
    pub pending: bool,
    pub in_flight: bool,
    /// Consecutive failures counted by the rate limiter
    pub requeues: u32,
    /// A deletion is waiting to be reconciled
    pub deletion_pending: bool,
}

/// One initialized registration, seen by the controller without its types.
pub(crate) trait WatchedType: Send + Sync {
    fn kind(&self) -> &str;

    fn notification_handler(self: Arc<Self>) -> Arc<dyn NotificationHandler>;

    fn spawn_workers(self: Arc<Self>) -> Vec<JoinHandle<()>>;

    fn shut_down(&self);

    fn stats(&self) -> QueueStats;

    fn key_status(
        &self,
        key: &ObjectKey,
    ) -> KeyStatus;
}

/// Queue, dispatcher and worker settings of one registered object type.
pub(crate) struct TypedWatch<O, R> {
    pub(super) resource: ResourceConfig,
    pub(super) workers: usize,
    pub(super) queue: RateLimitingQueue<ObjectKey>,
    pub(super) dispatcher: Dispatcher<O, R>,
}

impl<O, R> TypedWatch<O, R>
where
    O: Resource,
    R: Reconciler<O>,
{
    /// Builds the queue; must run inside a tokio runtime.
    pub(crate) fn new(
        resource: ResourceConfig,
        reconciler: R,
        cache: Arc<dyn CacheProvider>,
        rate_limit: &RateLimitConfig,
        default_workers: usize,
    ) -> Self {
        let queue = RateLimitingQueue::new(&resource.name, default_controller_rate_limiter(rate_limit));
        let dispatcher = Dispatcher::new(&resource.name, resource.scope, cache, reconciler);
        Self {
            workers: resource.workers_or(default_workers),
            resource,
            queue,
            dispatcher,
        }
    }

    fn enqueue(
        &self,
        key: ObjectKey,
    ) {
        trace!(kind = %self.kind(), %key, "enqueue");
        if self.queue.add(key) {
            QUEUE_ADDS.with_label_values(&[self.kind()]).inc();
        }
        self.update_depth();
    }

    pub(super) fn update_depth(&self) {
        QUEUE_DEPTH
            .with_label_values(&[self.kind()])
            .set(self.queue.len() as i64);
    }
}

impl<O, R> NotificationHandler for TypedWatch<O, R>
where
    O: Resource,
    R: Reconciler<O>,
{
    fn on_notification(
        &self,
        notification: Notification,
    ) {
        match notification {
            Notification::Added(key) if self.resource.create => self.enqueue(key),
            Notification::Updated(key) if self.resource.update => self.enqueue(key),
            Notification::Deleted(key, state) if self.resource.delete => {
                match resolve_deleted::<O>(self.kind(), &key, state) {
                    Ok(last_known) => {
                        self.dispatcher.record_deletion(key.clone(), last_known);
                        self.enqueue(key);
                    }
                    Err(e) => {
                        let e = Error::from(e);
                        warn!(kind = %self.kind(), %key, "dropping deletion: {}", e);
                        RECONCILE_ERRORS
                            .with_label_values(&[self.kind(), e.reason()])
                            .inc();
                    }
                }
            }
            other => {
                trace!(kind = %self.kind(), key = %other.key(), "event not subscribed, ignoring");
            }
        }
    }
}

impl<O, R> WatchedType for TypedWatch<O, R>
where
    O: Resource,
    R: Reconciler<O>,
{
    fn kind(&self) -> &str {
        &self.resource.name
    }

    fn notification_handler(self: Arc<Self>) -> Arc<dyn NotificationHandler> {
        self
    }

    fn spawn_workers(self: Arc<Self>) -> Vec<JoinHandle<()>> {
        debug!(kind = %self.resource.name, workers = self.workers, "starting workers");
        (0..self.workers)
            .map(|id| tokio::spawn(run_worker(self.clone(), id)))
            .collect()
    }

    fn shut_down(&self) {
        self.queue.shut_down();
    }

    fn stats(&self) -> QueueStats {
        QueueStats {
            pending: self.queue.len(),
            in_flight: self.queue.in_flight_len(),
            shutting_down: self.queue.is_shutting_down(),
        }
    }

    fn key_status(
        &self,
        key: &ObjectKey,
    ) -> KeyStatus {
        let work_queue = self.queue.work_queue();
        KeyStatus {
            pending: work_queue.is_pending(key),
            in_flight: work_queue.is_in_flight(key),
            requeues: self.queue.num_requeues(key),
            deletion_pending: self.dispatcher.has_snapshot(key),
        }
    }
}
