use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use super::DelayingQueue;
use super::RateLimiter;
use super::WorkQueue;

/// The per-object-type event queue: a [`DelayingQueue`] whose failed items
/// are re-added after a delay chosen by a [`RateLimiter`].
pub struct RateLimitingQueue<T> {
    delaying: DelayingQueue<T>,
    rate_limiter: Arc<dyn RateLimiter<T>>,
}

impl<T> RateLimitingQueue<T>
where
    T: Hash + Eq + Clone + Send + Sync + 'static,
{
    /// Must be called from within a tokio runtime.
    pub fn new(
        name: &str,
        rate_limiter: Arc<dyn RateLimiter<T>>,
    ) -> Self {
        Self {
            delaying: DelayingQueue::new(name),
            rate_limiter,
        }
    }

    pub fn add(
        &self,
        item: T,
    ) -> bool {
        self.delaying.add(item)
    }

    pub fn add_after(
        &self,
        item: T,
        delay: Duration,
    ) {
        self.delaying.add_after(item, delay);
    }

    /// Re-adds `item` after its backoff delay, recording one more failure.
    /// Returns the delay applied.
    pub fn add_rate_limited(
        &self,
        item: T,
    ) -> Duration {
        let delay = self.rate_limiter.when(&item);
        self.delaying.add_after(item, delay);
        delay
    }

    /// Resets the failure history of `item`.
    pub fn forget(
        &self,
        item: &T,
    ) {
        self.rate_limiter.forget(item);
    }

    pub fn num_requeues(
        &self,
        item: &T,
    ) -> u32 {
        self.rate_limiter.num_requeues(item)
    }

    pub async fn get(&self) -> Option<T> {
        self.delaying.get().await
    }

    pub fn done(
        &self,
        item: &T,
    ) {
        self.delaying.done(item);
    }

    pub fn shut_down(&self) {
        self.delaying.shut_down();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.work_queue().is_shutting_down()
    }

    pub fn len(&self) -> usize {
        self.work_queue().len()
    }

    pub fn is_empty(&self) -> bool {
        self.work_queue().is_empty()
    }

    pub fn in_flight_len(&self) -> usize {
        self.work_queue().in_flight_len()
    }

    pub fn work_queue(&self) -> &WorkQueue<T> {
        self.delaying.work_queue()
    }
}
