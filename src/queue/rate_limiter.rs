//! Requeue delay policies.
//!
//! A [`RateLimiter`] answers "how long should this item wait before it is
//! retried", tracking per-item failures so that repeated failures back off
//! exponentially and a success ([`RateLimiter::forget`]) starts over.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::RateLimitConfig;

pub trait RateLimiter<T>: Send + Sync {
    /// Delay before `item` may be processed again. Counts as one failure.
    fn when(
        &self,
        item: &T,
    ) -> Duration;

    /// Stops tracking `item`; its next failure starts from the minimum delay.
    fn forget(
        &self,
        item: &T,
    );

    /// Failures recorded for `item` since it was last forgotten
    fn num_requeues(
        &self,
        item: &T,
    ) -> u32;
}

/// Per-item exponential backoff: `base * 2^failures`, capped at `max`.
pub struct ItemExponentialFailureRateLimiter<T> {
    failures: Mutex<HashMap<T, u32>>,
    base_delay: Duration,
    max_delay: Duration,
}

impl<T> ItemExponentialFailureRateLimiter<T>
where
    T: Hash + Eq + Clone,
{
    pub fn new(
        base_delay: Duration,
        max_delay: Duration,
    ) -> Self {
        Self {
            failures: Mutex::new(HashMap::new()),
            base_delay,
            max_delay,
        }
    }

    fn backoff(
        &self,
        exp: u32,
    ) -> Duration {
        // 2^exp overflows long before the cap is interesting
        2u32.checked_pow(exp)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

impl<T> RateLimiter<T> for ItemExponentialFailureRateLimiter<T>
where
    T: Hash + Eq + Clone + Send + Sync,
{
    fn when(
        &self,
        item: &T,
    ) -> Duration {
        let exp = {
            let mut failures = self.failures.lock();
            let count = failures.entry(item.clone()).or_insert(0);
            let exp = *count;
            *count = count.saturating_add(1);
            exp
        };
        self.backoff(exp)
    }

    fn forget(
        &self,
        item: &T,
    ) {
        self.failures.lock().remove(item);
    }

    fn num_requeues(
        &self,
        item: &T,
    ) -> u32 {
        self.failures.lock().get(item).copied().unwrap_or(0)
    }
}

/// Overall token bucket shared by every item: `qps` tokens per second,
/// holding at most `burst`. Returns how long the caller must wait for its
/// reserved token; it does not track individual items.
pub struct BucketRateLimiter {
    bucket: Mutex<TokenBucket>,
}

struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
    capacity: f64,
    refill_rate: f64,
}

impl TokenBucket {
    fn refill_tokens(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();

        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    /// Takes one token, going into debt when empty; the debt is the wait.
    fn reserve(&mut self) -> Duration {
        self.refill_tokens();
        self.tokens -= 1.0;
        if self.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-self.tokens / self.refill_rate)
        }
    }
}

impl BucketRateLimiter {
    pub fn new(
        qps: f64,
        burst: u32,
    ) -> Self {
        let capacity = f64::from(burst.max(1));
        Self {
            bucket: Mutex::new(TokenBucket {
                tokens: capacity,
                last_refill: Instant::now(),
                capacity,
                refill_rate: qps,
            }),
        }
    }
}

impl<T> RateLimiter<T> for BucketRateLimiter {
    fn when(
        &self,
        _item: &T,
    ) -> Duration {
        self.bucket.lock().reserve()
    }

    fn forget(
        &self,
        _item: &T,
    ) {
    }

    fn num_requeues(
        &self,
        _item: &T,
    ) -> u32 {
        0
    }
}

/// Combines limiters by taking the longest delay (and the highest requeue
/// count) among them.
pub struct MaxOfRateLimiter<T> {
    limiters: Vec<Arc<dyn RateLimiter<T>>>,
}

impl<T> MaxOfRateLimiter<T> {
    pub fn new(limiters: Vec<Arc<dyn RateLimiter<T>>>) -> Self {
        Self { limiters }
    }
}

impl<T> RateLimiter<T> for MaxOfRateLimiter<T>
where
    T: Send + Sync,
{
    fn when(
        &self,
        item: &T,
    ) -> Duration {
        // Every limiter must observe the failure, so no short-circuiting.
        self.limiters
            .iter()
            .map(|l| l.when(item))
            .fold(Duration::ZERO, Duration::max)
    }

    fn forget(
        &self,
        item: &T,
    ) {
        for l in &self.limiters {
            l.forget(item);
        }
    }

    fn num_requeues(
        &self,
        item: &T,
    ) -> u32 {
        self.limiters.iter().map(|l| l.num_requeues(item)).max().unwrap_or(0)
    }
}

/// Per-item exponential backoff combined with an overall token bucket.
pub fn default_controller_rate_limiter<T>(config: &RateLimitConfig) -> Arc<dyn RateLimiter<T>>
where
    T: Hash + Eq + Clone + Send + Sync + 'static,
{
    let limiters: Vec<Arc<dyn RateLimiter<T>>> = vec![
        Arc::new(ItemExponentialFailureRateLimiter::new(
            config.base_delay(),
            config.max_delay(),
        )),
        Arc::new(BucketRateLimiter::new(config.qps, config.burst)),
    ];
    Arc::new(MaxOfRateLimiter::new(limiters))
}
