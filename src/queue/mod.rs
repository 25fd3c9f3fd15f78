//! Per-object-type event queues.
//!
//! Layered the way controllers usually build them:
//! [`WorkQueue`] (dedup + in-flight tracking) <- [`DelayingQueue`] (add after a
//! delay) <- [`RateLimitingQueue`] (add after a backoff chosen by a
//! [`RateLimiter`]).
mod delaying;
mod rate_limiter;
mod rate_limiting;
mod work_queue;

pub use delaying::*;
pub use rate_limiter::*;
pub use rate_limiting::*;
pub use work_queue::*;
