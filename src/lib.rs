//! A generic resource reconciliation controller engine.
//!
//! Given a set of watched object types, the engine keeps one deduplicating,
//! rate-limited work queue per type, fed with object keys by a
//! [`CacheProvider`]. Workers take keys off the queue and hand the current
//! object, or the last known state of a deleted one, to the registered
//! [`Reconciler`]. Failures are retried with exponential backoff until they
//! succeed or the controller shuts down.
//!
//! Workers only start once every cache reports synced; shutdown stops new work
//! and drains what is already queued.
mod cache;
mod config;
mod constants;
mod controller;
mod errors;
pub mod metrics;
pub mod queue;
mod reconciler;
mod resource;
pub mod utils;

pub use cache::*;
pub use config::*;
pub use controller::*;
pub use errors::*;
pub use reconciler::*;
pub use resource::*;


//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
