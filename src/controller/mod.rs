//! The controller: one generic engine per watched object type, started and
//! stopped together.
//!
//! - [`ControllerBuilder`] collects the registrations.
//! - [`Controller::initialize`] builds each type's queue and subscribes it to
//!   the cache provider.
//! - [`Controller::run`] syncs the caches, runs the workers and drains them on
//!   shutdown.
mod builder;
mod dispatch;
mod lifecycle;
mod watched;
mod worker;

pub use builder::*;
pub(crate) use dispatch::*;
pub use lifecycle::*;
pub use watched::*;
