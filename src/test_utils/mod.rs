//! Fixtures shared by the unit tests: watched object types, recording
//! notification handlers and scripted reconcilers.
mod common;
mod fixtures;

pub use common::*;
pub use fixtures::*;
