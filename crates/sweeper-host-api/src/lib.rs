//! Host collaborator trait interfaces for sweeper
//!
//! This crate defines the capability-based interface between the core and
//! platform-specific implementations. It contains no platform code itself,
//! only the traits and mock implementations for tests.

mod command;
mod mock;
mod traits;

pub use command::*;
pub use mock::*;
pub use traits::*;
