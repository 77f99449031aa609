//! Shared utilities for sweeper
//!
//! This crate provides:
//! - ID types (Username, RunId)
//! - Time utilities (epoch seconds, mock wall clock)
//! - Error taxonomy with process exit codes
//! - Default paths for the record store, audit log and lock marker
//! - The single-instance lock

mod error;
mod ids;
mod lock;
mod paths;
mod time;

pub use error::*;
pub use ids::*;
pub use lock::*;
pub use paths::*;
pub use time::*;
