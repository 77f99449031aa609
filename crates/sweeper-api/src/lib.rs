//! Domain types for sweeper
//!
//! This crate defines the vocabulary shared by every other crate:
//! - User records and login events
//! - Deletion policies and strategies
//! - The exclusion set
//! - Per-user deletion states

mod types;

pub use types::*;
