//! Persistence layer for sweeper
//!
//! Provides:
//! - Session record snapshot (last logins, creation dates, exclusions)
//! - Deferral queue persisted alongside the snapshot
//! - Audit log (append-only, rotated by size, truncated by age)

mod audit;
mod deferral;
mod json;
mod memory;
mod snapshot;
mod traits;

pub use audit::*;
pub use deferral::*;
pub use json::*;
pub use memory::*;
pub use snapshot::*;
pub use traits::*;

use std::path::PathBuf;
use sweeper_util::SweepError;
use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record store not found: {0}")]
    NotFound(PathBuf),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid record store: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<tempfile::PersistError> for StoreError {
    fn from(e: tempfile::PersistError) -> Self {
        StoreError::Io(e.error)
    }
}

/// A store that cannot be read is a configuration problem for the run
impl From<StoreError> for SweepError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Io(_) => SweepError::store(e.to_string()),
            _ => SweepError::config(e.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
