//! Error types for sweeper

use std::path::PathBuf;
use thiserror::Error;

use crate::Username;

/// Core error type for sweeper runs.
///
/// The first four variants are fatal and abort a run. `PerUserOperation`
/// and `Verification` are recovered inside the run and only ever logged.
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Another instance is already running (lock held at {})", .0.display())]
    InstanceAlreadyRunning(PathBuf),

    #[error("Credential error: {0}")]
    Credential(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Operation '{step}' failed for '{user}': {message}")]
    PerUserOperation {
        user: Username,
        step: &'static str,
        message: String,
    },

    #[error("User '{0}' still exists after deletion")]
    Verification(Username),

    #[error("Host error: {0}")]
    Host(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SweepError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn credential(msg: impl Into<String>) -> Self {
        Self::Credential(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    pub fn host(msg: impl Into<String>) -> Self {
        Self::Host(msg.into())
    }

    pub fn per_user(user: &Username, step: &'static str, msg: impl Into<String>) -> Self {
        Self::PerUserOperation {
            user: user.clone(),
            step,
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error aborts the whole run
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::PerUserOperation { .. } | Self::Verification(_)
        )
    }

    /// Process exit status for a run that ended with this error
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Configuration(_) | Self::Store(_) => 2,
            Self::InstanceAlreadyRunning(_) => 3,
            Self::Credential(_) => 4,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, SweepError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct_for_fatal_kinds() {
        assert_eq!(SweepError::config("missing").exit_code(), 2);
        assert_eq!(
            SweepError::InstanceAlreadyRunning(PathBuf::from("/tmp/x.lock")).exit_code(),
            3
        );
        assert_eq!(SweepError::credential("bad base64").exit_code(), 4);
        assert_eq!(SweepError::internal("boom").exit_code(), 1);
    }

    #[test]
    fn per_user_errors_are_not_fatal() {
        let user = Username::new("bob");
        assert!(!SweepError::per_user(&user, "delete-record", "exit 1").is_fatal());
        assert!(!SweepError::Verification(user).is_fatal());
        assert!(SweepError::config("x").is_fatal());
    }
}
