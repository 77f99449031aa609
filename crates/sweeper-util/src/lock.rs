//! Single-instance guard
//!
//! The lock is an exclusive marker file created with `O_CREAT | O_EXCL`.
//! Creation either succeeds atomically or fails because another run holds
//! it; there is no waiting and no retry. The marker is removed when the
//! guard is dropped, which covers early returns and error propagation.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::{Result, SweepError};

/// RAII guard for the run-wide instance lock.
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
}

impl InstanceLock {
    /// Acquire the lock or fail with [`SweepError::InstanceAlreadyRunning`].
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(SweepError::InstanceAlreadyRunning(path));
            }
            Err(e) => return Err(SweepError::Io(e)),
        };

        // Informational only; ownership is the file's existence.
        if let Err(e) = writeln!(file, "{}", std::process::id()) {
            warn!(path = %path.display(), error = %e, "Failed to record pid in lock marker");
        }

        debug!(path = %path.display(), "Instance lock acquired");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Instance lock released"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to release instance lock"),
        }
    }
}
