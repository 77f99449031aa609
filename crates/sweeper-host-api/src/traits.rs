//! Host collaborator traits

use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use sweeper_api::{LoginEvent, TokenStatus};
use sweeper_util::{SweepError, Username};
use thiserror::Error;

use crate::{CommandOutput, CommandSpec};

/// Errors from host collaborator operations
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Command failed: {command} (status {status:?}): {stderr}")]
    CommandFailed {
        command: String,
        status: Option<i32>,
        stderr: String,
    },

    #[error("Command timed out after {}s: {command}", after.as_secs())]
    Timeout { command: String, after: Duration },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unexpected output: {0}")]
    Parse(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl HostError {
    pub fn command_failed(spec: &CommandSpec, output: &CommandOutput) -> Self {
        Self::CommandFailed {
            command: spec.to_string(),
            status: output.status,
            stderr: output.stderr.trim().to_string(),
        }
    }

    /// Attribute this failure to one step of one user's deletion
    pub fn for_user(self, user: &Username, step: &'static str) -> SweepError {
        SweepError::per_user(user, step, self.to_string())
    }
}

impl From<HostError> for SweepError {
    fn from(e: HostError) -> Self {
        SweepError::host(e.to_string())
    }
}

pub type HostResult<T> = Result<T, HostError>;

/// Administrator account used for privileged directory operations
#[derive(Clone, PartialEq, Eq)]
pub struct AdminCredential {
    pub user: String,
    pub password: String,
}

impl AdminCredential {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for AdminCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminCredential")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Location tags the fleet management tool stamps on each workstation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeploymentLocation {
    pub area: String,
    pub room: String,
}

/// Runs external commands with a bounded wait
#[async_trait]
pub trait ProcessExecutor: Send + Sync {
    /// Run to completion and capture output. A non-zero exit is returned
    /// as output, not as an error; exceeding the bound is
    /// [`HostError::Timeout`].
    async fn run(&self, command: &CommandSpec) -> HostResult<CommandOutput>;

    /// Run and require a zero exit status
    async fn run_checked(&self, command: &CommandSpec) -> HostResult<CommandOutput> {
        let output = self.run(command).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(HostError::command_failed(command, &output))
        }
    }
}

/// Local account directory
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Every account short name in the local node
    async fn list_users(&self) -> HostResult<Vec<Username>>;

    async fn user_exists(&self, user: &Username) -> HostResult<bool>;

    /// Raw attribute dump of the account record
    async fn read_record(&self, user: &Username) -> HostResult<String>;

    /// The `accountPolicyData` attribute, if set
    async fn account_policy_data(&self, user: &Username) -> HostResult<Option<String>>;

    /// The persisted local record converted to XML, if present
    async fn local_record_xml(&self, user: &Username) -> HostResult<Option<String>>;

    /// `NFSHomeDirectory` of the record
    async fn home_directory(&self, user: &Username) -> HostResult<Option<PathBuf>>;

    /// Remove one attribute from the record; absent attributes are fine
    async fn scrub_attribute(&self, user: &Username, attribute: &str) -> HostResult<()>;

    async fn token_status(&self, user: &Username) -> HostResult<TokenStatus>;

    async fn disable_token(&self, user: &Username, admin: &AdminCredential) -> HostResult<()>;

    /// Primary record deletion through the account management tool
    async fn delete_record(&self, user: &Username, admin: &AdminCredential) -> HostResult<()>;

    /// Direct node deletion, used when the primary deletion left the record behind
    async fn delete_record_fallback(&self, user: &Username) -> HostResult<()>;

    /// Names of the directories directly under `root`
    async fn list_home_directories(&self, root: &Path) -> HostResult<Vec<Username>>;

    /// Clear protection flags and remove the directory tree
    async fn remove_home(&self, path: &Path) -> HostResult<()>;

    /// Whether the user is a full-disk-encryption unlock user
    async fn fde_enrolled(&self, user: &Username) -> HostResult<bool>;

    async fn remove_fde(&self, user: &Username) -> HostResult<()>;

    /// Flush the directory service caches
    async fn flush_cache(&self) -> HostResult<()>;
}

/// Interactive session and deployment facts about this host
#[async_trait]
pub trait SessionHost: Send + Sync {
    /// Owner of the console, `None` if it cannot be determined
    async fn console_user(&self) -> HostResult<Option<Username>>;

    /// Terminate every process owned by the user
    async fn terminate_processes(&self, user: &Username) -> HostResult<()>;

    async fn deployment_location(&self) -> HostResult<DeploymentLocation>;

    /// Base64-encoded administrator password as provisioned on the host
    async fn admin_credential(&self) -> HostResult<String>;
}

/// System session history
#[async_trait]
pub trait LoginHistory: Send + Sync {
    /// Every login the history still records, newest first
    async fn login_events(&self) -> HostResult<Vec<LoginEvent>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_debug_is_redacted() {
        let cred = AdminCredential::new("Administrator", "s3cret");
        let shown = format!("{:?}", cred);
        assert!(shown.contains("Administrator"));
        assert!(!shown.contains("s3cret"));
    }

    #[test]
    fn per_user_conversion_keeps_step() {
        let err = HostError::Timeout {
            command: "pkill -u bob".into(),
            after: Duration::from_secs(5),
        }
        .for_user(&Username::from("bob"), "terminate processes");
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("timed out"));
    }
}
