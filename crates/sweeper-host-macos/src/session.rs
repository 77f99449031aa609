//! Console session, process termination and deployment tags

use async_trait::async_trait;
use nix::unistd::User;
use std::sync::Arc;
use sweeper_host_api::{
    CommandSpec, DeploymentLocation, HostError, HostResult, ProcessExecutor, SessionHost,
};
use sweeper_util::Username;
use tracing::{debug, warn};

const DEFAULTS: &str = "/usr/bin/defaults";

/// Preference domain holding the Remote Desktop computer info fields
pub const REMOTE_DESKTOP_DOMAIN: &str = "/Library/Preferences/com.apple.RemoteDesktop";

/// [`SessionHost`] for macOS
pub struct MacSessionHost {
    executor: Arc<dyn ProcessExecutor>,
}

impl MacSessionHost {
    pub fn new(executor: Arc<dyn ProcessExecutor>) -> Self {
        Self { executor }
    }

    /// One computer info field; absent fields read as empty
    async fn remote_desktop_field(&self, key: &str) -> HostResult<String> {
        let spec = CommandSpec::new(DEFAULTS).args(["read", REMOTE_DESKTOP_DOMAIN, key]);
        let output = self.executor.run(&spec).await?;
        if output.success() {
            Ok(output.text().to_string())
        } else {
            debug!(key, "Remote Desktop field not set");
            Ok(String::new())
        }
    }
}

#[async_trait]
impl SessionHost for MacSessionHost {
    async fn console_user(&self) -> HostResult<Option<Username>> {
        let spec = CommandSpec::new("/usr/bin/stat").args(["-f%Su", "/dev/console"]);
        let output = self.executor.run(&spec).await?;
        if !output.success() || output.text().is_empty() {
            return Ok(None);
        }
        Ok(Some(Username::from(output.text())))
    }

    async fn terminate_processes(&self, user: &Username) -> HostResult<()> {
        // Match by uid when the account still resolves
        let target = match User::from_name(user.as_str()) {
            Ok(Some(u)) => u.uid.to_string(),
            Ok(None) => user.to_string(),
            Err(e) => {
                warn!(user = %user, error = %e, "User lookup failed, matching by name");
                user.to_string()
            }
        };

        let spec = CommandSpec::new("/usr/bin/pkill").args(["-9", "-u", target.as_str()]);
        let output = self.executor.run(&spec).await?;
        match output.status {
            // 1: no process matched
            Some(0) | Some(1) => Ok(()),
            _ => Err(HostError::command_failed(&spec, &output)),
        }
    }

    async fn deployment_location(&self) -> HostResult<DeploymentLocation> {
        Ok(DeploymentLocation {
            area: self.remote_desktop_field("Text2").await?,
            room: self.remote_desktop_field("Text3").await?,
        })
    }

    async fn admin_credential(&self) -> HostResult<String> {
        let spec = CommandSpec::new(DEFAULTS).args(["read", "ManagedInstalls", "SecureTokenAdmin"]);
        let output = self.executor.run(&spec).await?;
        if !output.success() {
            return Err(HostError::NotFound("SecureTokenAdmin preference".into()));
        }
        Ok(output.text().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sweeper_host_api::{CommandOutput, ScriptedExecutor};

    fn host(exec: ScriptedExecutor) -> MacSessionHost {
        MacSessionHost::new(Arc::new(exec))
    }

    #[tokio::test]
    async fn console_user_from_stat() {
        let h = host(ScriptedExecutor::new().on("/usr/bin/stat", CommandOutput::ok("bob\n")));
        assert_eq!(h.console_user().await.unwrap(), Some(Username::from("bob")));

        let h = host(ScriptedExecutor::new().on("/usr/bin/stat", CommandOutput::failed(1, "")));
        assert_eq!(h.console_user().await.unwrap(), None);
    }

    #[tokio::test]
    async fn location_fields_default_to_empty() {
        let h = host(
            ScriptedExecutor::new()
                .on("/usr/bin/defaults read /Library/Preferences/com.apple.RemoteDesktop Text2", CommandOutput::ok("Library Annex\n"))
                .on("/usr/bin/defaults read /Library/Preferences/com.apple.RemoteDesktop Text3", CommandOutput::failed(1, "does not exist")),
        );
        let loc = h.deployment_location().await.unwrap();
        assert_eq!(loc.area, "Library Annex");
        assert_eq!(loc.room, "");
    }

    #[tokio::test]
    async fn missing_credential_is_not_found() {
        let h = host(ScriptedExecutor::new().on("/usr/bin/defaults read ManagedInstalls", CommandOutput::failed(1, "")));
        assert!(matches!(h.admin_credential().await, Err(HostError::NotFound(_))));
    }

    #[tokio::test]
    async fn pkill_without_matches_is_success() {
        let h = host(ScriptedExecutor::new().on("/usr/bin/pkill", CommandOutput::failed(1, "")));
        h.terminate_processes(&Username::from("sweeper-no-such-user")).await.unwrap();

        let h = host(ScriptedExecutor::new().on("/usr/bin/pkill", CommandOutput::failed(3, "fatal")));
        assert!(h.terminate_processes(&Username::from("sweeper-no-such-user")).await.is_err());
    }
}
