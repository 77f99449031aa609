//! Local account directory through the OS account tools

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use sweeper_api::TokenStatus;
use sweeper_host_api::{
    AccountDirectory, AdminCredential, CommandSpec, HostError, HostResult, ProcessExecutor,
};
use sweeper_util::Username;
use tracing::{debug, info, warn};

const DSCL: &str = "/usr/bin/dscl";
const SYSADMINCTL: &str = "/usr/sbin/sysadminctl";
const FDESETUP: &str = "/usr/bin/fdesetup";
const PLUTIL: &str = "/usr/bin/plutil";

/// Local directory node on disk
pub const DEFAULT_LOCAL_NODE: &str = "/private/var/db/dslocal/nodes/Default";

/// [`AccountDirectory`] backed by `dscl`, `sysadminctl` and `fdesetup`
pub struct DsclDirectory {
    executor: Arc<dyn ProcessExecutor>,
    local_node: PathBuf,
}

impl DsclDirectory {
    pub fn new(executor: Arc<dyn ProcessExecutor>) -> Self {
        Self {
            executor,
            local_node: PathBuf::from(DEFAULT_LOCAL_NODE),
        }
    }

    pub fn with_local_node(mut self, path: impl Into<PathBuf>) -> Self {
        self.local_node = path.into();
        self
    }

    fn record_path(user: &Username) -> String {
        format!("/Users/{}", user)
    }

    fn dscl(args: &[&str]) -> CommandSpec {
        CommandSpec::new(DSCL).arg(".").args(args.iter().copied())
    }

    fn with_admin(spec: CommandSpec, admin: &AdminCredential) -> CommandSpec {
        spec.args([
            "-adminUser",
            admin.user.as_str(),
            "-adminPassword",
            admin.password.as_str(),
        ])
        .sensitive()
    }

    /// `None` only when `dscl` reports the record or attribute missing;
    /// any other failure is an error, never "absent".
    async fn read_attribute(&self, user: &Username, attribute: &str) -> HostResult<Option<String>> {
        let record = Self::record_path(user);
        let spec = Self::dscl(&["-read", record.as_str(), attribute]);
        let output = self.executor.run(&spec).await?;
        if output.success() {
            return Ok(Some(output.stdout));
        }
        if reports_missing(&output.stdout) || reports_missing(&output.stderr) {
            return Ok(None);
        }
        Err(HostError::command_failed(&spec, &output))
    }

    /// Best-effort command: a failure is logged and reported to the caller
    async fn run_logged(&self, spec: CommandSpec) -> HostResult<()> {
        let result = self.executor.run_checked(&spec).await;
        if let Err(e) = &result {
            warn!(command = %spec, error = %e, "Command failed");
        }
        result.map(|_| ())
    }
}

/// `dscl -read` prints `Attribute: value` or `Attribute:\n value`
pub fn parse_attribute_value(output: &str, attribute: &str) -> Option<String> {
    let prefix = format!("{}:", attribute);
    let mut lines = output.lines();
    while let Some(line) = lines.next() {
        if let Some(rest) = line.strip_prefix(&prefix) {
            let value = rest.trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
            return lines.next().map(|l| l.trim().to_string()).filter(|v| !v.is_empty());
        }
    }
    None
}

/// `dscl` wording for a missing record (`eDSRecordNotFound`) or attribute
pub fn reports_missing(text: &str) -> bool {
    text.contains("eDSRecordNotFound") || text.contains("No such key")
}

/// `sysadminctl -secureTokenStatus` reports on stderr
pub fn parse_token_status(text: &str) -> TokenStatus {
    if text.contains("ENABLED") {
        TokenStatus::Enabled
    } else if text.contains("DISABLED") {
        TokenStatus::Disabled
    } else {
        TokenStatus::Unknown
    }
}

/// `fdesetup list` prints `user,UUID` per enrolled user
pub fn fde_list_contains(output: &str, user: &Username) -> bool {
    output
        .lines()
        .filter_map(|line| line.split(',').next())
        .any(|name| name.trim() == user.as_str())
}

#[async_trait]
impl AccountDirectory for DsclDirectory {
    async fn list_users(&self) -> HostResult<Vec<Username>> {
        let output = self
            .executor
            .run_checked(&Self::dscl(&["-list", "/Users"]))
            .await?;
        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(Username::from)
            .collect())
    }

    async fn user_exists(&self, user: &Username) -> HostResult<bool> {
        Ok(self.read_attribute(user, "RecordName").await?.is_some())
    }

    async fn read_record(&self, user: &Username) -> HostResult<String> {
        let record = Self::record_path(user);
        let output = self
            .executor
            .run_checked(&Self::dscl(&["-read", record.as_str()]))
            .await?;
        Ok(output.stdout)
    }

    async fn account_policy_data(&self, user: &Username) -> HostResult<Option<String>> {
        self.read_attribute(user, "accountPolicyData").await
    }

    async fn local_record_xml(&self, user: &Username) -> HostResult<Option<String>> {
        let path = self.local_node.join("users").join(format!("{}.plist", user));
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(None);
        }
        let spec = CommandSpec::new(PLUTIL)
            .args(["-convert", "xml1", "-o", "-"])
            .arg(path.display().to_string());
        let output = self.executor.run_checked(&spec).await?;
        Ok(Some(output.stdout))
    }

    async fn home_directory(&self, user: &Username) -> HostResult<Option<PathBuf>> {
        Ok(self
            .read_attribute(user, "NFSHomeDirectory")
            .await?
            .and_then(|out| parse_attribute_value(&out, "NFSHomeDirectory"))
            .map(PathBuf::from))
    }

    async fn scrub_attribute(&self, user: &Username, attribute: &str) -> HostResult<()> {
        if self.read_attribute(user, attribute).await?.is_none() {
            return Ok(());
        }
        let record = Self::record_path(user);
        self.executor
            .run_checked(&Self::dscl(&["-delete", record.as_str(), attribute]))
            .await?;
        debug!(user = %user, attribute, "Removed attribute");
        Ok(())
    }

    async fn token_status(&self, user: &Username) -> HostResult<TokenStatus> {
        let spec = CommandSpec::new(SYSADMINCTL)
            .arg("-secureTokenStatus")
            .arg(user.as_str());
        let output = self.executor.run(&spec).await?;
        Ok(parse_token_status(&format!("{}{}", output.stdout, output.stderr)))
    }

    async fn disable_token(&self, user: &Username, admin: &AdminCredential) -> HostResult<()> {
        let spec = Self::with_admin(
            CommandSpec::new(SYSADMINCTL)
                .arg("-secureTokenOff")
                .arg(user.as_str()),
            admin,
        );
        self.executor.run_checked(&spec).await?;
        Ok(())
    }

    async fn delete_record(&self, user: &Username, admin: &AdminCredential) -> HostResult<()> {
        let spec = Self::with_admin(
            CommandSpec::new(SYSADMINCTL)
                .arg("-deleteUser")
                .arg(user.as_str()),
            admin,
        );
        self.executor.run_checked(&spec).await?;
        Ok(())
    }

    async fn delete_record_fallback(&self, user: &Username) -> HostResult<()> {
        let record = Self::record_path(user);
        self.executor
            .run_checked(&Self::dscl(&["-delete", record.as_str()]))
            .await?;
        Ok(())
    }

    async fn list_home_directories(&self, root: &Path) -> HostResult<Vec<Username>> {
        let mut entries = tokio::fs::read_dir(root).await?;
        let mut users = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                users.push(Username::from(entry.file_name().to_string_lossy().into_owned()));
            }
        }
        users.sort();
        Ok(users)
    }

    async fn remove_home(&self, path: &Path) -> HostResult<()> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            debug!(path = %path.display(), "Home directory already absent");
            return Ok(());
        }
        let target = path.display().to_string();

        // Protection flags would make the removal fail part-way; the
        // removal itself reports anything they leave behind
        let unlock = [
            CommandSpec::new("/bin/chmod").args(["-R", "u+w", target.as_str()]),
            CommandSpec::new("/usr/bin/chflags").args(["-R", "nouchg,noschg", target.as_str()]),
        ];
        for spec in unlock {
            if self.run_logged(spec).await.is_err() {
                debug!(path = %target, "Continuing with home removal");
            }
        }

        tokio::fs::remove_dir_all(path).await?;
        info!(path = %target, "Removed home directory");
        Ok(())
    }

    async fn fde_enrolled(&self, user: &Username) -> HostResult<bool> {
        let output = self
            .executor
            .run_checked(&CommandSpec::new(FDESETUP).arg("list"))
            .await?;
        Ok(fde_list_contains(&output.stdout, user))
    }

    async fn remove_fde(&self, user: &Username) -> HostResult<()> {
        let spec = CommandSpec::new(FDESETUP)
            .args(["remove", "-user"])
            .arg(user.as_str());
        self.executor.run_checked(&spec).await?;
        Ok(())
    }

    async fn flush_cache(&self) -> HostResult<()> {
        let mut first_error: Option<HostError> = None;

        for spec in [
            CommandSpec::new("/usr/bin/dscacheutil").arg("-flushcache"),
            CommandSpec::new("/usr/bin/killall").args(["-HUP", "opendirectoryd"]),
        ] {
            if let Err(e) = self.run_logged(spec).await {
                first_error.get_or_insert(e);
            }
        }

        let cache_dir = self.local_node.join("cache");
        if tokio::fs::try_exists(&cache_dir).await.unwrap_or(false)
            && let Err(e) = tokio::fs::remove_dir_all(&cache_dir).await
        {
            warn!(path = %cache_dir.display(), error = %e, "Failed to remove directory cache");
            first_error.get_or_insert(e.into());
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
