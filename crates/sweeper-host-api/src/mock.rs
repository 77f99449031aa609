//! Mock collaborators for unit/integration testing

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use sweeper_api::{LoginEvent, TokenStatus};
use sweeper_util::Username;

use crate::{
    AccountDirectory, AdminCredential, CommandOutput, CommandSpec, DeploymentLocation,
    HostError, HostResult, LoginHistory, ProcessExecutor, SessionHost,
};

fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// One account known to [`MockDirectory`]
#[derive(Debug, Clone)]
pub struct MockAccount {
    pub record: String,
    pub policy_data: Option<String>,
    pub local_xml: Option<String>,
    pub home: Option<PathBuf>,
    pub token: TokenStatus,
    pub fde: bool,
    pub attributes: BTreeSet<String>,
}

impl Default for MockAccount {
    fn default() -> Self {
        Self {
            record: String::new(),
            policy_data: None,
            local_xml: None,
            home: None,
            token: TokenStatus::Disabled,
            fde: false,
            attributes: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Default)]
struct DirectoryState {
    accounts: BTreeMap<Username, MockAccount>,
    homes: BTreeSet<PathBuf>,
    calls: Vec<String>,
    failing: HashSet<String>,
    undeletable: HashSet<Username>,
    primary_delete_ineffective: HashSet<Username>,
}

/// In-memory account directory.
///
/// Every mutating call is recorded as `"<operation> <target>"` so tests can
/// assert on the exact sequence a deletion went through.
#[derive(Debug, Default)]
pub struct MockDirectory {
    state: Mutex<DirectoryState>,
}

impl MockDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an account with a home directory under `/Users`
    pub fn with_user(self, name: &str) -> Self {
        let home = PathBuf::from("/Users").join(name);
        self.with_account(
            name,
            MockAccount {
                home: Some(home),
                ..MockAccount::default()
            },
        )
    }

    pub fn with_account(self, name: &str, account: MockAccount) -> Self {
        {
            let mut state = guard(&self.state);
            if let Some(home) = &account.home {
                state.homes.insert(home.clone());
            }
            state.accounts.insert(Username::from(name), account);
        }
        self
    }

    /// A home directory with no matching record
    pub fn with_orphan_home(self, path: impl Into<PathBuf>) -> Self {
        guard(&self.state).homes.insert(path.into());
        self
    }

    /// Make one operation fail, e.g. `"delete_record"`
    pub fn fail_on(self, operation: &str) -> Self {
        guard(&self.state).failing.insert(operation.to_string());
        self
    }

    /// Deletion calls succeed but the record stays
    pub fn undeletable(self, name: &str) -> Self {
        guard(&self.state).undeletable.insert(Username::from(name));
        self
    }

    /// Primary deletion reports success without removing the record
    pub fn primary_delete_ineffective(self, name: &str) -> Self {
        guard(&self.state)
            .primary_delete_ineffective
            .insert(Username::from(name));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        guard(&self.state).calls.clone()
    }

    /// Recorded calls whose target is `user`
    pub fn calls_for(&self, user: &str) -> Vec<String> {
        let suffix = format!(" {}", user);
        self.calls()
            .into_iter()
            .filter(|c| c.ends_with(&suffix))
            .collect()
    }

    pub fn has_user(&self, name: &str) -> bool {
        guard(&self.state).accounts.contains_key(&Username::from(name))
    }

    pub fn has_home(&self, path: impl AsRef<Path>) -> bool {
        guard(&self.state).homes.contains(path.as_ref())
    }

    pub fn account(&self, name: &str) -> Option<MockAccount> {
        guard(&self.state).accounts.get(&Username::from(name)).cloned()
    }

    fn call(&self, operation: &str, target: impl std::fmt::Display) -> HostResult<()> {
        let mut state = guard(&self.state);
        state.calls.push(format!("{} {}", operation, target));
        if state.failing.contains(operation) {
            return Err(HostError::Internal(format!("mock {} failure", operation)));
        }
        Ok(())
    }
}

#[async_trait]
impl AccountDirectory for MockDirectory {
    async fn list_users(&self) -> HostResult<Vec<Username>> {
        Ok(guard(&self.state).accounts.keys().cloned().collect())
    }

    async fn user_exists(&self, user: &Username) -> HostResult<bool> {
        let state = guard(&self.state);
        if state.failing.contains("user_exists") {
            return Err(HostError::Internal("mock user_exists failure".into()));
        }
        Ok(state.accounts.contains_key(user))
    }

    async fn read_record(&self, user: &Username) -> HostResult<String> {
        guard(&self.state)
            .accounts
            .get(user)
            .map(|a| a.record.clone())
            .ok_or_else(|| HostError::NotFound(user.to_string()))
    }

    async fn account_policy_data(&self, user: &Username) -> HostResult<Option<String>> {
        Ok(guard(&self.state)
            .accounts
            .get(user)
            .and_then(|a| a.policy_data.clone()))
    }

    async fn local_record_xml(&self, user: &Username) -> HostResult<Option<String>> {
        Ok(guard(&self.state)
            .accounts
            .get(user)
            .and_then(|a| a.local_xml.clone()))
    }

    async fn home_directory(&self, user: &Username) -> HostResult<Option<PathBuf>> {
        Ok(guard(&self.state).accounts.get(user).and_then(|a| a.home.clone()))
    }

    async fn scrub_attribute(&self, user: &Username, attribute: &str) -> HostResult<()> {
        self.call("scrub_attribute", user)?;
        if let Some(account) = guard(&self.state).accounts.get_mut(user) {
            account.attributes.remove(attribute);
        }
        Ok(())
    }

    async fn token_status(&self, user: &Username) -> HostResult<TokenStatus> {
        guard(&self.state)
            .accounts
            .get(user)
            .map(|a| a.token)
            .ok_or_else(|| HostError::NotFound(user.to_string()))
    }

    async fn disable_token(&self, user: &Username, _admin: &AdminCredential) -> HostResult<()> {
        self.call("disable_token", user)?;
        if let Some(account) = guard(&self.state).accounts.get_mut(user) {
            account.token = TokenStatus::Disabled;
        }
        Ok(())
    }

    async fn delete_record(&self, user: &Username, _admin: &AdminCredential) -> HostResult<()> {
        self.call("delete_record", user)?;
        let mut state = guard(&self.state);
        if !state.undeletable.contains(user) && !state.primary_delete_ineffective.contains(user) {
            state.accounts.remove(user);
        }
        Ok(())
    }

    async fn delete_record_fallback(&self, user: &Username) -> HostResult<()> {
        self.call("delete_record_fallback", user)?;
        let mut state = guard(&self.state);
        if !state.undeletable.contains(user) {
            state.accounts.remove(user);
        }
        Ok(())
    }

    async fn list_home_directories(&self, root: &Path) -> HostResult<Vec<Username>> {
        Ok(guard(&self.state)
            .homes
            .iter()
            .filter(|p| p.parent() == Some(root))
            .filter_map(|p| p.file_name())
            .map(|n| Username::from(n.to_string_lossy().into_owned()))
            .collect())
    }

    async fn remove_home(&self, path: &Path) -> HostResult<()> {
        self.call("remove_home", path.display())?;
        guard(&self.state).homes.remove(path);
        Ok(())
    }

    async fn fde_enrolled(&self, user: &Username) -> HostResult<bool> {
        Ok(guard(&self.state).accounts.get(user).is_some_and(|a| a.fde))
    }

    async fn remove_fde(&self, user: &Username) -> HostResult<()> {
        self.call("remove_fde", user)?;
        if let Some(account) = guard(&self.state).accounts.get_mut(user) {
            account.fde = false;
        }
        Ok(())
    }

    async fn flush_cache(&self) -> HostResult<()> {
        self.call("flush_cache", "all")
    }
}

#[derive(Debug)]
struct SessionState {
    console_user: Option<Username>,
    location: DeploymentLocation,
    credential: Option<String>,
    terminated: Vec<Username>,
    fail_terminate: bool,
}

/// Scripted session host
#[derive(Debug)]
pub struct MockSessionHost {
    state: Mutex<SessionState>,
}

impl MockSessionHost {
    /// Nobody logged in, default location, credential `"password"`
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SessionState {
                console_user: Some(Username::from("loginwindow")),
                location: DeploymentLocation::default(),
                credential: Some("cGFzc3dvcmQ=".into()),
                terminated: Vec::new(),
                fail_terminate: false,
            }),
        }
    }

    pub fn with_console_user(self, user: Option<&str>) -> Self {
        self.set_console_user(user);
        self
    }

    pub fn with_location(self, area: &str, room: &str) -> Self {
        guard(&self.state).location = DeploymentLocation {
            area: area.into(),
            room: room.into(),
        };
        self
    }

    /// Raw (base64) credential; `None` makes the lookup fail
    pub fn with_credential(self, encoded: Option<&str>) -> Self {
        guard(&self.state).credential = encoded.map(str::to_string);
        self
    }

    pub fn failing_terminate(self) -> Self {
        guard(&self.state).fail_terminate = true;
        self
    }

    pub fn set_console_user(&self, user: Option<&str>) {
        guard(&self.state).console_user = user.map(Username::from);
    }

    pub fn terminated(&self) -> Vec<Username> {
        guard(&self.state).terminated.clone()
    }
}

impl Default for MockSessionHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionHost for MockSessionHost {
    async fn console_user(&self) -> HostResult<Option<Username>> {
        Ok(guard(&self.state).console_user.clone())
    }

    async fn terminate_processes(&self, user: &Username) -> HostResult<()> {
        let mut state = guard(&self.state);
        state.terminated.push(user.clone());
        if state.fail_terminate {
            return Err(HostError::Timeout {
                command: format!("pkill -9 -u {}", user),
                after: Duration::from_secs(1),
            });
        }
        Ok(())
    }

    async fn deployment_location(&self) -> HostResult<DeploymentLocation> {
        Ok(guard(&self.state).location.clone())
    }

    async fn admin_credential(&self) -> HostResult<String> {
        guard(&self.state)
            .credential
            .clone()
            .ok_or_else(|| HostError::NotFound("admin credential".into()))
    }
}

/// Fixed login history
#[derive(Debug, Default)]
pub struct MockLoginHistory {
    events: Vec<LoginEvent>,
}

impl MockLoginHistory {
    pub fn new(events: Vec<LoginEvent>) -> Self {
        Self { events }
    }
}

#[async_trait]
impl LoginHistory for MockLoginHistory {
    async fn login_events(&self) -> HostResult<Vec<LoginEvent>> {
        Ok(self.events.clone())
    }
}

#[derive(Debug, Clone)]
enum Scripted {
    Output(CommandOutput),
    Timeout,
}

/// Executor that answers from a script instead of running anything.
///
/// Responses are matched by command-line prefix, longest match first.
/// Unscripted commands exit with status 127.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    script: Vec<(String, Scripted)>,
    executed: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, prefix: &str, output: CommandOutput) -> Self {
        self.script.push((prefix.to_string(), Scripted::Output(output)));
        self
    }

    pub fn timeout_on(mut self, prefix: &str) -> Self {
        self.script.push((prefix.to_string(), Scripted::Timeout));
        self
    }

    /// Command lines run so far, in order
    pub fn executed(&self) -> Vec<String> {
        guard(&self.executed).clone()
    }
}

#[async_trait]
impl ProcessExecutor for ScriptedExecutor {
    async fn run(&self, command: &CommandSpec) -> HostResult<CommandOutput> {
        let line = command.command_line();
        guard(&self.executed).push(line.clone());

        let matched = self
            .script
            .iter()
            .filter(|(prefix, _)| line.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len());

        match matched {
            Some((_, Scripted::Output(output))) => Ok(output.clone()),
            Some((_, Scripted::Timeout)) => Err(HostError::Timeout {
                command: command.to_string(),
                after: Duration::from_secs(1),
            }),
            None => Ok(CommandOutput::failed(127, format!("unscripted: {}", command))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_directory_deletion() {
        let dir = MockDirectory::new().with_user("bob");
        let admin = AdminCredential::new("Administrator", "pw");
        let bob = Username::from("bob");

        assert!(dir.user_exists(&bob).await.unwrap());
        dir.delete_record(&bob, &admin).await.unwrap();
        assert!(!dir.user_exists(&bob).await.unwrap());
        assert_eq!(dir.calls(), vec!["delete_record bob".to_string()]);
    }

    #[tokio::test]
    async fn mock_directory_failures() {
        let dir = MockDirectory::new()
            .with_user("bob")
            .primary_delete_ineffective("bob")
            .fail_on("remove_fde");
        let admin = AdminCredential::new("Administrator", "pw");
        let bob = Username::from("bob");

        dir.delete_record(&bob, &admin).await.unwrap();
        assert!(dir.has_user("bob"));
        dir.delete_record_fallback(&bob).await.unwrap();
        assert!(!dir.has_user("bob"));
        assert!(dir.remove_fde(&bob).await.is_err());
    }

    #[tokio::test]
    async fn mock_directory_home_listing() {
        let dir = MockDirectory::new()
            .with_user("bob")
            .with_orphan_home("/Users/ghost");
        let mut homes = dir.list_home_directories(Path::new("/Users")).await.unwrap();
        homes.sort();
        assert_eq!(homes, vec![Username::from("bob"), Username::from("ghost")]);
    }

    #[tokio::test]
    async fn scripted_executor_prefers_longest_prefix() {
        let exec = ScriptedExecutor::new()
            .on("dscl .", CommandOutput::ok("generic"))
            .on("dscl . -list /Users", CommandOutput::ok("bob"))
            .timeout_on("pkill");

        let out = exec
            .run(&CommandSpec::new("dscl").args([".", "-list", "/Users"]))
            .await
            .unwrap();
        assert_eq!(out.text(), "bob");

        let err = exec.run(&CommandSpec::new("pkill").args(["-u", "bob"])).await;
        assert!(matches!(err, Err(HostError::Timeout { .. })));

        let out = exec.run(&CommandSpec::new("whoami")).await.unwrap();
        assert_eq!(out.status, Some(127));
        assert_eq!(exec.executed().len(), 3);
    }

    #[tokio::test]
    async fn run_checked_rejects_failure() {
        let exec = ScriptedExecutor::new().on("false", CommandOutput::failed(1, "boom"));
        let err = exec.run_checked(&CommandSpec::new("false")).await;
        assert!(matches!(err, Err(HostError::CommandFailed { status: Some(1), .. })));
    }
}
