//! Shared types for sweeper

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use sweeper_util::{EpochSeconds, Username};
use thiserror::Error;

/// Accounts that are never deleted, whatever the policy says.
pub const BUILTIN_EXCLUSIONS: &[&str] = &[
    "_mbsetupuser",
    "root",
    "daemon",
    "nobody",
    "sys",
    "guest",
    ".localized",
    "loginwindow",
    "Shared",
    "admin",
    "student",
    "doc",
    "cts",
    "fvim",
    "fmsa",
    "nmsatech",
];

/// Error for string values that do not name a known variant
#[derive(Debug, Clone, Error)]
#[error("Unknown {kind} '{value}'")]
pub struct ParseKindError {
    pub kind: &'static str,
    pub value: String,
}

/// Timestamps known for one account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub username: Username,
    pub last_login: Option<EpochSeconds>,
    pub creation_time: Option<EpochSeconds>,
}

impl UserRecord {
    pub fn new(username: impl Into<Username>) -> Self {
        Self {
            username: username.into(),
            last_login: None,
            creation_time: None,
        }
    }

    pub fn with_last_login(mut self, at: EpochSeconds) -> Self {
        self.last_login = Some(at);
        self
    }

    pub fn with_creation_time(mut self, at: EpochSeconds) -> Self {
        self.creation_time = Some(at);
        self
    }
}

/// Which timestamp axis governs staleness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeletionStrategy {
    /// Stale once the account is older than the policy duration
    CreationOnly,
    /// Stale once either the account or its last login is older than the duration
    LoginAndCreation,
}

impl DeletionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreationOnly => "creation-only",
            Self::LoginAndCreation => "login-and-creation",
        }
    }
}

impl fmt::Display for DeletionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeletionStrategy {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "creation-only" => Ok(Self::CreationOnly),
            "login-and-creation" => Ok(Self::LoginAndCreation),
            _ => Err(ParseKindError {
                kind: "deletion strategy",
                value: s.to_string(),
            }),
        }
    }
}

/// Active deletion policy for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionPolicy {
    /// Staleness threshold in seconds
    pub duration: i64,
    pub strategy: DeletionStrategy,
    /// Delete every non-excluded account regardless of age
    pub force_term_deletion: bool,
}

impl DeletionPolicy {
    pub fn new(duration: i64, strategy: DeletionStrategy) -> Self {
        Self {
            duration,
            strategy,
            force_term_deletion: false,
        }
    }

    pub fn forced(duration: i64, strategy: DeletionStrategy) -> Self {
        Self {
            duration,
            strategy,
            force_term_deletion: true,
        }
    }
}

/// Accounts that must never be deleted during a run.
///
/// Always contains [`BUILTIN_EXCLUSIONS`]; underscore-prefixed service
/// accounts are treated as members too.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExclusionSet {
    names: BTreeSet<Username>,
}

impl ExclusionSet {
    /// Built-in accounts plus the given custom names
    pub fn new<I, S>(custom: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Username>,
    {
        let mut names: BTreeSet<Username> =
            BUILTIN_EXCLUSIONS.iter().map(|n| Username::from(*n)).collect();
        names.extend(custom.into_iter().map(Into::into));
        Self { names }
    }

    pub fn builtin() -> Self {
        Self::new(std::iter::empty::<Username>())
    }

    /// Add one more account (the active console user at run start)
    pub fn with_user(mut self, user: Username) -> Self {
        self.names.insert(user);
        self
    }

    pub fn contains(&self, user: &Username) -> bool {
        user.is_service_account() || self.names.contains(user)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Username> {
        self.names.iter()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for ExclusionSet {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Kind of terminal a login happened on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalKind {
    /// Graphical console login
    Gui,
    /// Remote shell login
    Ssh,
    /// Any other local terminal
    Local,
}

/// Which logins count as activity for session tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    Gui,
    Ssh,
    #[default]
    GuiSsh,
}

impl SessionKind {
    pub fn includes(&self, terminal: TerminalKind) -> bool {
        match self {
            Self::Gui => terminal == TerminalKind::Gui,
            Self::Ssh => terminal == TerminalKind::Ssh,
            Self::GuiSsh => matches!(terminal, TerminalKind::Gui | TerminalKind::Ssh),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gui => "gui",
            Self::Ssh => "ssh",
            Self::GuiSsh => "gui_ssh",
        }
    }
}

impl FromStr for SessionKind {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gui" => Ok(Self::Gui),
            "ssh" => Ok(Self::Ssh),
            "gui_ssh" | "gui-ssh" => Ok(Self::GuiSsh),
            _ => Err(ParseKindError {
                kind: "session kind",
                value: s.to_string(),
            }),
        }
    }
}

/// One login observed in the system session history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginEvent {
    pub username: Username,
    pub terminal: TerminalKind,
    pub time: EpochSeconds,
}

/// Per-user position in the deletion state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionState {
    Candidate,
    /// Postponed because an interactive user is logged in
    Deferred,
    Processing,
    /// Record confirmed gone
    Verified,
    /// Record deletion failed or the record survived
    Failed,
    /// Simulation mode: would have been processed
    Simulated,
}

impl DeletionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Candidate | Self::Processing)
    }
}

/// Where one user's deletion ended up in this run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionOutcome {
    pub username: Username,
    pub state: DeletionState,
    /// Failed steps or the reason for deferral
    pub notes: Vec<String>,
}

impl DeletionOutcome {
    pub fn new(username: Username, state: DeletionState) -> Self {
        Self {
            username,
            state,
            notes: Vec::new(),
        }
    }
}

/// Token-based unlock status of an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TokenStatus {
    Enabled,
    Disabled,
    Unknown,
}

impl fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Enabled => "ENABLED",
            Self::Disabled => "DISABLED",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclusion_set_always_contains_builtins() {
        let set = ExclusionSet::new(["lab-kiosk"]);
        for name in BUILTIN_EXCLUSIONS {
            assert!(set.contains(&Username::from(*name)));
        }
        assert!(set.contains(&Username::from("lab-kiosk")));
        assert!(!set.contains(&Username::from("bob")));
    }

    #[test]
    fn exclusion_set_covers_service_accounts_and_console_user() {
        let set = ExclusionSet::builtin().with_user(Username::from("carol"));
        assert!(set.contains(&Username::from("_spotlight")));
        assert!(set.contains(&Username::from("carol")));
    }

    #[test]
    fn strategy_parsing() {
        assert_eq!(
            "creation-only".parse::<DeletionStrategy>().unwrap(),
            DeletionStrategy::CreationOnly
        );
        assert_eq!(
            "login_and_creation".parse::<DeletionStrategy>().unwrap(),
            DeletionStrategy::LoginAndCreation
        );
        assert!("newest-first".parse::<DeletionStrategy>().is_err());
    }

    #[test]
    fn session_kind_filters_terminals() {
        assert!(SessionKind::Gui.includes(TerminalKind::Gui));
        assert!(!SessionKind::Gui.includes(TerminalKind::Ssh));
        assert!(SessionKind::GuiSsh.includes(TerminalKind::Ssh));
        assert!(!SessionKind::GuiSsh.includes(TerminalKind::Local));
        assert_eq!("gui_ssh".parse::<SessionKind>().unwrap(), SessionKind::GuiSsh);
    }

    #[test]
    fn terminal_states() {
        assert!(DeletionState::Verified.is_terminal());
        assert!(DeletionState::Deferred.is_terminal());
        assert!(!DeletionState::Processing.is_terminal());
    }
}
