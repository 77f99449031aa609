//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    #[serde(default)]
    pub paths: RawPaths,

    #[serde(default)]
    pub accounts: RawAccounts,

    #[serde(default)]
    pub commands: RawCommands,

    #[serde(default)]
    pub sessions: RawSessions,
}

/// File locations
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawPaths {
    /// Session record store (default: /Library/Management/Cache/UserSessions.json)
    pub store_path: Option<PathBuf>,

    /// Audit log (default: /Library/Management/Logs/ManageUsers.log)
    pub log_path: Option<PathBuf>,

    /// Single-instance lock marker (default: /var/run/sweeper.lock)
    pub lock_path: Option<PathBuf>,

    /// Parent of local home directories (default: /Users)
    pub home_root: Option<PathBuf>,
}

/// Account handling
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawAccounts {
    /// Added to the built-in exclusion list
    #[serde(default)]
    pub extra_exclusions: Vec<String>,

    /// Administrator used for privileged directory operations
    pub admin_user: Option<String>,

    /// Identity/cloud attributes removed before the record is deleted
    pub scrub_attributes: Option<Vec<String>>,

    /// Console owners that do not count as an interactive user
    pub console_placeholders: Option<Vec<String>>,
}

/// External command execution
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawCommands {
    /// Upper bound for any single external command, in seconds
    pub timeout_seconds: Option<u64>,
}

/// Session tracking
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawSessions {
    /// "gui", "ssh" or "gui_ssh"
    pub session_kind: Option<String>,

    /// Custom exclusions written into the record store
    pub exclusions: Option<Vec<String>>,
}
