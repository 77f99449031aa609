//! Validated configuration structures

use crate::schema::{RawAccounts, RawConfig, RawPaths, RawSessions};
use std::path::PathBuf;
use std::time::Duration;
use sweeper_api::{ExclusionSet, SessionKind};
use sweeper_util::{
    Username, default_home_root, default_lock_path, default_log_path, default_store_path,
};

/// Default bound for one external command
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

/// Validated configuration, immutable for the whole run
#[derive(Debug, Clone)]
pub struct Configuration {
    pub paths: PathsConfig,
    pub accounts: AccountsConfig,
    /// Upper bound for any single external command
    pub command_timeout: Duration,
    pub sessions: SessionsConfig,
}

impl Configuration {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            paths: PathsConfig::from_raw(raw.paths),
            accounts: AccountsConfig::from_raw(raw.accounts),
            command_timeout: raw
                .commands
                .timeout_seconds
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_COMMAND_TIMEOUT),
            sessions: SessionsConfig::from_raw(raw.sessions),
        }
    }

    /// Built-in exclusions plus configured extras, before the store's
    /// custom list and the console user are merged in
    pub fn base_exclusions(&self) -> ExclusionSet {
        ExclusionSet::new(self.accounts.extra_exclusions.iter().cloned())
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            accounts: AccountsConfig::default(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            sessions: SessionsConfig::default(),
        }
    }
}

/// File locations
#[derive(Debug, Clone)]
pub struct PathsConfig {
    pub store_path: PathBuf,
    pub log_path: PathBuf,
    pub lock_path: PathBuf,
    pub home_root: PathBuf,
}

impl PathsConfig {
    fn from_raw(raw: RawPaths) -> Self {
        Self {
            store_path: raw.store_path.unwrap_or_else(default_store_path),
            log_path: raw.log_path.unwrap_or_else(default_log_path),
            lock_path: raw.lock_path.unwrap_or_else(default_lock_path),
            home_root: raw.home_root.unwrap_or_else(default_home_root),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self::from_raw(RawPaths::default())
    }
}

/// Account handling
#[derive(Debug, Clone)]
pub struct AccountsConfig {
    pub extra_exclusions: Vec<Username>,
    pub admin_user: String,
    pub scrub_attributes: Vec<String>,
    pub console_placeholders: Vec<Username>,
}

impl AccountsConfig {
    fn from_raw(raw: RawAccounts) -> Self {
        Self {
            extra_exclusions: raw.extra_exclusions.into_iter().map(Username::from).collect(),
            admin_user: raw.admin_user.unwrap_or_else(|| "Administrator".into()),
            scrub_attributes: raw
                .scrub_attributes
                .unwrap_or_else(default_scrub_attributes),
            console_placeholders: raw
                .console_placeholders
                .unwrap_or_else(default_console_placeholders)
                .into_iter()
                .map(Username::from)
                .collect(),
        }
    }

    /// Whether the console owner is a real interactive user
    pub fn is_real_console_user(&self, user: &Username) -> bool {
        !user.as_str().is_empty() && !self.console_placeholders.contains(user)
    }
}

impl Default for AccountsConfig {
    fn default() -> Self {
        Self::from_raw(RawAccounts::default())
    }
}

/// Session tracking
#[derive(Debug, Clone)]
pub struct SessionsConfig {
    pub session_kind: SessionKind,
    pub exclusions: Vec<Username>,
}

impl SessionsConfig {
    fn from_raw(raw: RawSessions) -> Self {
        Self {
            session_kind: raw
                .session_kind
                .and_then(|k| k.parse().ok())
                .unwrap_or_default(),
            exclusions: raw
                .exclusions
                .unwrap_or_else(default_session_exclusions)
                .into_iter()
                .map(Username::from)
                .collect(),
        }
    }
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self::from_raw(RawSessions::default())
    }
}

fn default_scrub_attributes() -> Vec<String> {
    vec![
        "AltSecurityIdentities".into(),
        "_xcreds_oidc_sub".into(),
        "_xcreds_oidc_username".into(),
        "_xcreds_oidc_fullusername".into(),
    ]
}

fn default_console_placeholders() -> Vec<String> {
    vec!["loginwindow".into(), "root".into(), "admin".into()]
}

fn default_session_exclusions() -> Vec<String> {
    ["admin", "student", "doc", "cts", "fvim", "fmsa"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_sections() {
        let config = Configuration::from_raw(toml::from_str("config_version = 1").unwrap());
        assert_eq!(config.accounts.admin_user, "Administrator");
        assert_eq!(config.command_timeout, DEFAULT_COMMAND_TIMEOUT);
        assert_eq!(config.sessions.session_kind, SessionKind::GuiSsh);
        assert!(config.paths.home_root.is_absolute());
    }

    #[test]
    fn console_placeholders_are_not_real_users() {
        let accounts = AccountsConfig::default();
        assert!(!accounts.is_real_console_user(&Username::from("loginwindow")));
        assert!(!accounts.is_real_console_user(&Username::from("root")));
        assert!(!accounts.is_real_console_user(&Username::from("")));
        assert!(accounts.is_real_console_user(&Username::from("bob")));
    }

    #[test]
    fn base_exclusions_include_extras() {
        let raw: RawConfig = toml::from_str(
            r#"
            config_version = 1
            [accounts]
            extra_exclusions = ["kiosk"]
            "#,
        )
        .unwrap();
        let config = Configuration::from_raw(raw);
        let set = config.base_exclusions();
        assert!(set.contains(&Username::from("kiosk")));
        assert!(set.contains(&Username::from("root")));
    }
}
