//! Default paths for sweeper components
//!
//! Managed workstations keep everything under `/Library/Management`:
//! - Record store: `/Library/Management/Cache/UserSessions.json`
//! - Audit log: `/Library/Management/Logs/ManageUsers.log`
//! - Config: `/Library/Management/Config/sweeper.toml`
//! - Lock marker: `/var/run/sweeper.lock`
//!
//! Each can be overridden through an environment variable.

use std::path::PathBuf;

/// Environment variable for overriding the config file path
pub const SWEEPER_CONFIG_ENV: &str = "SWEEPER_CONFIG";

/// Environment variable for overriding the record store path
pub const SWEEPER_STORE_ENV: &str = "SWEEPER_STORE";

/// Environment variable for overriding the audit log path
pub const SWEEPER_LOG_ENV: &str = "SWEEPER_LOG";

/// Environment variable for overriding the lock marker path
pub const SWEEPER_LOCK_ENV: &str = "SWEEPER_LOCK";

const MANAGEMENT_ROOT: &str = "/Library/Management";

fn env_or(var: &str, fallback: impl FnOnce() -> PathBuf) -> PathBuf {
    match std::env::var(var) {
        Ok(path) if !path.is_empty() => PathBuf::from(path),
        _ => fallback(),
    }
}

/// Default configuration file.
pub fn default_config_path() -> PathBuf {
    env_or(SWEEPER_CONFIG_ENV, || {
        PathBuf::from(MANAGEMENT_ROOT).join("Config").join("sweeper.toml")
    })
}

/// Default session record store.
pub fn default_store_path() -> PathBuf {
    env_or(SWEEPER_STORE_ENV, || {
        PathBuf::from(MANAGEMENT_ROOT)
            .join("Cache")
            .join("UserSessions.json")
    })
}

/// Default audit log.
pub fn default_log_path() -> PathBuf {
    env_or(SWEEPER_LOG_ENV, || {
        PathBuf::from(MANAGEMENT_ROOT)
            .join("Logs")
            .join("ManageUsers.log")
    })
}

/// Default single-instance lock marker.
pub fn default_lock_path() -> PathBuf {
    env_or(SWEEPER_LOCK_ENV, || PathBuf::from("/var/run/sweeper.lock"))
}

/// Directory holding local home directories.
pub fn default_home_root() -> PathBuf {
    PathBuf::from("/Users")
}
