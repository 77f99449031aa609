//! Configuration validation

use crate::schema::RawConfig;
use std::path::Path;
use sweeper_api::SessionKind;
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Path '{field}' must be absolute: {value}")]
    RelativePath { field: &'static str, value: String },

    #[error("admin_user cannot be empty")]
    EmptyAdminUser,

    #[error("timeout_seconds must be greater than zero")]
    ZeroTimeout,

    #[error("Unknown session kind: {0}")]
    UnknownSessionKind(String),

    #[error("Blank account name in {0}")]
    BlankAccountName(&'static str),
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let paths = [
        ("store_path", config.paths.store_path.as_deref()),
        ("log_path", config.paths.log_path.as_deref()),
        ("lock_path", config.paths.lock_path.as_deref()),
        ("home_root", config.paths.home_root.as_deref()),
    ];
    for (field, value) in paths {
        if let Some(path) = value {
            errors.extend(validate_absolute(field, path));
        }
    }

    if let Some(admin) = &config.accounts.admin_user
        && admin.trim().is_empty()
    {
        errors.push(ValidationError::EmptyAdminUser);
    }

    if config.commands.timeout_seconds == Some(0) {
        errors.push(ValidationError::ZeroTimeout);
    }

    if let Some(kind) = &config.sessions.session_kind
        && kind.parse::<SessionKind>().is_err()
    {
        errors.push(ValidationError::UnknownSessionKind(kind.clone()));
    }

    let name_lists = [
        ("extra_exclusions", Some(&config.accounts.extra_exclusions)),
        ("scrub_attributes", config.accounts.scrub_attributes.as_ref()),
        ("console_placeholders", config.accounts.console_placeholders.as_ref()),
        ("sessions.exclusions", config.sessions.exclusions.as_ref()),
    ];
    for (field, list) in name_lists {
        if list.is_some_and(|names| names.iter().any(|n| n.trim().is_empty())) {
            errors.push(ValidationError::BlankAccountName(field));
        }
    }

    errors
}

fn validate_absolute(field: &'static str, path: &Path) -> Option<ValidationError> {
    if path.is_absolute() {
        None
    } else {
        Some(ValidationError::RelativePath {
            field,
            value: path.display().to_string(),
        })
    }
}
