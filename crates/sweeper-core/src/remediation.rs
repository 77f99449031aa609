//! Operator remediation tasks
//!
//! Status checks and repairs run by hand: token status, orphaned records
//! and home directories, user counts and listings, bulk deletion and a
//! cache flush. Results are returned as values; printing is left to the CLI.

use serde::Serialize;
use std::collections::BTreeSet;
use sweeper_api::{DeletionOutcome, ExclusionSet, TokenStatus};
use sweeper_config::Configuration;
use sweeper_host_api::{AccountDirectory, SessionHost};
use sweeper_store::{AuditLog, DeferralQueue};
use sweeper_util::{InstanceLock, Result, Username};
use tracing::{debug, info, warn};

use crate::engine::load_admin_credential;
use crate::orchestrator::{DeletionOrchestrator, RunLedger};

/// Entries under the home root that never belong to an account
pub const NON_ACCOUNT_HOME_ENTRIES: &[&str] = &["Library", "Shared", ".localized", "loginwindow"];

/// Directory records that are not people
const NON_PERSON_RECORDS: &[&str] = &["nobody", "daemon"];

/// Home directory names that belong to accounts
pub fn gui_users(homes: impl IntoIterator<Item = Username>) -> Vec<Username> {
    let mut users: Vec<Username> = homes
        .into_iter()
        .filter(|u| !NON_ACCOUNT_HOME_ENTRIES.contains(&u.as_str()))
        .collect();
    users.sort();
    users.dedup();
    users
}

/// Directory record names that belong to people
pub fn directory_users(records: impl IntoIterator<Item = Username>) -> Vec<Username> {
    let mut users: Vec<Username> = records
        .into_iter()
        .filter(|u| !u.is_service_account() && !NON_PERSON_RECORDS.contains(&u.as_str()))
        .collect();
    users.sort();
    users.dedup();
    users
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrphanKind {
    /// Directory records whose home directory is gone
    DirectoryOrphans,
    /// Home directories without a directory record
    HomeOrphans,
    Both,
}

impl OrphanKind {
    fn includes_records(&self) -> bool {
        matches!(self, Self::DirectoryOrphans | Self::Both)
    }

    fn includes_homes(&self) -> bool {
        matches!(self, Self::HomeOrphans | Self::Both)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrphanReport {
    pub simulate: bool,
    pub orphaned_records: Vec<Username>,
    pub orphaned_homes: Vec<Username>,
    /// Orphans left alone because they are excluded
    pub skipped: Vec<Username>,
    pub failures: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserCounts {
    pub gui: Vec<Username>,
    pub directory: Vec<Username>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ListFilter {
    All,
    Gui,
    Dscl,
    Excluded,
}

/// Where an account shows up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Presence {
    GuiAndDirectory,
    GuiOnly,
    DirectoryOnly,
    Excluded,
}

impl std::fmt::Display for Presence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::GuiAndDirectory => "GUI+DSCL",
            Self::GuiOnly => "GUI only",
            Self::DirectoryOnly => "DSCL only",
            Self::Excluded => "excluded",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserDetails {
    pub uid: Option<u32>,
    pub home_exists: bool,
    pub token: TokenStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserListing {
    pub username: Username,
    pub presence: Presence,
    pub details: Option<UserDetails>,
}

/// Outcome of a bulk deletion
#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkDeletion {
    pub simulate: bool,
    pub outcomes: Vec<DeletionOutcome>,
    pub skipped: Vec<Username>,
}

/// `UniqueID` from a raw directory record dump
pub fn parse_unique_id(record: &str) -> Option<u32> {
    record
        .lines()
        .find_map(|l| l.strip_prefix("UniqueID:"))
        .and_then(|v| v.trim().parse().ok())
}

pub struct Remediation<'a> {
    config: &'a Configuration,
    directory: &'a dyn AccountDirectory,
    session: &'a dyn SessionHost,
}

impl<'a> Remediation<'a> {
    pub fn new(
        config: &'a Configuration,
        directory: &'a dyn AccountDirectory,
        session: &'a dyn SessionHost,
    ) -> Self {
        Self {
            config,
            directory,
            session,
        }
    }

    fn exclusions(&self) -> ExclusionSet {
        self.config.base_exclusions()
    }

    async fn home_users(&self) -> Result<Vec<Username>> {
        let homes = self
            .directory
            .list_home_directories(&self.config.paths.home_root)
            .await?;
        Ok(gui_users(homes))
    }

    async fn record_users(&self) -> Result<Vec<Username>> {
        Ok(directory_users(self.directory.list_users().await?))
    }

    /// Token status for one user or every non-service account
    pub async fn secure_token_report(
        &self,
        user: Option<&Username>,
    ) -> Result<Vec<(Username, TokenStatus)>> {
        let users = match user {
            Some(u) => vec![u.clone()],
            None => self
                .directory
                .list_users()
                .await?
                .into_iter()
                .filter(|u| !u.is_service_account())
                .collect(),
        };

        let mut report = Vec::with_capacity(users.len());
        for user in users {
            let status = match self.directory.token_status(&user).await {
                Ok(status) => status,
                Err(e) => {
                    debug!(user = %user, error = %e, "Token status unavailable");
                    TokenStatus::Unknown
                }
            };
            report.push((user, status));
        }
        Ok(report)
    }

    /// Remove directory records without a home, and homes without a record.
    ///
    /// A live cleanup holds the instance lock so it never overlaps a
    /// deletion run; a simulation only reads.
    pub async fn cleanup_orphans(&self, kind: OrphanKind, simulate: bool) -> Result<OrphanReport> {
        let _lock = if simulate {
            None
        } else {
            Some(InstanceLock::acquire(&self.config.paths.lock_path)?)
        };
        let exclusions = self.exclusions();
        let homes: BTreeSet<Username> = self.home_users().await?.into_iter().collect();
        let records: BTreeSet<Username> = self.record_users().await?.into_iter().collect();
        let mut report = OrphanReport {
            simulate,
            ..OrphanReport::default()
        };

        if kind.includes_records() {
            for user in records.difference(&homes) {
                if exclusions.contains(user) {
                    report.skipped.push(user.clone());
                    continue;
                }
                if simulate {
                    info!(user = %user, "SIMULATION: would delete orphaned record");
                } else if let Err(e) = self.directory.delete_record_fallback(user).await {
                    warn!(user = %user, error = %e, "Failed to delete orphaned record");
                    report.failures.push(e.for_user(user, "delete orphaned record").to_string());
                    continue;
                } else {
                    info!(user = %user, "Deleted orphaned record");
                }
                report.orphaned_records.push(user.clone());
            }
        }

        if kind.includes_homes() {
            for user in homes.difference(&records) {
                if exclusions.contains(user) {
                    report.skipped.push(user.clone());
                    continue;
                }
                let path = self.config.paths.home_root.join(user.as_str());
                if simulate {
                    info!(path = %path.display(), "SIMULATION: would remove orphaned home");
                } else if let Err(e) = self.directory.remove_home(&path).await {
                    warn!(path = %path.display(), error = %e, "Failed to remove orphaned home");
                    report.failures.push(e.for_user(user, "remove orphaned home").to_string());
                    continue;
                } else {
                    info!(path = %path.display(), "Removed orphaned home");
                }
                report.orphaned_homes.push(user.clone());
            }
        }

        if !simulate && !report.orphaned_records.is_empty() {
            self.flush_cache().await?;
        }

        Ok(report)
    }

    pub async fn count(&self) -> Result<UserCounts> {
        Ok(UserCounts {
            gui: self.home_users().await?,
            directory: self.record_users().await?,
        })
    }

    pub async fn list(&self, filter: ListFilter, details: bool) -> Result<Vec<UserListing>> {
        let homes: BTreeSet<Username> = self.home_users().await?.into_iter().collect();
        let records: BTreeSet<Username> = self.record_users().await?.into_iter().collect();

        let entries: Vec<(Username, Presence)> = match filter {
            ListFilter::All => homes
                .union(&records)
                .map(|u| {
                    let presence = match (homes.contains(u), records.contains(u)) {
                        (true, true) => Presence::GuiAndDirectory,
                        (true, false) => Presence::GuiOnly,
                        _ => Presence::DirectoryOnly,
                    };
                    (u.clone(), presence)
                })
                .collect(),
            ListFilter::Gui => homes
                .iter()
                .map(|u| {
                    let presence = if records.contains(u) {
                        Presence::GuiAndDirectory
                    } else {
                        Presence::GuiOnly
                    };
                    (u.clone(), presence)
                })
                .collect(),
            ListFilter::Dscl => records
                .iter()
                .map(|u| {
                    let presence = if homes.contains(u) {
                        Presence::GuiAndDirectory
                    } else {
                        Presence::DirectoryOnly
                    };
                    (u.clone(), presence)
                })
                .collect(),
            ListFilter::Excluded => self
                .exclusions()
                .iter()
                .map(|u| (u.clone(), Presence::Excluded))
                .collect(),
        };

        let mut listing = Vec::with_capacity(entries.len());
        for (username, presence) in entries {
            let details = if details {
                Some(self.details(&username, homes.contains(&username)).await)
            } else {
                None
            };
            listing.push(UserListing {
                username,
                presence,
                details,
            });
        }
        Ok(listing)
    }

    async fn details(&self, user: &Username, home_exists: bool) -> UserDetails {
        let uid = match self.directory.read_record(user).await {
            Ok(record) => parse_unique_id(&record),
            Err(_) => None,
        };
        let token = self
            .directory
            .token_status(user)
            .await
            .unwrap_or(TokenStatus::Unknown);
        UserDetails {
            uid,
            home_exists,
            token,
        }
    }

    /// Delete every non-excluded home directory owner through the regular
    /// deletion sequence. Confirmation is the caller's job.
    pub async fn delete_all(&self, simulate: bool) -> Result<BulkDeletion> {
        let _lock = InstanceLock::acquire(&self.config.paths.lock_path)?;
        let mut audit = AuditLog::open(&self.config.paths.log_path)?;
        audit.info(format!(
            "===== Bulk deletion started ({}) =====",
            if simulate { "simulation" } else { "live" }
        ));

        let result = self.delete_all_locked(simulate, &mut audit).await;
        match &result {
            Ok(bulk) => audit.info(format!(
                "===== Bulk deletion completed: {} processed, {} skipped =====",
                bulk.outcomes.len(),
                bulk.skipped.len()
            )),
            Err(e) => audit.error(e.to_string()),
        }
        result
    }

    async fn delete_all_locked(&self, simulate: bool, audit: &mut AuditLog) -> Result<BulkDeletion> {
        let admin = load_admin_credential(self.config, self.session).await?;

        let mut exclusions = self.exclusions();
        if let Ok(Some(console)) = self.session.console_user().await
            && self.config.accounts.is_real_console_user(&console)
        {
            audit.info(format!("Excluding logged-in console user '{}'.", console));
            exclusions = exclusions.with_user(console);
        }

        let orchestrator = DeletionOrchestrator::new(self.config, self.directory, self.session, &admin)
            .simulate(simulate);
        let mut queue = DeferralQueue::default();
        let mut ledger = RunLedger {
            queue: &mut queue,
            audit,
            now: sweeper_util::now_epoch(),
        };

        let mut bulk = BulkDeletion {
            simulate,
            ..BulkDeletion::default()
        };
        for user in self.home_users().await? {
            if exclusions.contains(&user) {
                bulk.skipped.push(user);
                continue;
            }
            bulk.outcomes.push(orchestrator.process(&user, &mut ledger).await);
        }

        if !simulate && let Err(e) = self.directory.flush_cache().await {
            ledger
                .audit
                .warning(format!("Final directory cache flush failed: {}", e));
        }
        Ok(bulk)
    }

    pub async fn flush_cache(&self) -> Result<()> {
        info!("Flushing directory service cache");
        self.directory.flush_cache().await?;
        Ok(())
    }
}
