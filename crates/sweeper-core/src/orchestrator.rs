//! Deletion state machine
//!
//! Each candidate moves `Candidate -> Deferred | Processing -> Verified | Failed`
//! and reaches a terminal state before the next one is looked at. Every step
//! of the processing sequence is best effort except record deletion: if the
//! record survives, the remaining steps are skipped and the user is retried
//! on the next run.

use std::path::PathBuf;
use sweeper_api::{DeletionOutcome, DeletionState, ExclusionSet, TokenStatus};
use sweeper_config::Configuration;
use sweeper_host_api::{AccountDirectory, AdminCredential, HostResult, SessionHost};
use sweeper_store::{AuditLog, DeferralQueue};
use sweeper_util::{EpochSeconds, SweepError, Username};
use tracing::{debug, info, warn};

/// Drives the per-user deletion sequence
pub struct DeletionOrchestrator<'a> {
    config: &'a Configuration,
    directory: &'a dyn AccountDirectory,
    session: &'a dyn SessionHost,
    admin: &'a AdminCredential,
    simulate: bool,
}

/// Mutable run state the orchestrator writes to
pub struct RunLedger<'a> {
    pub queue: &'a mut DeferralQueue,
    pub audit: &'a mut AuditLog,
    pub now: EpochSeconds,
}

impl<'a> DeletionOrchestrator<'a> {
    pub fn new(
        config: &'a Configuration,
        directory: &'a dyn AccountDirectory,
        session: &'a dyn SessionHost,
        admin: &'a AdminCredential,
    ) -> Self {
        Self {
            config,
            directory,
            session,
            admin,
            simulate: false,
        }
    }

    /// Evaluate and audit only; nothing on the host is changed
    pub fn simulate(mut self, simulate: bool) -> Self {
        self.simulate = simulate;
        self
    }

    pub fn is_simulation(&self) -> bool {
        self.simulate
    }

    /// Real interactive user at the console, if any.
    ///
    /// A console query that fails is reported as `Err` so callers can
    /// treat the session as occupied.
    async fn active_console_user(&self) -> HostResult<Option<Username>> {
        Ok(self
            .session
            .console_user()
            .await?
            .filter(|u| self.config.accounts.is_real_console_user(u)))
    }

    /// Retry postponed deletions.
    ///
    /// Entries for excluded or already removed users are cleared without
    /// any deletion attempt. Clearing excluded entries touches nothing on
    /// the host, so it happens even while someone is at the console; the
    /// rest of the queue then stays as it is.
    pub async fn drain_deferred(
        &self,
        exclusions: &ExclusionSet,
        ledger: &mut RunLedger<'_>,
    ) -> Vec<DeletionOutcome> {
        for user in ledger.queue.pending() {
            if exclusions.contains(&user) {
                ledger.queue.remove(&user);
                ledger
                    .audit
                    .info(format!("Clearing deferred deletion for excluded user '{}'.", user));
            }
        }

        if ledger.queue.is_empty() {
            debug!("No deferred deletions");
            return Vec::new();
        }

        match self.active_console_user().await {
            Ok(None) => {}
            Ok(Some(user)) => {
                ledger.audit.info(format!(
                    "Console user '{}' active; keeping {} deferred deletion(s) queued.",
                    user,
                    ledger.queue.len()
                ));
                return Vec::new();
            }
            Err(e) => {
                ledger.audit.warning(format!(
                    "Could not determine console user ({}); keeping deferred deletions queued.",
                    e
                ));
                return Vec::new();
            }
        }

        let pending = ledger.queue.pending();
        ledger.audit.info(format!(
            "Processing {} deferred deletion(s): {}",
            pending.len(),
            join_names(&pending)
        ));

        let mut outcomes = Vec::new();
        for user in pending {
            match self.directory.user_exists(&user).await {
                Ok(false) => {
                    ledger.queue.remove(&user);
                    ledger.audit.info(format!(
                        "Clearing deferred deletion for '{}' (account no longer exists).",
                        user
                    ));
                    continue;
                }
                Ok(true) => {}
                Err(e) => {
                    ledger.audit.warning(format!(
                        "Could not check whether deferred user '{}' exists: {}",
                        user, e
                    ));
                    continue;
                }
            }

            outcomes.push(self.process(&user, ledger).await);
        }
        outcomes
    }

    /// Take one candidate to a terminal state
    pub async fn process(&self, user: &Username, ledger: &mut RunLedger<'_>) -> DeletionOutcome {
        if self.simulate {
            ledger.audit.info(format!(
                "SIMULATION: would delete '{}' (no changes made)",
                user
            ));
            return DeletionOutcome::new(user.clone(), DeletionState::Simulated);
        }

        match self.active_console_user().await {
            Ok(None) => {}
            Ok(Some(console)) => {
                ledger.queue.enqueue(user, ledger.now);
                ledger.audit.info(format!(
                    "Console user '{}' active; deferring deletion of '{}'.",
                    console, user
                ));
                let mut outcome = DeletionOutcome::new(user.clone(), DeletionState::Deferred);
                outcome.notes.push(format!("console user '{}' active", console));
                return outcome;
            }
            Err(e) => {
                ledger.queue.enqueue(user, ledger.now);
                ledger.audit.warning(format!(
                    "Could not determine console user ({}); deferring deletion of '{}'.",
                    e, user
                ));
                let mut outcome = DeletionOutcome::new(user.clone(), DeletionState::Deferred);
                outcome.notes.push(e.to_string());
                return outcome;
            }
        }

        ledger
            .audit
            .info(format!("Initiating deletion for user '{}'.", user));
        let mut outcome = DeletionOutcome::new(user.clone(), DeletionState::Processing);

        let home = self.home_path(user).await;
        let fde_enrolled = self.directory.fde_enrolled(user).await;

        let result = self.session.terminate_processes(user).await;
        self.best_effort(user, "terminate processes", result, &mut outcome, ledger);

        for attribute in &self.config.accounts.scrub_attributes {
            let result = self.directory.scrub_attribute(user, attribute).await;
            self.best_effort(user, "scrub attributes", result, &mut outcome, ledger);
        }

        let result = self.disable_token(user).await;
        self.best_effort(user, "disable token", result, &mut outcome, ledger);

        if let Err(e) = self.delete_record(user).await {
            ledger.audit.error(e.to_string());
            outcome.notes.push(e.to_string());
            outcome.state = DeletionState::Failed;
            return outcome;
        }

        let result = self.directory.remove_home(&home).await;
        self.best_effort(user, "remove home directory", result, &mut outcome, ledger);

        let result = self.remove_fde(user, fde_enrolled).await;
        self.best_effort(user, "remove disk encryption access", result, &mut outcome, ledger);

        let result = self.directory.flush_cache().await;
        self.best_effort(user, "flush directory cache", result, &mut outcome, ledger);

        match self.directory.user_exists(user).await {
            Ok(false) => {
                ledger.queue.remove(user);
                ledger
                    .audit
                    .info(format!("Deletion of '{}' verified.", user));
                outcome.state = DeletionState::Verified;
            }
            Ok(true) => {
                let e = SweepError::Verification(user.clone());
                ledger.audit.error(e.to_string());
                outcome.notes.push(e.to_string());
                outcome.state = DeletionState::Failed;
            }
            Err(e) => {
                let e = e.for_user(user, "verify deletion");
                ledger.audit.error(e.to_string());
                outcome.notes.push(e.to_string());
                outcome.state = DeletionState::Failed;
            }
        }

        outcome
    }

    /// Home directory as recorded, captured before the record goes away
    async fn home_path(&self, user: &Username) -> PathBuf {
        match self.directory.home_directory(user).await {
            Ok(Some(path)) => path,
            Ok(None) => self.config.paths.home_root.join(user.as_str()),
            Err(e) => {
                debug!(user = %user, error = %e, "Home directory lookup failed, using default");
                self.config.paths.home_root.join(user.as_str())
            }
        }
    }

    async fn disable_token(&self, user: &Username) -> HostResult<()> {
        if self.directory.token_status(user).await? == TokenStatus::Enabled {
            self.directory.disable_token(user, self.admin).await?;
            info!(user = %user, "Disabled secure token");
        }
        Ok(())
    }

    /// Enrollment is looked up before the record is deleted
    async fn remove_fde(&self, user: &Username, enrolled: HostResult<bool>) -> HostResult<()> {
        if enrolled? {
            self.directory.remove_fde(user).await?;
            info!(user = %user, "Removed disk encryption access");
        }
        Ok(())
    }

    /// Existence check, primary delete, fallback delete if the record
    /// survived. Fails only when the record is still there at the end.
    async fn delete_record(&self, user: &Username) -> Result<(), SweepError> {
        const STEP: &str = "delete record";

        if !self
            .directory
            .user_exists(user)
            .await
            .map_err(|e| e.for_user(user, STEP))?
        {
            debug!(user = %user, "Record already absent");
            return Ok(());
        }

        if let Err(e) = self.directory.delete_record(user, self.admin).await {
            warn!(user = %user, error = %e, "Primary record deletion failed");
        }

        if self
            .directory
            .user_exists(user)
            .await
            .map_err(|e| e.for_user(user, STEP))?
        {
            info!(user = %user, "Record survived primary deletion, using fallback");
            self.directory
                .delete_record_fallback(user)
                .await
                .map_err(|e| e.for_user(user, STEP))?;

            if self
                .directory
                .user_exists(user)
                .await
                .map_err(|e| e.for_user(user, STEP))?
            {
                return Err(SweepError::per_user(
                    user,
                    STEP,
                    "record still present after fallback deletion",
                ));
            }
        }
        Ok(())
    }

    fn best_effort(
        &self,
        user: &Username,
        step: &'static str,
        result: HostResult<()>,
        outcome: &mut DeletionOutcome,
        ledger: &mut RunLedger<'_>,
    ) {
        if let Err(e) = result {
            let e = e.for_user(user, step);
            ledger.audit.warning(e.to_string());
            outcome.notes.push(e.to_string());
        }
    }
}

pub(crate) fn join_names(users: &[Username]) -> String {
    users
        .iter()
        .map(Username::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
