//! Run engine
//!
//! One invocation of the deletion subcommand:
//! lock -> audit log -> credential -> record store -> exclusions -> policy
//! -> deferred queue -> scan -> final cache flush -> persist -> unlock.
//!
//! Fatal errors end the run with exactly one ERROR audit entry. Per-user
//! failures are recorded in the outcomes and never abort the run.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use sweeper_api::{DeletionOutcome, DeletionState, DeletionStrategy, ExclusionSet};
use sweeper_config::Configuration;
use sweeper_host_api::{AccountDirectory, AdminCredential, SessionHost};
use sweeper_store::{AuditLog, DeferralQueue, SnapshotStore};
use sweeper_util::{InstanceLock, Result, RunId, SweepError, format_age};
use tracing::{debug, info, warn};

use crate::eligibility::{Verdict, evaluate};
use crate::orchestrator::{DeletionOrchestrator, RunLedger, join_names};
use crate::policy::{DeploymentContext, PolicyOverrides, ResolvedPolicy, resolve_policy};

/// Per-invocation options for a deletion run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteOptions {
    pub simulate: bool,
    pub force: bool,
    pub custom_days: Option<u32>,
    pub custom_strategy: Option<DeletionStrategy>,
}

impl Default for DeleteOptions {
    fn default() -> Self {
        Self {
            simulate: true,
            force: false,
            custom_days: None,
            custom_strategy: None,
        }
    }
}

impl DeleteOptions {
    pub fn live() -> Self {
        Self {
            simulate: false,
            ..Self::default()
        }
    }

    fn overrides(&self) -> PolicyOverrides {
        PolicyOverrides {
            custom_days: self.custom_days,
            custom_strategy: self.custom_strategy,
        }
    }
}

/// What one run did
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub simulate: bool,
    pub area: String,
    pub room: String,
    pub policy: ResolvedPolicy,
    /// Users evaluated in the scan
    pub evaluated: usize,
    pub excluded: usize,
    pub outcomes: Vec<DeletionOutcome>,
    /// Users still queued for a later run
    pub deferred_pending: usize,
}

impl RunSummary {
    pub fn count(&self, state: DeletionState) -> usize {
        self.outcomes.iter().filter(|o| o.state == state).count()
    }

    pub fn users_in(&self, state: DeletionState) -> Vec<&DeletionOutcome> {
        self.outcomes.iter().filter(|o| o.state == state).collect()
    }
}

/// Host collaborators a run talks to
#[derive(Clone, Copy)]
pub struct RunHost<'a> {
    pub directory: &'a dyn AccountDirectory,
    pub session: &'a dyn SessionHost,
    pub store: &'a dyn SnapshotStore,
}

/// Decode the provisioned administrator password
pub fn decode_admin_credential(admin_user: &str, encoded: &str) -> Result<AdminCredential> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| SweepError::credential(format!("admin password is not valid base64: {}", e)))?;
    let password = String::from_utf8(bytes)
        .map_err(|_| SweepError::credential("admin password is not valid UTF-8"))?;
    if password.is_empty() {
        return Err(SweepError::credential("admin password is empty"));
    }
    Ok(AdminCredential::new(admin_user, password))
}

/// Read and decode the administrator credential from the session host
pub async fn load_admin_credential(
    config: &Configuration,
    session: &dyn SessionHost,
) -> Result<AdminCredential> {
    let encoded = session
        .admin_credential()
        .await
        .map_err(|e| SweepError::credential(format!("admin password unavailable: {}", e)))?;
    decode_admin_credential(&config.accounts.admin_user, &encoded)
}

/// One deletion run
pub struct DeletionRun<'a> {
    config: &'a Configuration,
    host: RunHost<'a>,
    options: DeleteOptions,
}

impl<'a> DeletionRun<'a> {
    pub fn new(config: &'a Configuration, host: RunHost<'a>, options: DeleteOptions) -> Self {
        Self {
            config,
            host,
            options,
        }
    }

    pub async fn execute(&self) -> Result<RunSummary> {
        let _lock = match InstanceLock::acquire(&self.config.paths.lock_path) {
            Ok(lock) => lock,
            Err(e) => {
                // Another run owns the log; only append
                match AuditLog::open_append(&self.config.paths.log_path) {
                    Ok(mut audit) => audit.error(e.to_string()),
                    Err(io) => warn!(error = %io, "Audit log unavailable"),
                }
                return Err(e);
            }
        };

        let mut audit = AuditLog::open(&self.config.paths.log_path)?;
        let run_id = RunId::new();
        info!(run_id = %run_id, simulate = self.options.simulate, force = self.options.force, "Starting deletion run");

        audit.info("===== User deletion run started =====");
        if self.options.simulate {
            audit.info("SIMULATION MODE: no users will be deleted.");
        } else {
            audit.info("LIVE MODE: eligible users will be deleted.");
        }
        if self.options.force {
            audit.info("FORCE MODE: all time restrictions bypassed.");
        }

        match self.run(&run_id, &mut audit).await {
            Ok(summary) => {
                audit.info(format!(
                    "Run complete: {} deleted, {} failed, {} deferred, {} simulated.",
                    summary.count(DeletionState::Verified),
                    summary.count(DeletionState::Failed),
                    summary.count(DeletionState::Deferred),
                    summary.count(DeletionState::Simulated),
                ));
                audit.info("===== User deletion run completed =====");
                Ok(summary)
            }
            Err(e) => {
                audit.error(e.to_string());
                Err(e)
            }
        }
    }

    async fn run(&self, run_id: &RunId, audit: &mut AuditLog) -> Result<RunSummary> {
        let admin = load_admin_credential(self.config, self.host.session).await?;
        audit.info("Admin credential loaded.");

        let mut snapshot = self.host.store.load()?;
        let exclusions = self.exclusions(&snapshot.exclusions, audit).await;

        let location = self.host.session.deployment_location().await?;
        audit.info(format!(
            "Deployment area: '{}', room: '{}'",
            location.area, location.room
        ));
        let ctx = DeploymentContext {
            area: location.area,
            room: location.room,
            today: sweeper_util::now().date_naive(),
        };
        let policy = resolve_policy(&ctx, self.options.force).with_overrides(self.options.overrides());
        audit.info(format!(
            "Applying {} policy: {} days, {}{}.",
            policy.rule,
            policy.policy.duration / sweeper_util::SECONDS_PER_DAY,
            policy.policy.strategy,
            if policy.policy.force_term_deletion {
                ", forced"
            } else {
                ""
            }
        ));

        let now = sweeper_util::now_epoch();
        let mut queue = DeferralQueue::from_snapshot(&snapshot);
        let orchestrator =
            DeletionOrchestrator::new(self.config, self.host.directory, self.host.session, &admin)
                .simulate(self.options.simulate);

        let mut outcomes;
        let mut evaluated = 0;
        let mut excluded = 0;
        {
            let mut ledger = RunLedger {
                queue: &mut queue,
                audit: &mut *audit,
                now,
            };

            outcomes = orchestrator.drain_deferred(&exclusions, &mut ledger).await;

            for record in snapshot.records() {
                if outcomes.iter().any(|o| o.username == record.username) {
                    continue;
                }
                evaluated += 1;

                match evaluate(&record, &policy.policy, &exclusions, now) {
                    Verdict::Excluded => {
                        excluded += 1;
                        debug!(user = %record.username, "Skipping excluded user");
                        continue;
                    }
                    Verdict::Fresh {
                        age_create,
                        age_login,
                    } => {
                        debug!(
                            user = %record.username,
                            created = %format_age(age_create),
                            last_login = %format_age(age_login),
                            "Within threshold"
                        );
                        continue;
                    }
                    Verdict::Forced => ledger.audit.info(format!(
                        "'{}' eligible: forced deletion.",
                        record.username
                    )),
                    Verdict::Stale {
                        age_create,
                        age_login,
                    } => ledger.audit.info(format!(
                        "'{}' eligible: created {} ago, last login {} ago.",
                        record.username,
                        format_age(age_create),
                        format_age(age_login)
                    )),
                }

                outcomes.push(orchestrator.process(&record.username, &mut ledger).await);
            }
        }

        if !self.options.simulate {
            if let Err(e) = self.host.directory.flush_cache().await {
                audit.warning(format!("Final directory cache flush failed: {}", e));
            }

            for outcome in outcomes.iter().filter(|o| o.state == DeletionState::Verified) {
                snapshot.remove_user(&outcome.username);
            }
            queue.store_into(&mut snapshot);
            self.host.store.save(&snapshot)?;
        }

        if !queue.is_empty() {
            audit.info(format!(
                "Deferred for a later run: {}",
                join_names(&queue.pending())
            ));
        }

        Ok(RunSummary {
            run_id: run_id.to_string(),
            simulate: self.options.simulate,
            area: ctx.area,
            room: ctx.room,
            policy,
            evaluated,
            excluded,
            outcomes,
            deferred_pending: queue.len(),
        })
    }

    /// Built-in, configured and stored exclusions plus the console user
    async fn exclusions(&self, stored: &[sweeper_util::Username], audit: &mut AuditLog) -> ExclusionSet {
        let mut exclusions = ExclusionSet::new(
            self.config
                .accounts
                .extra_exclusions
                .iter()
                .chain(stored)
                .cloned(),
        );

        match self.host.session.console_user().await {
            Ok(Some(user)) if self.config.accounts.is_real_console_user(&user) => {
                audit.info(format!("Excluding logged-in console user '{}'.", user));
                exclusions = exclusions.with_user(user);
            }
            Ok(_) => audit.info("No user is logged in at the console."),
            Err(e) => audit.warning(format!("Could not determine console user: {}", e)),
        }

        audit.info(format!(
            "Exclusion list: {}",
            exclusions.iter().map(|u| u.as_str()).collect::<Vec<_>>().join(", ")
        ));
        exclusions
    }
}
