//! Session tracking
//!
//! Refreshes the record store from the login history and the directory:
//! latest login per current user, creation timestamps, and the configured
//! exclusion list. The deferral queue in the store is left untouched.

use serde::Serialize;
use std::collections::BTreeSet;
use sweeper_api::SessionKind;
use sweeper_config::Configuration;
use sweeper_host_api::{AccountDirectory, LoginHistory};
use sweeper_store::{SessionSnapshot, SnapshotStore};
use sweeper_util::{InstanceLock, Result, Username};
use tracing::{debug, info, warn};

use crate::creation::resolve_creation_timestamp;
use crate::remediation::gui_users;

/// Outcome of one tracking pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrackSummary {
    pub session_kind: Option<SessionKind>,
    /// Users with a home directory that are tracked
    pub tracked_users: usize,
    /// Login events that raised a user's last login
    pub logins_updated: usize,
    pub creation_resolved: usize,
    pub creation_missing: Vec<Username>,
    /// Users dropped from the store because they no longer exist
    pub dropped_users: Vec<Username>,
}

pub struct SessionTracker<'a> {
    config: &'a Configuration,
    directory: &'a dyn AccountDirectory,
    history: &'a dyn LoginHistory,
    store: &'a dyn SnapshotStore,
}

impl<'a> SessionTracker<'a> {
    pub fn new(
        config: &'a Configuration,
        directory: &'a dyn AccountDirectory,
        history: &'a dyn LoginHistory,
        store: &'a dyn SnapshotStore,
    ) -> Self {
        Self {
            config,
            directory,
            history,
            store,
        }
    }

    /// Users worth tracking: home directory owners minus service accounts
    /// and the configured session exclusions
    async fn current_users(&self) -> Result<BTreeSet<Username>> {
        let homes = self
            .directory
            .list_home_directories(&self.config.paths.home_root)
            .await?;
        Ok(gui_users(homes)
            .into_iter()
            .filter(|u| !u.is_service_account())
            .filter(|u| !self.config.sessions.exclusions.contains(u))
            .collect())
    }

    /// Run one tracking pass under the instance lock
    pub async fn track(&self, kind: Option<SessionKind>) -> Result<TrackSummary> {
        let _lock = InstanceLock::acquire(&self.config.paths.lock_path)?;
        let kind = kind.unwrap_or(self.config.sessions.session_kind);
        info!(session_kind = kind.as_str(), "Starting session tracking");

        let users = self.current_users().await?;
        let events: Vec<_> = self
            .history
            .login_events()
            .await?
            .into_iter()
            .filter(|e| kind.includes(e.terminal))
            .collect();
        debug!(events = events.len(), users = users.len(), "Collected session inputs");

        let fallback = SessionSnapshot::with_exclusions(self.config.sessions.exclusions.clone());
        let mut snapshot = self.store.load_or(fallback)?;

        let mut summary = TrackSummary {
            session_kind: Some(kind),
            tracked_users: users.len(),
            ..TrackSummary::default()
        };

        summary.dropped_users = snapshot
            .usernames()
            .into_iter()
            .filter(|u| !users.contains(u))
            .collect();
        snapshot.retain_users(|u| users.contains(u));

        summary.logins_updated = snapshot.ingest_login_events(&events, |u| users.contains(u));

        for user in &users {
            match resolve_creation_timestamp(self.directory, user).await {
                Some(t) => {
                    snapshot.set_creation_time(user, t);
                    summary.creation_resolved += 1;
                }
                None => {
                    warn!(user = %user, "No creation timestamp found");
                    summary.creation_missing.push(user.clone());
                }
            }
        }

        snapshot.exclusions = self.config.sessions.exclusions.clone();
        self.store.save(&snapshot)?;

        info!(
            tracked = summary.tracked_users,
            logins_updated = summary.logins_updated,
            creation_resolved = summary.creation_resolved,
            dropped = summary.dropped_users.len(),
            "Session tracking complete"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sweeper_api::{LoginEvent, TerminalKind};
    use sweeper_host_api::{MockAccount, MockDirectory, MockLoginHistory};
    use sweeper_store::{DeferredEntry, JsonSnapshotStore, MemorySnapshotStore};

    fn config(dir: &tempfile::TempDir) -> Configuration {
        let mut config = Configuration::default();
        config.paths.lock_path = dir.path().join("sweeper.lock");
        config
    }

    fn login(user: &str, terminal: TerminalKind, time: i64) -> LoginEvent {
        LoginEvent {
            username: Username::from(user),
            terminal,
            time,
        }
    }

    fn account(stamp: &str) -> MockAccount {
        MockAccount {
            record: format!("CreateTimeStamp: {}Z\n", stamp),
            home: None,
            ..MockAccount::default()
        }
    }

    #[tokio::test]
    async fn merges_logins_and_creation_dates() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);
        let directory = MockDirectory::new()
            .with_account("bob", account("20230305121017"))
            .with_orphan_home("/Users/bob")
            .with_user("alice")
            .with_orphan_home("/Users/Shared")
            .with_orphan_home("/Users/student")
            .with_orphan_home("/Users/_mbsetupuser");
        let history = MockLoginHistory::new(vec![
            login("bob", TerminalKind::Gui, 1_000),
            login("bob", TerminalKind::Ssh, 3_000),
            login("bob", TerminalKind::Local, 9_000),
            login("alice", TerminalKind::Gui, 2_000),
            login("student", TerminalKind::Gui, 5_000),
            login("ghost", TerminalKind::Gui, 5_000),
        ]);

        let mut existing = SessionSnapshot::with_exclusions(["old"]);
        existing.last_logins.insert(Username::from("bob"), 2_000);
        existing.last_logins.insert(Username::from("gone"), 10);
        existing.deferred.push(DeferredEntry {
            username: Username::from("alice"),
            queued_at: 42,
        });
        let store = MemorySnapshotStore::with_snapshot(existing);

        let summary = SessionTracker::new(&config, &directory, &history, &store)
            .track(None)
            .await
            .unwrap();

        assert_eq!(summary.tracked_users, 2);
        assert_eq!(summary.creation_resolved, 1);
        assert_eq!(summary.creation_missing, vec![Username::from("alice")]);
        assert_eq!(summary.dropped_users, vec![Username::from("gone")]);

        let saved = store.current().unwrap();
        assert_eq!(saved.last_logins.get(&Username::from("bob")), Some(&3_000));
        assert_eq!(saved.last_logins.get(&Username::from("alice")), Some(&2_000));
        assert!(!saved.last_logins.contains_key(&Username::from("student")));
        assert!(!saved.last_logins.contains_key(&Username::from("gone")));
        assert_eq!(
            saved.creation_dates.get(&Username::from("bob")),
            Some(&1_678_018_217)
        );
        assert_eq!(saved.exclusions, config.sessions.exclusions);
        assert_eq!(saved.deferred.len(), 1);
        assert!(!config.paths.lock_path.exists());
    }

    #[tokio::test]
    async fn gui_kind_ignores_remote_logins() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);
        let directory = MockDirectory::new().with_user("bob");
        let history = MockLoginHistory::new(vec![
            login("bob", TerminalKind::Gui, 1_000),
            login("bob", TerminalKind::Ssh, 3_000),
        ]);
        let store = MemorySnapshotStore::new();

        let summary = SessionTracker::new(&config, &directory, &history, &store)
            .track(Some(SessionKind::Gui))
            .await
            .unwrap();

        assert_eq!(summary.session_kind, Some(SessionKind::Gui));
        let saved = store.current().unwrap();
        assert_eq!(saved.last_logins.get(&Username::from("bob")), Some(&1_000));
    }

    #[tokio::test]
    async fn pre_epoch_creation_time_is_not_stored() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);
        let directory = MockDirectory::new().with_account(
            "bob",
            MockAccount {
                policy_data: Some("<key>creationTime</key><real>-3600.5</real>".into()),
                home: Some("/Users/bob".into()),
                ..MockAccount::default()
            },
        );
        let history = MockLoginHistory::new(vec![login("bob", TerminalKind::Gui, 1_000)]);
        let store = JsonSnapshotStore::new(dir.path().join("UserSessions.json"));

        let summary = SessionTracker::new(&config, &directory, &history, &store)
            .track(None)
            .await
            .unwrap();
        assert_eq!(summary.creation_missing, vec![Username::from("bob")]);

        // The saved store stays loadable for the next run
        let saved = store.load().unwrap();
        assert!(!saved.creation_dates.contains_key(&Username::from("bob")));
        SessionTracker::new(&config, &directory, &history, &store)
            .track(None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn refuses_to_run_while_locked() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);
        let _held = InstanceLock::acquire(&config.paths.lock_path).unwrap();

        let directory = MockDirectory::new().with_user("bob");
        let history = MockLoginHistory::default();
        let store = MemorySnapshotStore::new();

        let result = SessionTracker::new(&config, &directory, &history, &store)
            .track(None)
            .await;
        assert!(matches!(
            result,
            Err(sweeper_util::SweepError::InstanceAlreadyRunning(_))
        ));
        assert_eq!(store.save_count(), 0);
    }
}
