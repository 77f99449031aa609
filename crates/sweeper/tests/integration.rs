//! Integration tests for sweeper
//!
//! Full deletion runs against mock collaborators and a real on-disk record
//! store, plus exit status checks against the built binary.

use std::path::Path;
use std::process::Command;
use sweeper_api::{DeletionState, DeletionStrategy};
use sweeper_config::Configuration;
use sweeper_core::{DeleteOptions, DeletionRun, PolicyRule, RunHost};
use sweeper_host_api::{MockDirectory, MockSessionHost};
use sweeper_store::{DeferredEntry, JsonSnapshotStore, SessionSnapshot, SnapshotStore};
use sweeper_util::{InstanceLock, SweepError, Username, days, now_epoch, weeks};

struct Env {
    dir: tempfile::TempDir,
    config: Configuration,
}

impl Env {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Configuration::default();
        config.paths.store_path = dir.path().join("Cache").join("UserSessions.json");
        config.paths.log_path = dir.path().join("Logs").join("ManageUsers.log");
        config.paths.lock_path = dir.path().join("sweeper.lock");
        Self { dir, config }
    }

    fn store(&self) -> JsonSnapshotStore {
        JsonSnapshotStore::new(&self.config.paths.store_path)
    }

    fn seed(&self, snapshot: &SessionSnapshot) {
        self.store().save(snapshot).unwrap();
    }

    fn log(&self) -> String {
        std::fs::read_to_string(&self.config.paths.log_path).unwrap_or_default()
    }

    async fn run(
        &self,
        directory: &MockDirectory,
        session: &MockSessionHost,
        options: DeleteOptions,
    ) -> Result<sweeper_core::RunSummary, SweepError> {
        let store = self.store();
        let host = RunHost {
            directory,
            session,
            store: &store,
        };
        DeletionRun::new(&self.config, host, options).execute().await
    }
}

/// bob: created 3 days ago; alice: created 10 days ago, never logged in;
/// erin: last login 6 weeks ago
fn lab_snapshot() -> SessionSnapshot {
    let now = now_epoch();
    let mut snapshot = SessionSnapshot::with_exclusions(["admin", "student"]);
    snapshot.set_creation_time(&Username::from("bob"), now - days(3));
    snapshot.last_logins.insert(Username::from("bob"), now - days(1));
    snapshot.set_creation_time(&Username::from("alice"), now - days(10));
    snapshot.set_creation_time(&Username::from("erin"), now - days(20));
    snapshot.last_logins.insert(Username::from("erin"), now - weeks(6));
    snapshot.set_creation_time(&Username::from("student"), now - weeks(52));
    snapshot
}

fn lab_directory() -> MockDirectory {
    MockDirectory::new()
        .with_user("bob")
        .with_user("alice")
        .with_user("erin")
        .with_user("student")
}

#[tokio::test]
async fn default_policy_live_run() {
    let env = Env::new();
    env.seed(&lab_snapshot());
    let directory = lab_directory();
    let session = MockSessionHost::new().with_location("Main Hall", "A100");

    let summary = env
        .run(&directory, &session, DeleteOptions::live())
        .await
        .unwrap();

    assert_eq!(summary.policy.rule, PolicyRule::Default);
    assert_eq!(summary.count(DeletionState::Verified), 1);
    assert_eq!(summary.outcomes[0].username, Username::from("erin"));
    assert!(!directory.has_user("erin"));
    assert!(directory.has_user("bob"));
    assert!(directory.has_user("alice"));
    assert!(directory.has_user("student"));

    let saved = env.store().load().unwrap();
    assert!(!saved.usernames().contains(&Username::from("erin")));
    assert!(saved.usernames().contains(&Username::from("bob")));

    let log = env.log();
    assert!(log.contains("Deletion of 'erin' verified."));
    assert!(!log.contains("[ERROR]"));
    assert!(!env.config.paths.lock_path.exists());
}

#[tokio::test]
async fn short_stay_area_uses_creation_only() {
    let env = Env::new();
    env.seed(&lab_snapshot());
    let directory = lab_directory();
    let session = MockSessionHost::new().with_location("Library Annex", "B1122");

    let summary = env
        .run(&directory, &session, DeleteOptions::live())
        .await
        .unwrap();

    assert_eq!(summary.policy.rule, PolicyRule::ShortStay);
    let mut deleted: Vec<String> = summary
        .users_in(DeletionState::Verified)
        .iter()
        .map(|o| o.username.to_string())
        .collect();
    deleted.sort();
    assert_eq!(deleted, vec!["alice", "bob", "erin"]);
    assert!(directory.has_user("student"));
}

#[tokio::test]
async fn simulation_touches_nothing() {
    let env = Env::new();
    let snapshot = lab_snapshot();
    env.seed(&snapshot);
    let directory = lab_directory();
    let session = MockSessionHost::new();

    let options = DeleteOptions {
        force: true,
        ..DeleteOptions::default()
    };
    let summary = env.run(&directory, &session, options).await.unwrap();

    assert!(summary.simulate);
    assert_eq!(summary.policy.rule, PolicyRule::Force);
    assert_eq!(summary.count(DeletionState::Simulated), 3);
    assert!(directory.calls().is_empty());
    assert_eq!(env.store().load().unwrap(), snapshot);
    assert!(env.log().contains("SIMULATION: would delete 'bob'"));
}

#[tokio::test]
async fn overrides_change_duration_and_strategy() {
    let env = Env::new();
    env.seed(&lab_snapshot());
    let directory = lab_directory();
    let session = MockSessionHost::new();

    let options = DeleteOptions {
        custom_days: Some(5),
        custom_strategy: Some(DeletionStrategy::CreationOnly),
        ..DeleteOptions::live()
    };
    let summary = env.run(&directory, &session, options).await.unwrap();

    assert_eq!(summary.policy.policy.duration, days(5));
    let deleted: Vec<_> = summary
        .users_in(DeletionState::Verified)
        .iter()
        .map(|o| o.username.to_string())
        .collect();
    assert_eq!(deleted, vec!["alice", "erin"]);
}

#[tokio::test]
async fn console_user_is_excluded_and_others_deferred() {
    let env = Env::new();
    env.seed(&lab_snapshot());
    let directory = lab_directory();
    let session = MockSessionHost::new().with_console_user(Some("bob"));

    let options = DeleteOptions {
        force: true,
        ..DeleteOptions::live()
    };
    let summary = env.run(&directory, &session, options).await.unwrap();

    assert!(summary.outcomes.iter().all(|o| o.username != Username::from("bob")));
    assert_eq!(summary.count(DeletionState::Deferred), 2);
    assert_eq!(summary.deferred_pending, 2);
    assert!(directory.has_user("alice"));

    let saved = env.store().load().unwrap();
    let queued: Vec<_> = saved.deferred.iter().map(|e| e.username.to_string()).collect();
    assert_eq!(queued, vec!["alice", "erin"]);
    assert!(env.log().contains("Excluding logged-in console user 'bob'."));

    // Next run with nobody at the console drains the queue first
    session.set_console_user(Some("loginwindow"));
    let summary = env.run(&directory, &session, DeleteOptions::live()).await.unwrap();
    let drained: Vec<_> = summary.outcomes.iter().map(|o| o.username.to_string()).collect();
    assert_eq!(drained, vec!["alice", "erin"]);
    assert!(summary.outcomes.iter().all(|o| o.state == DeletionState::Verified));
    assert!(env.store().load().unwrap().deferred.is_empty());
}

#[tokio::test]
async fn deferred_entry_for_excluded_user_is_cleared() {
    let env = Env::new();
    let mut snapshot = lab_snapshot();
    snapshot.deferred.push(DeferredEntry {
        username: Username::from("student"),
        queued_at: 1,
    });
    env.seed(&snapshot);
    let directory = lab_directory();
    let session = MockSessionHost::new();

    env.run(&directory, &session, DeleteOptions::live())
        .await
        .unwrap();

    assert!(directory.has_user("student"));
    assert!(directory.calls_for("student").is_empty());
    assert!(env.store().load().unwrap().deferred.is_empty());
    assert!(env.log().contains("Clearing deferred deletion for excluded user 'student'."));
}

#[tokio::test]
async fn excluded_deferred_entries_clear_while_console_is_occupied() {
    let env = Env::new();
    let mut snapshot = SessionSnapshot::with_exclusions(["dave"]);
    for user in ["dave", "carol"] {
        snapshot.deferred.push(DeferredEntry {
            username: Username::from(user),
            queued_at: 1,
        });
    }
    env.seed(&snapshot);
    let directory = MockDirectory::new().with_user("dave").with_user("carol");
    let session = MockSessionHost::new().with_console_user(Some("carol"));

    let summary = env
        .run(&directory, &session, DeleteOptions::live())
        .await
        .unwrap();

    assert!(summary.outcomes.is_empty());
    assert!(directory.calls_for("dave").is_empty());
    assert!(directory.calls_for("carol").is_empty());
    assert!(directory.has_user("dave") && directory.has_user("carol"));
    assert!(env.store().load().unwrap().deferred.is_empty());
    let log = env.log();
    assert!(log.contains("Clearing deferred deletion for excluded user 'dave'."));
    assert!(log.contains("Clearing deferred deletion for excluded user 'carol'."));
}

#[tokio::test]
async fn failed_deletion_is_retried_next_run() {
    let env = Env::new();
    env.seed(&lab_snapshot());
    let directory = lab_directory().undeletable("erin");
    let session = MockSessionHost::new();

    let summary = env
        .run(&directory, &session, DeleteOptions::live())
        .await
        .unwrap();

    assert_eq!(summary.count(DeletionState::Failed), 1);
    assert!(env.store().load().unwrap().usernames().contains(&Username::from("erin")));
    assert_eq!(env.log().matches("[ERROR]").count(), 1);
}

#[tokio::test]
async fn missing_store_is_a_configuration_error() {
    let env = Env::new();
    let directory = lab_directory();
    let session = MockSessionHost::new();

    let err = env
        .run(&directory, &session, DeleteOptions::live())
        .await
        .unwrap_err();

    assert_eq!(err.exit_code(), 2);
    assert_eq!(env.log().matches("[ERROR]").count(), 1);
    assert!(directory.calls().is_empty());
    assert!(!env.config.paths.lock_path.exists());
}

#[tokio::test]
async fn store_without_exclusions_is_rejected() {
    let env = Env::new();
    std::fs::create_dir_all(env.config.paths.store_path.parent().unwrap()).unwrap();
    std::fs::write(
        &env.config.paths.store_path,
        r#"{"LastLogins": {"bob": 1}, "CreationDates": {}}"#,
    )
    .unwrap();

    let err = env
        .run(&lab_directory(), &MockSessionHost::new(), DeleteOptions::live())
        .await
        .unwrap_err();
    assert!(matches!(err, SweepError::Configuration(_)));
}

#[tokio::test]
async fn bad_credential_aborts_before_any_deletion() {
    let env = Env::new();
    env.seed(&lab_snapshot());
    let directory = lab_directory();
    let session = MockSessionHost::new().with_credential(Some("%%%"));

    let err = env
        .run(&directory, &session, DeleteOptions::live())
        .await
        .unwrap_err();

    assert_eq!(err.exit_code(), 4);
    assert!(directory.calls().is_empty());
    assert_eq!(env.log().matches("[ERROR]").count(), 1);
}

#[tokio::test]
async fn second_instance_is_refused() {
    let env = Env::new();
    env.seed(&lab_snapshot());
    let _held = InstanceLock::acquire(&env.config.paths.lock_path).unwrap();

    let err = env
        .run(&lab_directory(), &MockSessionHost::new(), DeleteOptions::live())
        .await
        .unwrap_err();

    assert!(matches!(err, SweepError::InstanceAlreadyRunning(_)));
    assert_eq!(err.exit_code(), 3);
    assert!(env.log().contains("already running"));
}

fn write_config(dir: &Path, body: &str) -> std::path::PathBuf {
    let path = dir.join("sweeper.toml");
    std::fs::write(&path, body).unwrap();
    path
}

#[test]
fn binary_exits_3_when_locked() {
    let env = Env::new();
    let config = write_config(
        env.dir.path(),
        &format!(
            "config_version = 1\n[paths]\nstore_path = {:?}\nlog_path = {:?}\nlock_path = {:?}\n",
            env.config.paths.store_path, env.config.paths.log_path, env.config.paths.lock_path
        ),
    );
    let _held = InstanceLock::acquire(&env.config.paths.lock_path).unwrap();

    let status = Command::new(env!("CARGO_BIN_EXE_sweeper"))
        .args(["--config"])
        .arg(&config)
        .args(["delete", "--live"])
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(3));
}

#[test]
fn binary_exits_2_on_invalid_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "config_version = 1\n[commands]\ntimeout_seconds = 0\n");

    let status = Command::new(env!("CARGO_BIN_EXE_sweeper"))
        .arg("--config")
        .arg(&config)
        .arg("delete")
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(2));

    let status = Command::new(env!("CARGO_BIN_EXE_sweeper"))
        .arg("--config")
        .arg(dir.path().join("missing.toml"))
        .arg("delete")
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(2));
}
