//! JSON file store with atomic replace-on-write

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::{SessionSnapshot, SnapshotStore, StoreError, StoreResult};

/// Snapshot kept in a single JSON file
#[derive(Debug, Clone)]
pub struct JsonSnapshotStore {
    path: PathBuf,
}

impl JsonSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotStore for JsonSnapshotStore {
    fn load(&self) -> StoreResult<SessionSnapshot> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(self.path.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        let snapshot: SessionSnapshot = serde_json::from_str(&content)?;
        snapshot.validate()?;

        debug!(
            path = %self.path.display(),
            users = snapshot.usernames().len(),
            deferred = snapshot.deferred.len(),
            "Loaded record store"
        );
        Ok(snapshot)
    }

    fn save(&self, snapshot: &SessionSnapshot) -> StoreResult<()> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent)?;

        let data = serde_json::to_vec_pretty(snapshot)?;

        let temp = tempfile::NamedTempFile::new_in(parent)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = fs::set_permissions(temp.path(), fs::Permissions::from_mode(0o644)) {
                warn!(path = %temp.path().display(), error = %e, "Failed to set store permissions");
            }
        }

        let mut file = temp.as_file();
        file.write_all(&data)?;
        file.sync_all()?;
        temp.persist(&self.path)?;

        debug!(path = %self.path.display(), bytes = data.len(), "Saved record store");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DeferredEntry;
    use sweeper_util::Username;

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSnapshotStore::new(dir.path().join("UserSessions.json"));
        assert!(matches!(store.load(), Err(StoreError::NotFound(_))));
        assert!(store.load_or(SessionSnapshot::default()).is_ok());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSnapshotStore::new(dir.path().join("cache").join("UserSessions.json"));

        let mut snapshot = SessionSnapshot::with_exclusions(["kiosk"]);
        snapshot.set_creation_time(&Username::from("bob"), 1_700_000_000);
        snapshot.deferred.push(DeferredEntry {
            username: Username::from("carol"),
            queued_at: 1_700_000_100,
        });
        store.save(&snapshot).unwrap();

        assert_eq!(store.load().unwrap(), snapshot);
    }

    #[test]
    fn save_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("UserSessions.json");
        let store = JsonSnapshotStore::new(&path);

        store.save(&SessionSnapshot::default()).unwrap();
        store.save(&SessionSnapshot::with_exclusions(["a"])).unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn malformed_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("UserSessions.json");
        fs::write(&path, "{ not json").unwrap();

        let store = JsonSnapshotStore::new(&path);
        assert!(matches!(store.load(), Err(StoreError::Serialization(_))));
        assert!(store.load_or(SessionSnapshot::default()).is_err());
    }
}
