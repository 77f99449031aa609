//! In-memory store for tests and simulation

use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::{SessionSnapshot, SnapshotStore, StoreError, StoreResult};

/// Snapshot held in memory; counts saves so callers can assert on writes
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshot: Mutex<Option<SessionSnapshot>>,
    saves: AtomicUsize,
}

impl MemorySnapshotStore {
    /// An empty store: `load` reports it as missing
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: SessionSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(Some(snapshot)),
            saves: AtomicUsize::new(0),
        }
    }

    pub fn current(&self) -> Option<SessionSnapshot> {
        self.snapshot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self) -> StoreResult<SessionSnapshot> {
        let snapshot = self.current().ok_or_else(|| StoreError::NotFound(PathBuf::from(":memory:")))?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    fn save(&self, snapshot: &SessionSnapshot) -> StoreResult<()> {
        *self.snapshot.lock().unwrap_or_else(|e| e.into_inner()) = Some(snapshot.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
