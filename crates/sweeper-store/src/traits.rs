//! Store trait definitions

use crate::{SessionSnapshot, StoreResult};

/// Durable home of the session record snapshot
pub trait SnapshotStore: Send + Sync {
    /// Load the snapshot; a missing store is [`crate::StoreError::NotFound`]
    fn load(&self) -> StoreResult<SessionSnapshot>;

    /// Replace the stored snapshot. Readers never observe a partial write.
    fn save(&self, snapshot: &SessionSnapshot) -> StoreResult<()>;

    /// Load, or start from `fallback` when no store exists yet
    fn load_or(&self, fallback: SessionSnapshot) -> StoreResult<SessionSnapshot> {
        match self.load() {
            Ok(snapshot) => Ok(snapshot),
            Err(crate::StoreError::NotFound(_)) => Ok(fallback),
            Err(e) => Err(e),
        }
    }
}
