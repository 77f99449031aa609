//! Deferral queue
//!
//! Users whose deletion was postponed because someone was logged in at the
//! console. The queue lives in the snapshot under `DeferredDeletes` and is
//! drained at the start of every run.

use sweeper_util::{EpochSeconds, Username};
use tracing::debug;

use crate::{DeferredEntry, SessionSnapshot};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeferralQueue {
    entries: Vec<DeferredEntry>,
}

impl DeferralQueue {
    /// Take the persisted entries, dropping duplicates (first occurrence wins)
    pub fn from_snapshot(snapshot: &SessionSnapshot) -> Self {
        let mut queue = Self::default();
        for entry in &snapshot.deferred {
            if !queue.contains(&entry.username) {
                queue.entries.push(entry.clone());
            }
        }
        queue
    }

    /// Queue a user. Re-queueing keeps the original timestamp.
    pub fn enqueue(&mut self, user: &Username, now: EpochSeconds) -> bool {
        if self.contains(user) {
            return false;
        }
        debug!(user = %user, "Deferring deletion");
        self.entries.push(DeferredEntry {
            username: user.clone(),
            queued_at: now,
        });
        true
    }

    pub fn remove(&mut self, user: &Username) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| &e.username != user);
        self.entries.len() != before
    }

    pub fn contains(&self, user: &Username) -> bool {
        self.entries.iter().any(|e| &e.username == user)
    }

    /// Queued users in the order they were deferred
    pub fn pending(&self) -> Vec<Username> {
        self.entries.iter().map(|e| e.username.clone()).collect()
    }

    pub fn entries(&self) -> &[DeferredEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the queue back into the snapshot for persistence
    pub fn store_into(&self, snapshot: &mut SessionSnapshot) {
        snapshot.deferred = self.entries.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_is_idempotent() {
        let mut queue = DeferralQueue::default();
        let bob = Username::from("bob");
        assert!(queue.enqueue(&bob, 100));
        assert!(!queue.enqueue(&bob, 200));
        assert_eq!(queue.entries()[0].queued_at, 100);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn remove_reports_membership() {
        let mut snapshot = SessionSnapshot::default();
        snapshot.deferred.push(DeferredEntry {
            username: Username::from("bob"),
            queued_at: 1,
        });
        let mut queue = DeferralQueue::from_snapshot(&snapshot);

        assert!(!queue.remove(&Username::from("carol")));
        assert_eq!(queue.len(), 1);

        assert!(queue.remove(&Username::from("bob")));
        assert!(queue.is_empty());
        queue.store_into(&mut snapshot);
        assert!(snapshot.deferred.is_empty());
    }

    #[test]
    fn duplicates_collapse_on_load() {
        let mut snapshot = SessionSnapshot::default();
        for t in [5, 9] {
            snapshot.deferred.push(DeferredEntry {
                username: Username::from("bob"),
                queued_at: t,
            });
        }
        let queue = DeferralQueue::from_snapshot(&snapshot);
        assert_eq!(queue.pending(), vec![Username::from("bob")]);
        assert_eq!(queue.entries()[0].queued_at, 5);
    }
}
