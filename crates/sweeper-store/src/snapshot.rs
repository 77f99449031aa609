//! Session record snapshot

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use sweeper_api::{LoginEvent, UserRecord};
use sweeper_util::{EpochSeconds, Username};
use tracing::debug;

use crate::{StoreError, StoreResult};

/// One postponed deletion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeferredEntry {
    #[serde(rename = "Username")]
    pub username: Username,

    #[serde(rename = "QueuedAt")]
    pub queued_at: EpochSeconds,
}

/// Durable per-user timestamps plus the custom exclusion list.
///
/// Key names match the record store file read by other fleet tooling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    #[serde(rename = "LastLogins", default)]
    pub last_logins: BTreeMap<Username, EpochSeconds>,

    #[serde(rename = "CreationDates", default)]
    pub creation_dates: BTreeMap<Username, EpochSeconds>,

    /// Required: a store without it is malformed
    #[serde(rename = "Exclusions")]
    pub exclusions: Vec<Username>,

    #[serde(rename = "DeferredDeletes", default)]
    pub deferred: Vec<DeferredEntry>,
}

impl SessionSnapshot {
    pub fn with_exclusions<I, S>(exclusions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Username>,
    {
        Self {
            exclusions: exclusions.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Merge login events, keeping the latest timestamp per user.
    ///
    /// Events for users `is_known` rejects are ignored. Applying the same
    /// events twice, or in any order, gives the same result.
    pub fn ingest_login_events<'a, I, F>(&mut self, events: I, is_known: F) -> usize
    where
        I: IntoIterator<Item = &'a LoginEvent>,
        F: Fn(&Username) -> bool,
    {
        let mut updated = 0;
        for event in events {
            if event.time < 0 || !is_known(&event.username) {
                continue;
            }
            match self.last_logins.get_mut(&event.username) {
                Some(latest) if *latest >= event.time => {}
                Some(latest) => {
                    *latest = event.time;
                    updated += 1;
                }
                None => {
                    self.last_logins.insert(event.username.clone(), event.time);
                    updated += 1;
                }
            }
        }
        debug!(updated, "Ingested login events");
        updated
    }

    pub fn set_creation_time(&mut self, user: &Username, at: EpochSeconds) {
        self.creation_dates.insert(user.clone(), at);
    }

    /// Every user with at least one known timestamp
    pub fn usernames(&self) -> BTreeSet<Username> {
        self.last_logins
            .keys()
            .chain(self.creation_dates.keys())
            .cloned()
            .collect()
    }

    pub fn record(&self, user: &Username) -> UserRecord {
        UserRecord {
            username: user.clone(),
            last_login: self.last_logins.get(user).copied(),
            creation_time: self.creation_dates.get(user).copied(),
        }
    }

    pub fn records(&self) -> Vec<UserRecord> {
        self.usernames().iter().map(|u| self.record(u)).collect()
    }

    /// Drop timestamps for users the predicate rejects
    pub fn retain_users<F>(&mut self, keep: F)
    where
        F: Fn(&Username) -> bool,
    {
        self.last_logins.retain(|u, _| keep(u));
        self.creation_dates.retain(|u, _| keep(u));
    }

    pub fn remove_user(&mut self, user: &Username) {
        self.last_logins.remove(user);
        self.creation_dates.remove(user);
    }

    /// Reject snapshots no run should act on
    pub fn validate(&self) -> StoreResult<()> {
        let negative = self
            .last_logins
            .iter()
            .chain(self.creation_dates.iter())
            .find(|(_, t)| **t < 0);
        if let Some((user, t)) = negative {
            return Err(StoreError::Invalid(format!(
                "negative timestamp {} for '{}'",
                t, user
            )));
        }
        if let Some(blank) = self.exclusions.iter().find(|u| u.as_str().trim().is_empty()) {
            return Err(StoreError::Invalid(format!(
                "blank exclusion entry '{}'",
                blank
            )));
        }
        Ok(())
    }
}
