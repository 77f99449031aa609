//! Eligibility evaluation
//!
//! Pure functions: a user record, the exclusion set and the active policy
//! go in, a verdict comes out. No I/O, no clock access.

use serde::Serialize;
use sweeper_api::{DeletionPolicy, DeletionStrategy, ExclusionSet, UserRecord};
use sweeper_util::EpochSeconds;

/// Why a user is or is not eligible for deletion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Member of the exclusion set; never deleted
    Excluded,
    /// Forced deletion is active
    Forced,
    /// Older than the policy duration on a governing axis
    Stale { age_create: i64, age_login: i64 },
    /// Still within the policy duration
    Fresh { age_create: i64, age_login: i64 },
}

impl Verdict {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Self::Forced | Self::Stale { .. })
    }
}

/// Evaluate one user against the active policy.
///
/// A missing creation time counts as `now` and a missing login as `0`, so
/// neither axis makes a user without data look stale.
pub fn evaluate(
    user: &UserRecord,
    policy: &DeletionPolicy,
    exclusions: &ExclusionSet,
    now: EpochSeconds,
) -> Verdict {
    if exclusions.contains(&user.username) {
        return Verdict::Excluded;
    }
    if policy.force_term_deletion {
        return Verdict::Forced;
    }

    let age_create = now - user.creation_time.unwrap_or(now);
    let age_login = user.last_login.map_or(0, |t| now - t);

    let stale = match policy.strategy {
        DeletionStrategy::CreationOnly => age_create > policy.duration,
        DeletionStrategy::LoginAndCreation => {
            age_create > policy.duration || age_login > policy.duration
        }
    };

    if stale {
        Verdict::Stale {
            age_create,
            age_login,
        }
    } else {
        Verdict::Fresh {
            age_create,
            age_login,
        }
    }
}

pub fn is_eligible(
    user: &UserRecord,
    policy: &DeletionPolicy,
    exclusions: &ExclusionSet,
    now: EpochSeconds,
) -> bool {
    evaluate(user, policy, exclusions, now).is_eligible()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sweeper_api::BUILTIN_EXCLUSIONS;
    use sweeper_util::{Username, days, weeks};

    const NOW: EpochSeconds = 1_760_000_000;

    fn policies() -> Vec<DeletionPolicy> {
        vec![
            DeletionPolicy::new(days(2), DeletionStrategy::CreationOnly),
            DeletionPolicy::new(weeks(4), DeletionStrategy::LoginAndCreation),
            DeletionPolicy::new(0, DeletionStrategy::LoginAndCreation),
            DeletionPolicy::forced(0, DeletionStrategy::LoginAndCreation),
        ]
    }

    fn records(name: &str) -> Vec<UserRecord> {
        vec![
            UserRecord::new(name),
            UserRecord::new(name).with_creation_time(0),
            UserRecord::new(name).with_last_login(0),
            UserRecord::new(name)
                .with_creation_time(NOW - weeks(52))
                .with_last_login(NOW - weeks(52)),
        ]
    }

    #[test]
    fn bob_is_stale_by_creation() {
        let bob = UserRecord::new("bob")
            .with_creation_time(NOW - days(3))
            .with_last_login(NOW - days(1));
        let policy = DeletionPolicy::new(days(2), DeletionStrategy::CreationOnly);
        assert!(is_eligible(&bob, &policy, &ExclusionSet::builtin(), NOW));
    }

    #[test]
    fn alice_without_login_is_not_stale() {
        let alice = UserRecord::new("alice").with_creation_time(NOW - days(10));
        let policy = DeletionPolicy::new(days(28), DeletionStrategy::LoginAndCreation);
        let verdict = evaluate(&alice, &policy, &ExclusionSet::builtin(), NOW);
        assert_eq!(
            verdict,
            Verdict::Fresh {
                age_create: days(10),
                age_login: 0
            }
        );
    }

    #[test]
    fn excluded_users_are_never_eligible() {
        let exclusions = ExclusionSet::new(["kiosk"]).with_user(Username::from("carol"));
        let names = BUILTIN_EXCLUSIONS
            .iter()
            .copied()
            .chain(["kiosk", "carol", "_spotlight"]);
        for name in names {
            for record in records(name) {
                for policy in policies() {
                    assert_eq!(
                        evaluate(&record, &policy, &exclusions, NOW),
                        Verdict::Excluded,
                        "{} under {:?}",
                        name,
                        policy
                    );
                }
            }
        }
    }

    #[test]
    fn forced_deletion_takes_every_other_user() {
        let policy = DeletionPolicy::forced(weeks(4), DeletionStrategy::CreationOnly);
        for record in records("dave") {
            assert_eq!(
                evaluate(&record, &policy, &ExclusionSet::builtin(), NOW),
                Verdict::Forced
            );
        }
    }

    #[test]
    fn creation_only_ignores_logins() {
        let policy = DeletionPolicy::new(days(2), DeletionStrategy::CreationOnly);
        let exclusions = ExclusionSet::builtin();

        let young = UserRecord::new("erin")
            .with_creation_time(NOW - days(1))
            .with_last_login(NOW - weeks(10));
        assert!(!is_eligible(&young, &policy, &exclusions, NOW));

        // Exactly at the threshold is not stale
        let boundary = UserRecord::new("erin").with_creation_time(NOW - days(2));
        assert!(!is_eligible(&boundary, &policy, &exclusions, NOW));

        let old = UserRecord::new("erin").with_creation_time(NOW - days(2) - 1);
        assert!(is_eligible(&old, &policy, &exclusions, NOW));
    }

    #[test]
    fn login_and_creation_uses_either_axis() {
        let policy = DeletionPolicy::new(weeks(4), DeletionStrategy::LoginAndCreation);
        let exclusions = ExclusionSet::builtin();

        let stale_login = UserRecord::new("frank")
            .with_creation_time(NOW - days(1))
            .with_last_login(NOW - weeks(5));
        assert!(is_eligible(&stale_login, &policy, &exclusions, NOW));

        let stale_creation = UserRecord::new("frank")
            .with_creation_time(NOW - weeks(5))
            .with_last_login(NOW - days(1));
        assert!(is_eligible(&stale_creation, &policy, &exclusions, NOW));

        let fresh = UserRecord::new("frank")
            .with_creation_time(NOW - weeks(3))
            .with_last_login(NOW - weeks(3));
        assert!(!is_eligible(&fresh, &policy, &exclusions, NOW));
    }

    #[test]
    fn record_without_timestamps_is_fresh() {
        let policy = DeletionPolicy::new(0, DeletionStrategy::LoginAndCreation);
        let verdict = evaluate(&UserRecord::new("gina"), &policy, &ExclusionSet::builtin(), NOW);
        assert_eq!(
            verdict,
            Verdict::Fresh {
                age_create: 0,
                age_login: 0
            }
        );
    }

    #[test]
    fn evaluation_is_deterministic() {
        let exclusions = ExclusionSet::builtin();
        for policy in policies() {
            for record in records("hank") {
                assert_eq!(
                    evaluate(&record, &policy, &exclusions, NOW),
                    evaluate(&record, &policy, &exclusions, NOW)
                );
            }
        }
    }
}
