//! Policy resolution
//!
//! Deployment tags (area, room) and today's date select exactly one
//! deletion policy from an ordered rule table. The first matching rule wins.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::fmt;
use sweeper_api::{DeletionPolicy, DeletionStrategy};
use sweeper_util::{days, weeks};

/// Inputs to policy resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentContext {
    pub area: String,
    pub room: String,
    pub today: NaiveDate,
}

/// Which rule produced the active policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyRule {
    /// Operator forced deletion of every non-excluded account
    Force,
    /// Short-stay areas: two days by creation
    ShortStay,
    /// Studio areas and rooms: thirty days by creation
    Studio,
    /// Term labs outside the end-of-term window: six weeks by login or creation
    TermLab,
    /// Term labs on an end-of-term date: delete everything
    EndOfTerm,
    /// Four weeks by login or creation
    Default,
}

impl fmt::Display for PolicyRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Force => "force mode",
            Self::ShortStay => "2-day creation-based",
            Self::Studio => "30-day creation-based",
            Self::TermLab => "6-week login/creation",
            Self::EndOfTerm => "end-of-term forced deletion",
            Self::Default => "default 4-week login/creation",
        };
        f.write_str(s)
    }
}

/// Active policy plus the rule it came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolvedPolicy {
    pub policy: DeletionPolicy,
    pub rule: PolicyRule,
}

/// Operator adjustments to the resolved policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PolicyOverrides {
    pub custom_days: Option<u32>,
    pub custom_strategy: Option<DeletionStrategy>,
}

impl ResolvedPolicy {
    /// Apply overrides. Forced deletion (force mode or end of term) is
    /// never weakened by them.
    pub fn with_overrides(mut self, overrides: PolicyOverrides) -> Self {
        if self.policy.force_term_deletion {
            return self;
        }
        if let Some(n) = overrides.custom_days {
            self.policy.duration = days(i64::from(n));
        }
        if let Some(strategy) = overrides.custom_strategy {
            self.policy.strategy = strategy;
        }
        self
    }
}

struct LocationRule {
    rule: PolicyRule,
    areas: &'static [&'static str],
    rooms: &'static [&'static str],
}

impl LocationRule {
    fn matches(&self, ctx: &DeploymentContext) -> bool {
        self.areas.iter().any(|a| ctx.area.contains(a))
            || self.rooms.iter().any(|r| ctx.room.contains(r))
    }
}

/// Location rules in priority order
const LOCATION_RULES: &[LocationRule] = &[
    LocationRule {
        rule: PolicyRule::ShortStay,
        areas: &["Library", "DOC", "CommDesign"],
        rooms: &[],
    },
    LocationRule {
        rule: PolicyRule::Studio,
        areas: &["Photo", "Illustration"],
        rooms: &["B1110", "D3360"],
    },
    LocationRule {
        rule: PolicyRule::TermLab,
        areas: &["FMSA", "NMSA"],
        rooms: &["B1122", "B4120"],
    },
];

/// Last days of the academic terms: Apr 30, Aug 31, Dec 31
pub fn is_end_of_term(date: NaiveDate) -> bool {
    matches!(
        (date.month(), date.day()),
        (4, 30..) | (8, 31..) | (12, 31..)
    )
}

/// Resolve the active policy for one run
pub fn resolve_policy(ctx: &DeploymentContext, force: bool) -> ResolvedPolicy {
    if force {
        return ResolvedPolicy {
            policy: DeletionPolicy::forced(0, DeletionStrategy::LoginAndCreation),
            rule: PolicyRule::Force,
        };
    }

    let rule = LOCATION_RULES
        .iter()
        .find(|r| r.matches(ctx))
        .map(|r| r.rule)
        .unwrap_or(PolicyRule::Default);

    let policy = match rule {
        PolicyRule::ShortStay => DeletionPolicy::new(days(2), DeletionStrategy::CreationOnly),
        PolicyRule::Studio => DeletionPolicy::new(days(30), DeletionStrategy::CreationOnly),
        PolicyRule::TermLab if is_end_of_term(ctx.today) => {
            return ResolvedPolicy {
                policy: DeletionPolicy::forced(weeks(4), DeletionStrategy::LoginAndCreation),
                rule: PolicyRule::EndOfTerm,
            };
        }
        PolicyRule::TermLab => DeletionPolicy::new(weeks(6), DeletionStrategy::LoginAndCreation),
        PolicyRule::Force | PolicyRule::EndOfTerm | PolicyRule::Default => {
            DeletionPolicy::new(weeks(4), DeletionStrategy::LoginAndCreation)
        }
    };

    ResolvedPolicy { policy, rule }
}
