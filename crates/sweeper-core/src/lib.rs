//! Core policy engine and deletion state machine for sweeper
//!
//! This crate is the heart of sweeper, containing:
//! - Policy resolution (deployment tags and date to one deletion policy)
//! - Eligibility evaluation (pure, per user)
//! - Creation timestamp resolution from directory records
//! - Session tracking into the record store
//! - Deletion state machine (Candidate -> Deferred | Processing -> Verified | Failed)
//! - The run engine and operator remediation tasks

mod creation;
mod eligibility;
mod engine;
mod orchestrator;
mod policy;
mod remediation;
mod tracker;

pub use creation::*;
pub use eligibility::*;
pub use engine::*;
pub use orchestrator::*;
pub use policy::*;
pub use remediation::*;
pub use tracker::*;
