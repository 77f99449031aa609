//! macOS collaborators for sweeper
//!
//! This crate provides:
//! - A bounded-timeout command executor on tokio processes
//! - The local account directory through `dscl`, `sysadminctl` and `fdesetup`
//! - Console owner, process termination and deployment tags
//! - Login history parsed from `last`

mod directory;
mod executor;
mod history;
mod session;

pub use directory::*;
pub use executor::*;
pub use history::*;
pub use session::*;
