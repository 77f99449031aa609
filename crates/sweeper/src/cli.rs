//! Command-line surface

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use sweeper_api::{DeletionStrategy, SessionKind};
use sweeper_core::{ListFilter, OrphanKind};
use sweeper_util::{SWEEPER_CONFIG_ENV, default_config_path};

/// sweeper - Stale account cleanup for shared-use workstations
#[derive(Parser, Debug)]
#[command(name = "sweeper", version)]
#[command(about = "Removes stale ephemeral user accounts on shared workstations", long_about = None)]
pub struct Cli {
    /// Configuration file path (default: /Library/Management/Config/sweeper.toml)
    #[arg(short, long, global = true, env = SWEEPER_CONFIG_ENV)]
    pub config: Option<PathBuf>,

    /// Log level (overridden by RUST_LOG)
    #[arg(short, long, global = true, default_value = "info")]
    pub log_level: String,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Config path and whether the operator named it
    pub fn config_path(&self) -> (PathBuf, bool) {
        match &self.config {
            Some(path) => (path.clone(), true),
            None => (default_config_path(), false),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Evaluate every known user and delete the stale ones
    Delete(DeleteArgs),

    /// Refresh the session record store from login history
    Sessions(SessionsArgs),

    /// Operator status checks and repairs
    #[command(subcommand)]
    Remediate(RemediateCommand),
}

#[derive(clap::Args, Debug)]
pub struct DeleteArgs {
    /// Only report what would be deleted (the default)
    #[arg(long)]
    pub simulate: bool,

    /// Actually delete users
    #[arg(long)]
    pub live: bool,

    /// Delete every non-excluded user regardless of age
    #[arg(long)]
    pub force: bool,

    /// Replace the policy duration with this many days
    #[arg(long, value_name = "N")]
    pub days: Option<u32>,

    /// Replace the policy strategy (creation-only, login-and-creation)
    #[arg(long)]
    pub strategy: Option<DeletionStrategy>,
}

impl DeleteArgs {
    /// Simulation unless `--live` is given without `--simulate`
    pub fn simulate(&self) -> bool {
        self.simulate || !self.live
    }
}

#[derive(clap::Args, Debug)]
pub struct SessionsArgs {
    /// Record store to write (default: configured store path)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Which logins count (gui, ssh, gui_ssh)
    #[arg(long = "session-type")]
    pub session_type: Option<SessionKind>,
}

#[derive(Subcommand, Debug)]
pub enum RemediateCommand {
    /// Token-unlock status per user
    SecureToken {
        /// Check only this user
        user: Option<String>,
    },

    /// Remove directory records without a home and homes without a record
    CleanupOrphans {
        #[arg(long = "type", value_enum, default_value_t = OrphanArg::Both)]
        kind: OrphanArg,

        #[arg(long)]
        simulate: bool,
    },

    /// Count home directory users and directory users
    Count {
        /// Also list the names
        #[arg(long)]
        list: bool,
    },

    /// List users
    List {
        #[arg(long, value_enum, default_value_t = FilterArg::All)]
        filter: FilterArg,

        /// Include UID, home presence and token status
        #[arg(long)]
        details: bool,
    },

    /// Delete every non-excluded home directory user
    DeleteAll {
        #[arg(long)]
        simulate: bool,

        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// Flush the directory service cache
    FlushCache,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OrphanArg {
    DsclOrphans,
    HomeOrphans,
    Both,
}

impl From<OrphanArg> for OrphanKind {
    fn from(arg: OrphanArg) -> Self {
        match arg {
            OrphanArg::DsclOrphans => OrphanKind::DirectoryOrphans,
            OrphanArg::HomeOrphans => OrphanKind::HomeOrphans,
            OrphanArg::Both => OrphanKind::Both,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum FilterArg {
    All,
    Gui,
    Dscl,
    Excluded,
}

impl From<FilterArg> for ListFilter {
    fn from(arg: FilterArg) -> Self {
        match arg {
            FilterArg::All => ListFilter::All,
            FilterArg::Gui => ListFilter::Gui,
            FilterArg::Dscl => ListFilter::Dscl,
            FilterArg::Excluded => ListFilter::Excluded,
        }
    }
}
