//! Subcommand handlers

use anyhow::{Context, Result, bail};
use std::io::{BufRead, Write};
use std::sync::Arc;
use sweeper_config::{Configuration, load_config_or_default};
use sweeper_core::{DeleteOptions, DeletionRun, Remediation, RunHost, SessionTracker};
use sweeper_host_api::ProcessExecutor;
use sweeper_host_macos::{DsclDirectory, LastLoginHistory, MacSessionHost, TokioExecutor};
use sweeper_store::JsonSnapshotStore;
use sweeper_util::Username;
use tracing::{debug, info};

use crate::cli::{Cli, Command, DeleteArgs, RemediateCommand, SessionsArgs};
use crate::report;

/// Phrase the operator must type before a live bulk deletion
const DELETE_ALL_CONFIRMATION: &str = "DELETE ALL USERS";

/// Real collaborators sharing one executor
struct MacHost {
    directory: DsclDirectory,
    session: MacSessionHost,
    history: LastLoginHistory,
}

impl MacHost {
    fn new(config: &Configuration) -> Self {
        let executor: Arc<dyn ProcessExecutor> = Arc::new(TokioExecutor::new(config.command_timeout));
        Self {
            directory: DsclDirectory::new(executor.clone()),
            session: MacSessionHost::new(executor.clone()),
            history: LastLoginHistory::new(executor),
        }
    }
}

fn load_configuration(cli: &Cli) -> Result<Configuration> {
    let (path, required) = cli.config_path();
    let config = load_config_or_default(&path, required)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    debug!(
        config_path = %path.display(),
        store = %config.paths.store_path.display(),
        log = %config.paths.log_path.display(),
        "Configuration loaded"
    );
    Ok(config)
}

pub async fn dispatch(cli: &Cli) -> Result<()> {
    let config = load_configuration(cli)?;
    let host = MacHost::new(&config);

    match &cli.command {
        Command::Delete(args) => delete(&config, &host, args, cli.json).await,
        Command::Sessions(args) => sessions(config, &host, args, cli.json).await,
        Command::Remediate(cmd) => remediate(&config, &host, cmd, cli.json).await,
    }
}

async fn delete(config: &Configuration, host: &MacHost, args: &DeleteArgs, json: bool) -> Result<()> {
    let options = DeleteOptions {
        simulate: args.simulate(),
        force: args.force,
        custom_days: args.days,
        custom_strategy: args.strategy,
    };
    let store = JsonSnapshotStore::new(&config.paths.store_path);
    let run_host = RunHost {
        directory: &host.directory,
        session: &host.session,
        store: &store,
    };

    let summary = DeletionRun::new(config, run_host, options)
        .execute()
        .await
        .context("Deletion run failed")?;
    report::print_run(&summary, json)
}

async fn sessions(
    mut config: Configuration,
    host: &MacHost,
    args: &SessionsArgs,
    json: bool,
) -> Result<()> {
    if let Some(output) = &args.output {
        config.paths.store_path = output.clone();
    }
    let store = JsonSnapshotStore::new(&config.paths.store_path);

    let summary = SessionTracker::new(&config, &host.directory, &host.history, &store)
        .track(args.session_type)
        .await
        .context("Session tracking failed")?;
    info!(store = %config.paths.store_path.display(), "Record store written");
    report::print_tracking(&summary, &config.paths.store_path, json)
}

async fn remediate(
    config: &Configuration,
    host: &MacHost,
    cmd: &RemediateCommand,
    json: bool,
) -> Result<()> {
    let remediation = Remediation::new(config, &host.directory, &host.session);

    match cmd {
        RemediateCommand::SecureToken { user } => {
            let user = user.as_deref().map(Username::from);
            let rows = remediation.secure_token_report(user.as_ref()).await?;
            report::print_tokens(&rows, json)
        }
        RemediateCommand::CleanupOrphans { kind, simulate } => {
            let result = remediation.cleanup_orphans((*kind).into(), *simulate).await?;
            report::print_orphans(&result, json)
        }
        RemediateCommand::Count { list } => {
            let counts = remediation.count().await?;
            report::print_counts(&counts, *list, json)
        }
        RemediateCommand::List { filter, details } => {
            let listing = remediation.list((*filter).into(), *details).await?;
            report::print_listing(&listing, json)
        }
        RemediateCommand::DeleteAll { simulate, force } => {
            if !*simulate && !*force && !confirm_delete_all()? {
                bail!("Bulk deletion cancelled");
            }
            let bulk = remediation
                .delete_all(*simulate)
                .await
                .context("Bulk deletion failed")?;
            report::print_bulk(&bulk, json)
        }
        RemediateCommand::FlushCache => {
            remediation.flush_cache().await?;
            println!("Directory service cache flushed.");
            Ok(())
        }
    }
}

fn confirm_delete_all() -> Result<bool> {
    print!(
        "This deletes every non-excluded user on this machine.\nType '{}' to continue: ",
        DELETE_ALL_CONFIRMATION
    );
    std::io::stdout().flush()?;

    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(answer.trim() == DELETE_ALL_CONFIRMATION)
}
