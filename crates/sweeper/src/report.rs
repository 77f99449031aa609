//! Terminal output for command results

use anyhow::Result;
use serde::Serialize;
use std::path::Path;
use sweeper_api::{DeletionState, TokenStatus};
use sweeper_core::{BulkDeletion, OrphanReport, RunSummary, TrackSummary, UserCounts, UserListing};
use sweeper_util::Username;

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn names(users: &[Username]) -> String {
    users
        .iter()
        .map(Username::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn print_run(summary: &RunSummary, json: bool) -> Result<()> {
    if json {
        return print_json(summary);
    }

    let mode = if summary.simulate { "simulation" } else { "live" };
    println!("Run {} ({})", summary.run_id, mode);
    println!("  Area: '{}'  Room: '{}'", summary.area, summary.room);
    println!(
        "  Policy: {} ({} days, {}{})",
        summary.policy.rule,
        summary.policy.policy.duration / sweeper_util::SECONDS_PER_DAY,
        summary.policy.policy.strategy,
        if summary.policy.policy.force_term_deletion {
            ", forced"
        } else {
            ""
        }
    );
    println!(
        "  Evaluated: {}  Excluded: {}",
        summary.evaluated, summary.excluded
    );

    for (label, state) in [
        ("Deleted", DeletionState::Verified),
        ("Would delete", DeletionState::Simulated),
        ("Deferred", DeletionState::Deferred),
        ("Failed", DeletionState::Failed),
    ] {
        let users = summary.users_in(state);
        if users.is_empty() {
            continue;
        }
        println!("  {} ({}):", label, users.len());
        for outcome in users {
            if outcome.notes.is_empty() {
                println!("    - {}", outcome.username);
            } else {
                println!("    - {} ({})", outcome.username, outcome.notes.join("; "));
            }
        }
    }

    if summary.deferred_pending > 0 {
        println!("  Still deferred: {}", summary.deferred_pending);
    }
    Ok(())
}

pub fn print_tracking(summary: &TrackSummary, store: &Path, json: bool) -> Result<()> {
    if json {
        return print_json(summary);
    }
    println!("Session records written to {}", store.display());
    println!("  Tracked users:      {}", summary.tracked_users);
    println!("  Logins updated:     {}", summary.logins_updated);
    println!("  Creation resolved:  {}", summary.creation_resolved);
    if !summary.creation_missing.is_empty() {
        println!("  No creation date:   {}", names(&summary.creation_missing));
    }
    if !summary.dropped_users.is_empty() {
        println!("  Dropped:            {}", names(&summary.dropped_users));
    }
    Ok(())
}

pub fn print_tokens(rows: &[(Username, TokenStatus)], json: bool) -> Result<()> {
    if json {
        return print_json(rows);
    }
    for (user, status) in rows {
        println!("{:<24} {}", user.as_str(), status);
    }
    Ok(())
}

pub fn print_orphans(report: &OrphanReport, json: bool) -> Result<()> {
    if json {
        return print_json(report);
    }
    let verb = if report.simulate { "Would remove" } else { "Removed" };
    println!(
        "{} {} orphaned record(s): {}",
        verb,
        report.orphaned_records.len(),
        names(&report.orphaned_records)
    );
    println!(
        "{} {} orphaned home(s): {}",
        verb,
        report.orphaned_homes.len(),
        names(&report.orphaned_homes)
    );
    if !report.skipped.is_empty() {
        println!("Skipped (excluded): {}", names(&report.skipped));
    }
    for failure in &report.failures {
        println!("Failed: {}", failure);
    }
    Ok(())
}

pub fn print_counts(counts: &UserCounts, list: bool, json: bool) -> Result<()> {
    if json {
        return print_json(counts);
    }
    println!("GUI users (home directories): {}", counts.gui.len());
    println!("Directory users:              {}", counts.directory.len());
    if list {
        println!();
        println!("GUI users:");
        for user in &counts.gui {
            println!("  {}", user);
        }
        println!("Directory users:");
        for user in &counts.directory {
            println!("  {}", user);
        }
    }
    Ok(())
}

pub fn print_listing(listing: &[UserListing], json: bool) -> Result<()> {
    if json {
        return print_json(listing);
    }
    for entry in listing {
        match &entry.details {
            Some(d) => println!(
                "{:<24} {:<10} uid={:<6} home={:<3} token={}",
                entry.username.as_str(),
                entry.presence.to_string(),
                d.uid.map(|u| u.to_string()).unwrap_or_else(|| "-".into()),
                if d.home_exists { "yes" } else { "no" },
                d.token
            ),
            None => println!("{:<24} {}", entry.username.as_str(), entry.presence),
        }
    }
    println!("Total: {}", listing.len());
    Ok(())
}

pub fn print_bulk(bulk: &BulkDeletion, json: bool) -> Result<()> {
    if json {
        return print_json(bulk);
    }
    for outcome in &bulk.outcomes {
        println!("{:<24} {:?}", outcome.username.as_str(), outcome.state);
    }
    println!(
        "Processed {} user(s), skipped {} excluded.",
        bulk.outcomes.len(),
        bulk.skipped.len()
    );
    Ok(())
}
