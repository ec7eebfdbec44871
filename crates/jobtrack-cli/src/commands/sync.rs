//! Sync command handlers

use anyhow::{bail, Result};

use jobtrack_core::{Config, DrainReport, Tracker};

use crate::editor::confirm;
use crate::output::Output;

/// Refresh the local cache from the remote and push queued writes
pub async fn sync(tracker: &Tracker, output: &Output) -> Result<()> {
    let Some(remote_url) = tracker.config().remote_url.clone() else {
        bail!(
            "Remote not configured. Set it with:\n  \
             jobtrack config set remote_url https://your-project.example.com/rest/v1"
        );
    };

    if !tracker.is_online() {
        bail!("Offline: cannot reach {}", remote_url);
    }

    output.message(&format!("Syncing with {}...", remote_url));

    let Some(report) = tracker.initialize().await else {
        match tracker.status().last_error {
            Some(error) => bail!("Sync failed: {}", error),
            None => bail!("Sync did not run: another sync is in progress"),
        }
    };

    print_report(&report, output);
    if report.failed > 0 {
        bail!("{} queued operation(s) could not be synced", report.failed);
    }
    Ok(())
}

/// Push queued writes before running a command
///
/// Errors are reported and otherwise ignored.
pub async fn sync_quiet(tracker: &Tracker, output: &Output) {
    if !tracker.is_online() {
        return;
    }
    match tracker.pending_operations() {
        Ok(0) => return,
        Ok(_) => {}
        Err(e) => {
            tracing::warn!("Could not read mutation queue: {:#}", e);
            return;
        }
    }

    if let Some(report) = tracker.sync_pending().await {
        if report.failed > 0 && !output.is_quiet() {
            eprintln!(
                "⚠ Auto-sync: {} operation(s) still pending",
                report.failed
            );
        }
    } else if let Some(error) = tracker.status().last_error {
        if !output.is_quiet() {
            eprintln!("⚠ Auto-sync failed: {}", error);
        }
    }
}

/// List queued operations
pub fn queue(tracker: &Tracker, output: &Output) -> Result<()> {
    let entries = tracker.queued()?;
    output.print_queue(&entries);
    Ok(())
}

/// Destroy and recreate the local store
pub fn reset(tracker: &Tracker, yes: bool, output: &Output) -> Result<()> {
    let pending = tracker.pending_operations()?;
    if !confirm_reset(Some(pending), yes, output)? {
        return Ok(());
    }

    if !tracker.reset_local_store() {
        bail!("Failed to reset local store");
    }
    output.success("Local store reset");
    Ok(())
}

/// Recreate a local store that failed to open
///
/// The queue cannot be read, so the pending count is unknown.
pub fn reset_unopened(config: &Config, yes: bool, output: &Output) -> Result<()> {
    if !confirm_reset(None, yes, output)? {
        return Ok(());
    }

    Tracker::reset_store_at(config)?;
    output.success("Local store reset");
    Ok(())
}

fn confirm_reset(pending: Option<usize>, yes: bool, output: &Output) -> Result<bool> {
    if yes {
        return Ok(true);
    }
    if !output.should_prompt() {
        bail!("Refusing to reset without --yes");
    }
    println!("This deletes all local data.");
    match pending {
        Some(0) => {}
        Some(pending) => println!("{} unsynced operation(s) will be lost.", pending),
        None => println!("Any unsynced operations will be lost."),
    }
    if !confirm("Are you sure?")? {
        println!("Cancelled.");
        return Ok(false);
    }
    Ok(true)
}

fn print_report(report: &DrainReport, output: &Output) {
    if output.is_json() {
        output.print_json(report);
        return;
    }
    for error in &report.errors {
        output.message(&format!("  {}", error));
    }
    if report.failed == 0 {
        output.success(&format!(
            "Sync complete - {} operation(s) pushed",
            report.applied
        ));
    } else {
        output.message(&format!(
            "Sync finished - {} pushed, {} still pending",
            report.applied, report.failed
        ));
    }
}
