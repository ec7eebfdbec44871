//! Status command handler

use anyhow::Result;

use jobtrack_core::{EntityType, Tracker};

use crate::output::{Output, OutputFormat};

/// Show status information
pub fn show(tracker: &Tracker, output: &Output) -> Result<()> {
    let status = tracker.status();
    let config = tracker.config();
    let pending = tracker.pending_operations()?;

    let mut counts = Vec::with_capacity(EntityType::ALL.len());
    for entity in EntityType::ALL {
        counts.push((entity, tracker.store().count(entity)?));
    }

    match output.format {
        OutputFormat::Json => {
            let counts: serde_json::Map<String, serde_json::Value> = counts
                .iter()
                .map(|(entity, count)| (entity.to_string(), (*count).into()))
                .collect();
            output.print_json(&serde_json::json!({
                "network_status": status.network_status(),
                "is_syncing": status.is_syncing,
                "last_sync_at": status.last_sync_at,
                "pending_operations": pending,
                "last_error": status.last_error,
                "remote_url": config.remote_url,
                "database": config.sqlite_path(),
                "counts": counts
            }));
        }
        OutputFormat::Quiet => {
            println!("{}", status.network_status());
        }
        OutputFormat::Human => {
            println!("jobtrack Status");
            println!("===============");
            println!();
            println!("Sync:");
            println!("  Network: {}", status.network_status());
            println!(
                "  Remote:  {}",
                config.remote_url.as_deref().unwrap_or("(not configured)")
            );
            println!("  Pending: {} operation(s)", pending);
            if let Some(error) = &status.last_error {
                println!("  Error:   {}", error);
            }
            println!();
            println!("Storage:");
            println!("  Location: {}", config.sqlite_path().display());
            println!();
            println!("Contents:");
            for (entity, count) in &counts {
                println!("  {:<17} {}", format!("{}:", entity), count);
            }
        }
    }

    Ok(())
}
