//! Write command handlers

use std::io::Read;

use anyhow::{bail, Context, Result};
use serde_json::Value;

use jobtrack_core::relations::sanitize;
use jobtrack_core::{EntityType, Row, Tracker};

use crate::editor::{confirm, edit_row, parse_row};
use crate::output::Output;

/// Create or update a row from a JSON object
///
/// `-` reads the object from stdin.
pub async fn save(tracker: &Tracker, entity: EntityType, json: String, output: &Output) -> Result<()> {
    let text = if json == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read row from stdin")?;
        buffer
    } else {
        json
    };

    let row = parse_row(&text)?;
    let saved = tracker.save_row(entity, row).await?;

    report_saved(tracker, entity, &saved, output);
    Ok(())
}

/// Edit a row as JSON in $EDITOR
pub async fn edit(tracker: &Tracker, entity: EntityType, id: String, output: &Output) -> Result<()> {
    let row = tracker
        .get_row(entity, &id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("{} row not found: {}", entity, id))?;

    let original = sanitize(entity, &row);
    let edited = edit_row(&original)?;

    if edited == original {
        output.message("No changes.");
        return Ok(());
    }
    if edited.get("id") != original.get("id") {
        bail!("The id of a row cannot be changed");
    }

    let saved = tracker.save_row(entity, edited).await?;
    report_saved(tracker, entity, &saved, output);
    Ok(())
}

/// Delete a row
pub async fn delete(
    tracker: &Tracker,
    entity: EntityType,
    id: String,
    yes: bool,
    output: &Output,
) -> Result<()> {
    if output.should_prompt() && !yes {
        println!("Delete {} row: {}", entity, id);
        if !confirm("Are you sure?")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let removed = tracker.delete_row(entity, &id).await?;
    if removed {
        output.success(&format!("Deleted {} row {}", entity, id));
    } else {
        output.message(&format!("No local {} row {}; delete recorded anyway", entity, id));
    }
    if !tracker.is_online() {
        output.message("Offline: queued for sync");
    }
    Ok(())
}

fn report_saved(tracker: &Tracker, entity: EntityType, saved: &Row, output: &Output) {
    let id = saved.get("id").and_then(Value::as_str).unwrap_or_default();
    output.success(&format!("Saved {} row {}", entity, id));
    if !tracker.is_online() {
        output.message("Offline: queued for sync");
    }
    if !output.is_quiet() && !output.is_json() {
        println!();
    }
    output.print_row(saved);
}
