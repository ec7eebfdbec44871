//! Write-path rules for inserts and updates
//!
//! Rows are flattened to foreign-key form, given identifiers and creation
//! times, have their date columns normalized and are attributed to the
//! acting user.

use serde_json::Value;
use uuid::Uuid;

use crate::models::{row_id, EntityType, Row};
use crate::relations::sanitize;
use crate::timestamp;

fn is_unset(row: &Row, key: &str) -> bool {
    match row.get(key) {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        _ => false,
    }
}

/// New time-ordered identifier
pub fn new_id() -> String {
    Uuid::now_v7().to_string()
}

fn normalize_dates(entity: EntityType, row: &mut Row, only: Option<&Row>) {
    for column in entity.date_columns() {
        if let Some(source) = only {
            if !source.contains_key(*column) {
                continue;
            }
        }
        if let Some(normalized) = row.get(*column).and_then(timestamp::normalize) {
            row.insert(column.to_string(), normalized);
        }
    }
}

fn attribute(row: &mut Row, user_id: Option<&str>) {
    if let Some(user) = user_id {
        if is_unset(row, "user_id") {
            row.insert("user_id".to_string(), Value::String(user.to_string()));
        }
    }
}

/// Prepare a row for first storage
pub fn prepare_insert(entity: EntityType, row: &Row, user_id: Option<&str>) -> Row {
    let mut prepared = sanitize(entity, row);

    if row_id(&prepared).is_none() {
        prepared.insert("id".to_string(), Value::String(new_id()));
    }
    if is_unset(&prepared, "created_at") {
        prepared.insert("created_at".to_string(), Value::String(timestamp::now()));
    }
    if entity == EntityType::JobApplication && is_unset(&prepared, "updated_at") {
        if let Some(created) = prepared.get("created_at").cloned() {
            prepared.insert("updated_at".to_string(), created);
        }
    }

    normalize_dates(entity, &mut prepared, None);
    attribute(&mut prepared, user_id);
    prepared
}

/// Merge changes into an existing row
///
/// The identifier of `existing` is kept. Job applications get a fresh
/// `updated_at` that never moves behind the previous value.
pub fn apply_update(entity: EntityType, existing: &Row, changes: &Row, user_id: Option<&str>) -> Row {
    let cleaned = sanitize(entity, changes);
    let mut next = existing.clone();
    for (key, value) in &cleaned {
        next.insert(key.clone(), value.clone());
    }
    if let Some(id) = existing.get("id") {
        next.insert("id".to_string(), id.clone());
    }

    normalize_dates(entity, &mut next, Some(&cleaned));

    if entity == EntityType::JobApplication {
        let now = chrono::Utc::now();
        let refreshed = match existing.get("updated_at") {
            Some(previous)
                if timestamp::epoch_millis(previous)
                    .is_some_and(|prior| prior > now.timestamp_millis() as f64) =>
            {
                timestamp::normalize(previous).unwrap_or_else(|| previous.clone())
            }
            _ => Value::String(timestamp::format(now)),
        };
        next.insert("updated_at".to_string(), refreshed);
    }

    attribute(&mut next, user_id);
    next
}
