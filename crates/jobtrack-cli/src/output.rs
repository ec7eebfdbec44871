//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use serde::Serialize;
use serde_json::Value;

use jobtrack_core::{EntityType, QueueEntry, Row};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Check if output is in quiet mode
    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    /// Print any serializable value as pretty JSON
    pub fn print_json<T: Serialize + ?Sized>(&self, value: &T) {
        match serde_json::to_string_pretty(value) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("Failed to encode output: {}", e),
        }
    }

    /// Print a single row with every field
    pub fn print_row(&self, row: &Row) {
        match self.format {
            OutputFormat::Human => {
                let width = row.keys().map(|k| k.len()).max().unwrap_or(0);
                for (key, value) in row {
                    println!("{:width$}  {}", key, display_value(value), width = width);
                }
            }
            OutputFormat::Json => self.print_json(row),
            OutputFormat::Quiet => {
                println!("{}", row_field(row, "id"));
            }
        }
    }

    /// Print a list of rows, one summary line each
    pub fn print_rows(&self, entity: EntityType, rows: &[Row], count: Option<usize>) {
        match self.format {
            OutputFormat::Human => {
                if rows.is_empty() {
                    println!("No {} found.", entity);
                } else {
                    for row in rows {
                        println!("{}", summary_line(entity, row));
                    }
                }
                match count {
                    Some(count) => println!("\n{} row(s), count {}", rows.len(), count),
                    None if rows.is_empty() => {}
                    None => println!("\n{} row(s)", rows.len()),
                }
            }
            OutputFormat::Json => match count {
                Some(count) => self.print_json(&serde_json::json!({"data": rows, "count": count})),
                None => self.print_json(rows),
            },
            OutputFormat::Quiet => {
                for row in rows {
                    println!("{}", row_field(row, "id"));
                }
            }
        }
    }

    /// Print queued mutations, oldest first
    pub fn print_queue(&self, entries: &[QueueEntry]) {
        match self.format {
            OutputFormat::Human => {
                if entries.is_empty() {
                    println!("No pending operations.");
                    return;
                }
                for entry in entries {
                    let queued_at = chrono::DateTime::from_timestamp_millis(entry.timestamp)
                        .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_else(|| entry.timestamp.to_string());
                    println!(
                        "#{:<5} {}  {:<6} {:<17} {}",
                        entry.seq,
                        queued_at,
                        entry.kind,
                        entry.entity,
                        short_id(&row_field(&entry.payload, "id"))
                    );
                }
                println!("\n{} pending operation(s)", entries.len());
            }
            OutputFormat::Json => self.print_json(entries),
            OutputFormat::Quiet => {
                for entry in entries {
                    println!("{}", entry.seq);
                }
            }
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Check if we should prompt for confirmation
    pub fn should_prompt(&self) -> bool {
        self.format == OutputFormat::Human
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

/// Columns shown in list output, after the id
fn summary_columns(entity: EntityType) -> &'static [&'static str] {
    match entity {
        EntityType::JobApplication => &["title", "company_name", "status", "applied_date"],
        EntityType::Interview => &["interview_date", "interview_type", "status"],
        EntityType::Contact => &["name", "title", "email"],
        EntityType::Company => &["name", "industry", "location"],
    }
}

fn summary_line(entity: EntityType, row: &Row) -> String {
    let mut parts = vec![short_id(&row_field(row, "id"))];
    for column in summary_columns(entity) {
        let value = row_field(row, column);
        if !value.is_empty() {
            parts.push(truncate(&value, 35));
        }
    }
    // The company name may only be present through the attached relation
    if entity == EntityType::JobApplication && row_field(row, "company_name").is_empty() {
        if let Some(name) = row.get("company").and_then(|c| c.get("name")).and_then(Value::as_str) {
            parts.insert(2.min(parts.len()), truncate(name, 35));
        }
    }
    parts.join(" | ")
}

fn row_field(row: &Row, key: &str) -> String {
    match row.get(key) {
        None | Some(Value::Null) => String::new(),
        Some(value) => display_value(value),
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Null => "(none)".to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => format!("[{} item(s)]", items.len()),
        Value::Object(obj) => match obj.get("name").or_else(|| obj.get("title")) {
            Some(Value::String(label)) => label.clone(),
            _ => Value::Object(obj.clone()).to_string(),
        },
        other => other.to_string(),
    }
}

fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}

/// Truncate a string to max length, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
