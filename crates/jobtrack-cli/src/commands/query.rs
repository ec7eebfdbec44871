//! Read command handlers

use anyhow::{bail, Context, Result};
use clap::Args;
use serde_json::Value;

use jobtrack_core::query::Payload;
use jobtrack_core::{EntityType, Tracker};

use crate::output::Output;

/// Filtering, ordering and pagination for `list`
#[derive(Args, Debug, Default)]
pub struct ListArgs {
    /// Exact match, as column=value (repeatable)
    #[arg(long, value_name = "COLUMN=VALUE")]
    pub eq: Vec<String>,

    /// Case-insensitive pattern with % and _ wildcards, as column=pattern
    #[arg(long, value_name = "COLUMN=PATTERN")]
    pub ilike: Vec<String>,

    /// Lower bound, as column=value
    #[arg(long, value_name = "COLUMN=VALUE")]
    pub gte: Vec<String>,

    /// Upper bound, as column=value
    #[arg(long, value_name = "COLUMN=VALUE")]
    pub lte: Vec<String>,

    /// Column to order by
    #[arg(long)]
    pub order: Option<String>,

    /// Order descending
    #[arg(long, requires = "order")]
    pub desc: bool,

    /// Maximum number of rows
    #[arg(long)]
    pub limit: Option<usize>,

    /// Inclusive row range, as from:to
    #[arg(long, value_name = "FROM:TO")]
    pub range: Option<String>,

    /// Report the number of rows returned
    #[arg(long)]
    pub count: bool,
}

/// List rows of a collection
pub async fn list(
    tracker: &Tracker,
    entity: EntityType,
    args: ListArgs,
    output: &Output,
) -> Result<()> {
    let mut query = tracker.query(entity);

    for arg in &args.eq {
        let (column, value) = split_assignment(arg)?;
        query = query.eq(column, parse_value(value));
    }
    for arg in &args.ilike {
        let (column, pattern) = split_assignment(arg)?;
        query = query.ilike(column, pattern);
    }
    for arg in &args.gte {
        let (column, value) = split_assignment(arg)?;
        query = query.gte(column, parse_value(value));
    }
    for arg in &args.lte {
        let (column, value) = split_assignment(arg)?;
        query = query.lte(column, parse_value(value));
    }
    if let Some(column) = &args.order {
        query = query.order(column, !args.desc);
    }
    if let Some(limit) = args.limit {
        query = query.limit(limit);
    }
    if let Some(range) = &args.range {
        let (from, to) = parse_range(range)?;
        query = query.range(from, to);
    }
    if args.count {
        query = query.count();
    }

    let response = query.execute().await;
    let count = response.count;
    let rows = response
        .into_result()
        .with_context(|| format!("Failed to list {}", entity))?
        .map(Payload::into_rows)
        .unwrap_or_default();

    output.print_rows(entity, &rows, count);
    Ok(())
}

/// Show a single row
pub async fn show(tracker: &Tracker, entity: EntityType, id: String, output: &Output) -> Result<()> {
    let row = tracker
        .get_row(entity, &id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("{} row not found: {}", entity, id))?;

    output.print_row(&row);
    Ok(())
}

fn split_assignment(arg: &str) -> Result<(&str, &str)> {
    match arg.split_once('=') {
        Some((column, value)) if !column.trim().is_empty() => Ok((column.trim(), value)),
        _ => bail!("Expected COLUMN=VALUE, got '{}'", arg),
    }
}

/// Interpret a filter value as JSON when it parses, otherwise as text
///
/// `--eq status=applied` compares against the string "applied" while
/// `--eq archived=true` compares against the boolean.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn parse_range(raw: &str) -> Result<(usize, usize)> {
    let (from, to) = raw
        .split_once(':')
        .with_context(|| format!("Expected FROM:TO, got '{}'", raw))?;
    let from = from
        .trim()
        .parse()
        .with_context(|| format!("Invalid range start: '{}'", from))?;
    let to = to
        .trim()
        .parse()
        .with_context(|| format!("Invalid range end: '{}'", to))?;
    Ok((from, to))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_split_assignment() {
        assert_eq!(split_assignment("status=applied").unwrap(), ("status", "applied"));
        assert_eq!(split_assignment("notes=a=b").unwrap(), ("notes", "a=b"));
        assert_eq!(split_assignment("title=").unwrap(), ("title", ""));
        assert!(split_assignment("status").is_err());
        assert!(split_assignment("=applied").is_err());
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("applied"), json!("applied"));
        assert_eq!(parse_value("42"), json!(42));
        assert_eq!(parse_value("true"), json!(true));
        assert_eq!(parse_value("2024-01-01"), json!("2024-01-01"));
    }

    #[test]
    fn test_parse_range() {
        assert_eq!(parse_range("0:9").unwrap(), (0, 9));
        assert_eq!(parse_range(" 10 : 19 ").unwrap(), (10, 19));
        assert!(parse_range("5").is_err());
        assert!(parse_range("a:b").is_err());
    }
}
