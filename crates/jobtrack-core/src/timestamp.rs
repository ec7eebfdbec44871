//! Timestamp parsing and canonical formatting
//!
//! Every date-like value written to storage is normalized to one canonical
//! form: RFC 3339, UTC, millisecond precision, `Z` suffix.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde_json::Value;

/// Current time as a canonical timestamp string
pub fn now() -> String {
    format(Utc::now())
}

/// Format a timestamp in canonical form (`2024-05-01T09:30:00.000Z`)
pub fn format(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a string that looks like a date or a date-time
///
/// Accepts RFC 3339, `YYYY-MM-DD`, `YYYY-MM-DDTHH:MM:SS[.fff]` and
/// `YYYY-MM-DD HH:MM:SS[.fff]`. Naive values are read as UTC.
pub fn parse(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for pattern in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, pattern) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Epoch milliseconds of a JSON value, if it reads as a point in time
///
/// Numbers are taken as epoch milliseconds.
pub fn epoch_millis(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse(s).map(|dt| dt.timestamp_millis() as f64),
        _ => None,
    }
}

/// Normalize a date-like JSON value to a canonical timestamp string
///
/// Returns `None` when the value does not read as a date; callers keep the
/// original value in that case.
pub fn normalize(value: &Value) -> Option<Value> {
    let at = match value {
        Value::String(s) => parse(s)?,
        Value::Number(n) => Utc.timestamp_millis_opt(n.as_i64()?).single()?,
        _ => return None,
    };
    Some(Value::String(format(at)))
}
