//! Value ordering shared by sorting, range filters and relation attachment

use std::borrow::Cow;
use std::cmp::Ordering;

use serde_json::Value;

use crate::timestamp;

/// Compare two row values
///
/// Values that both read as points in time compare by epoch (numbers count
/// as epoch milliseconds, so two numbers compare numerically). Anything
/// else compares lexically by its text form, with a missing or null value
/// reading as the empty string.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let epoch_a = a.and_then(timestamp::epoch_millis);
    let epoch_b = b.and_then(timestamp::epoch_millis);
    if let (Some(x), Some(y)) = (epoch_a, epoch_b) {
        return x.partial_cmp(&y).unwrap_or(Ordering::Equal);
    }

    text_form(a).cmp(&text_form(b))
}

/// Text used for lexical comparison and pattern matching
pub(crate) fn text_form(value: Option<&Value>) -> Cow<'_, str> {
    match value {
        None | Some(Value::Null) => Cow::Borrowed(""),
        Some(Value::String(s)) => Cow::Borrowed(s.as_str()),
        Some(other) => Cow::Owned(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cmp(a: Value, b: Value) -> Ordering {
        compare_values(Some(&a), Some(&b))
    }

    #[test]
    fn test_dates_compare_by_epoch() {
        // Lexically "2024-05-01T09:00:00+02:00" sorts after the Z value
        assert_eq!(
            cmp(json!("2024-05-01T09:00:00+02:00"), json!("2024-05-01T08:00:00Z")),
            Ordering::Less
        );
        assert_eq!(cmp(json!("2024-01-01"), json!("2024-01-01T00:00:00.000Z")), Ordering::Equal);
    }

    #[test]
    fn test_numbers_compare_numerically() {
        assert_eq!(cmp(json!(9), json!(10)), Ordering::Less);
        assert_eq!(cmp(json!(2.5), json!(2.5)), Ordering::Equal);
    }

    #[test]
    fn test_text_compares_lexically() {
        assert_eq!(cmp(json!("apple"), json!("banana")), Ordering::Less);
        assert_eq!(cmp(json!("10"), json!("9")), Ordering::Less);
    }

    #[test]
    fn test_missing_and_null_read_as_empty() {
        assert_eq!(compare_values(None, Some(&json!(null))), Ordering::Equal);
        assert_eq!(compare_values(None, Some(&json!("a"))), Ordering::Less);
        assert_eq!(compare_values(Some(&json!("a")), None), Ordering::Greater);
    }

    #[test]
    fn test_mixed_date_and_text_is_lexical() {
        assert_eq!(cmp(json!("2024-01-01"), json!("pending")), Ordering::Less);
    }
}
