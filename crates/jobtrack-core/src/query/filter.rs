//! Row filters
//!
//! Filters are plain data inside a [`Descriptor`](super::Descriptor); a
//! [`Matcher`] compiles them once per query before the scan.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::compare::{compare_values, text_form};
use crate::models::Row;

/// A single column predicate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Filter {
    /// Exact JSON equality
    Eq { column: String, value: Value },
    /// Case-insensitive pattern, `%` for any run and `_` for one character
    Ilike { column: String, pattern: String },
    /// Column value orders at or after `value`
    Gte { column: String, value: Value },
    /// Column value orders at or before `value`
    Lte { column: String, value: Value },
}

impl Filter {
    pub fn column(&self) -> &str {
        match self {
            Filter::Eq { column, .. }
            | Filter::Ilike { column, .. }
            | Filter::Gte { column, .. }
            | Filter::Lte { column, .. } => column,
        }
    }
}

/// Translate an ilike pattern into an anchored, case-insensitive regex
///
/// Every character other than `%` and `_` is matched literally.
pub fn ilike_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut expr = String::with_capacity(pattern.len() + 2);
    expr.push('^');
    for c in pattern.chars() {
        match c {
            '%' => expr.push_str(".*"),
            '_' => expr.push('.'),
            other => {
                let mut buf = [0u8; 4];
                expr.push_str(&regex::escape(other.encode_utf8(&mut buf)));
            }
        }
    }
    expr.push('$');

    RegexBuilder::new(&expr)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
}

enum Compiled<'a> {
    Eq(&'a str, &'a Value),
    Ilike(&'a str, Regex),
    Gte(&'a str, &'a Value),
    Lte(&'a str, &'a Value),
}

/// AND-combination of compiled filters
pub struct Matcher<'a> {
    filters: Vec<Compiled<'a>>,
}

impl<'a> Matcher<'a> {
    pub fn new(filters: &'a [Filter]) -> Result<Self, regex::Error> {
        let filters = filters
            .iter()
            .map(|filter| -> Result<Compiled<'a>, regex::Error> {
                Ok(match filter {
                    Filter::Eq { column, value } => Compiled::Eq(column, value),
                    Filter::Ilike { column, pattern } => {
                        Compiled::Ilike(column, ilike_regex(pattern)?)
                    }
                    Filter::Gte { column, value } => Compiled::Gte(column, value),
                    Filter::Lte { column, value } => Compiled::Lte(column, value),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { filters })
    }

    /// Whether a row passes every filter
    pub fn matches(&self, row: &Row) -> bool {
        self.filters.iter().all(|filter| match filter {
            Compiled::Eq(column, value) => row.get(*column) == Some(*value),
            Compiled::Ilike(column, regex) => match row.get(*column) {
                None | Some(Value::Null) => false,
                value => regex.is_match(&text_form(value)),
            },
            Compiled::Gte(column, value) => compare_values(row.get(*column), Some(*value)).is_ge(),
            Compiled::Lte(column, value) => compare_values(row.get(*column), Some(*value)).is_le(),
        })
    }
}
