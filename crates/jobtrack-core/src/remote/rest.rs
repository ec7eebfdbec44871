//! PostgREST-style HTTP backend
//!
//! Descriptors map onto one HTTP request per collection endpoint:
//!
//! | Action  | Method            | Notes                                     |
//! |---------|-------------------|-------------------------------------------|
//! | select  | `GET` / `HEAD`    | `HEAD` when only a count is wanted        |
//! | insert  | `POST`            |                                           |
//! | upsert  | `POST`            | `Prefer: resolution=merge-duplicates`     |
//! | update  | `PATCH`           |                                           |
//! | delete  | `DELETE`          |                                           |
//!
//! Filters become `column=op.value` query parameters.

use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::{header, Method, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{RemoteBackend, RemoteError};
use crate::config::Config;
use crate::models::Row;
use crate::query::{Action, Descriptor, Filter, Payload, QueryError, QueryResponse};
use crate::relations::sanitize;

const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

/// Error body returned by the backend
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    details: Option<String>,
}

/// HTTP client for the hosted backend
pub struct RestBackend {
    base_url: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl RestBackend {
    /// Create a client for `base_url`, the root under which each collection
    /// is served (for example `https://db.example.com/rest/v1`)
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            http,
        })
    }

    /// Client for the configured remote, if there is one
    pub fn from_config(config: &Config) -> Result<Option<Self>, RemoteError> {
        match &config.remote_url {
            Some(url) => Ok(Some(Self::new(
                url,
                config.api_key.clone(),
                config.request_timeout(),
            )?)),
            None => Ok(None),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        let mut request = self.http.request(method, url);
        if let Some(key) = &self.api_key {
            request = request.header("apikey", key).bearer_auth(key);
        }
        request
    }
}

/// HTTP method for a descriptor
pub fn method_for(descriptor: &Descriptor) -> Method {
    match descriptor.action {
        Action::Select if descriptor.head => Method::HEAD,
        Action::Select => Method::GET,
        Action::Insert { .. } | Action::Upsert { .. } => Method::POST,
        Action::Update { .. } => Method::PATCH,
        Action::Delete => Method::DELETE,
    }
}

fn filter_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Query parameters for a descriptor
pub fn query_params(descriptor: &Descriptor) -> Vec<(String, String)> {
    let mut params = Vec::new();

    if matches!(descriptor.action, Action::Select) || descriptor.returning {
        params.push(("select".to_string(), "*".to_string()));
    }

    for filter in &descriptor.filters {
        let value = match filter {
            Filter::Eq { value: Value::Null, .. } => "is.null".to_string(),
            Filter::Eq { value, .. } => format!("eq.{}", filter_value(value)),
            Filter::Ilike { pattern, .. } => format!("ilike.{}", pattern),
            Filter::Gte { value, .. } => format!("gte.{}", filter_value(value)),
            Filter::Lte { value, .. } => format!("lte.{}", filter_value(value)),
        };
        params.push((filter.column().to_string(), value));
    }

    if let Some(order) = &descriptor.order {
        let direction = if order.ascending { "asc" } else { "desc" };
        params.push(("order".to_string(), format!("{}.{}", order.column, direction)));
    }

    let window = descriptor
        .range
        .map(|(from, to)| (from, to.saturating_add(1).saturating_sub(from)));
    let limit = match (window, descriptor.limit) {
        (Some((_, size)), Some(limit)) => Some(size.min(limit)),
        (Some((_, size)), None) => Some(size),
        (None, limit) => limit,
    };
    if let Some((from, _)) = window {
        params.push(("offset".to_string(), from.to_string()));
    }
    if let Some(limit) = limit {
        params.push(("limit".to_string(), limit.to_string()));
    }

    if let Action::Upsert { on_conflict, .. } = &descriptor.action {
        params.push(("on_conflict".to_string(), on_conflict.join(",")));
    }

    params
}

/// `Prefer` header for a descriptor, if it needs one
pub fn prefer_header(descriptor: &Descriptor) -> Option<String> {
    let mut prefs = Vec::new();
    if matches!(descriptor.action, Action::Upsert { .. }) {
        prefs.push("resolution=merge-duplicates");
    }
    if descriptor.is_mutation() {
        prefs.push(if descriptor.returning {
            "return=representation"
        } else {
            "return=minimal"
        });
    }
    if descriptor.count {
        prefs.push("count=exact");
    }

    if prefs.is_empty() {
        None
    } else {
        Some(prefs.join(","))
    }
}

/// Request body for a descriptor, with relations flattened
pub fn request_body(descriptor: &Descriptor) -> Option<Value> {
    let entity = descriptor.entity;
    match &descriptor.action {
        Action::Insert { rows } | Action::Upsert { rows, .. } => Some(Value::Array(
            rows.iter()
                .map(|row| Value::Object(sanitize(entity, row)))
                .collect(),
        )),
        Action::Update { changes } => Some(Value::Object(sanitize(entity, changes))),
        Action::Select | Action::Delete => None,
    }
}

/// Total from a `Content-Range` header such as `0-9/42`
pub fn parse_content_range(value: &str) -> Option<usize> {
    value.rsplit_once('/')?.1.parse().ok()
}

/// Row count mentioned in a "not exactly one row" error
fn found_rows(message: &str) -> usize {
    Regex::new(r"(\d+) rows?")
        .ok()
        .and_then(|re| re.captures(message))
        .and_then(|caps| caps[1].parse().ok())
        .unwrap_or(0)
}

fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            message: Some(message),
            details,
        }) => match details {
            Some(details) => format!("{} ({})", message, details),
            None => message,
        },
        _ if body.is_empty() => "no response body".to_string(),
        _ => body.to_string(),
    }
}

fn decode_payload(body: &str, single: bool) -> Result<Option<Payload>, RemoteError> {
    if body.trim().is_empty() {
        return Ok(None);
    }
    let value: Value =
        serde_json::from_str(body).map_err(|e| RemoteError::Decode(e.to_string()))?;
    match value {
        Value::Object(row) if single => Ok(Some(Payload::One(row))),
        Value::Array(items) => {
            let rows = items
                .into_iter()
                .map(|item| match item {
                    Value::Object(row) => Ok(row),
                    other => Err(RemoteError::Decode(format!("expected a row, got {}", other))),
                })
                .collect::<Result<Vec<Row>, _>>()?;
            Ok(Some(Payload::Many(rows)))
        }
        other => Err(RemoteError::Decode(format!("unexpected response body: {}", other))),
    }
}

#[async_trait]
impl RemoteBackend for RestBackend {
    fn name(&self) -> &'static str {
        "rest"
    }

    async fn execute(&self, descriptor: &Descriptor) -> Result<QueryResponse, RemoteError> {
        let url = format!("{}/{}", self.base_url, descriptor.entity.table_name());
        let method = method_for(descriptor);
        debug!("{} {} ({})", method, url, descriptor.action.name());

        let mut request = self
            .request(method, &url)
            .query(&query_params(descriptor));
        if let Some(prefer) = prefer_header(descriptor) {
            request = request.header("Prefer", prefer);
        }
        if descriptor.single {
            request = request.header(header::ACCEPT, SINGLE_OBJECT);
        }
        if let Some(body) = request_body(descriptor) {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        let count = response
            .headers()
            .get(header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range);
        let body = response.text().await?;

        if !status.is_success() {
            let message = error_message(&body);
            if descriptor.single && status == StatusCode::NOT_ACCEPTABLE {
                return Ok(QueryResponse {
                    data: None,
                    error: Some(QueryError::NotExactlyOneRow {
                        found: found_rows(&message),
                    }),
                    count,
                });
            }
            return Err(RemoteError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let wants_rows = !descriptor.head && (!descriptor.is_mutation() || descriptor.returning);
        let data = if wants_rows {
            decode_payload(&body, descriptor.single)?
        } else {
            None
        };

        let count = if descriptor.count {
            count.or_else(|| data.as_ref().map(Payload::len))
        } else {
            None
        };

        Ok(match data {
            Some(Payload::Many(rows)) if descriptor.single => {
                QueryResponse::shaped(Some(rows), count, true)
            }
            data => QueryResponse {
                data,
                error: None,
                count,
            },
        })
    }

    async fn health_check(&self) -> Result<(), RemoteError> {
        let response = self.request(Method::GET, &format!("{}/", self.base_url)).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(RemoteError::Status {
                status: response.status().as_u16(),
                message: "health check failed".to_string(),
            })
        }
    }
}
