//! Data models for jobtrack
//!
//! Rows travel through the query engine, the local store and the remote
//! backend as JSON objects ([`Row`]). The typed structs here are a
//! convenience layer over those rows; the [`EntityType`] enum is the single
//! dispatch point for per-collection behavior.

use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A flat record as stored and queried
pub type Row = Map<String, Value>;

/// The four collections managed by the data layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Company,
    Contact,
    JobApplication,
    Interview,
}

impl EntityType {
    /// All entity types, in the order they are fetched on startup
    pub const ALL: [EntityType; 4] = [
        EntityType::JobApplication,
        EntityType::Interview,
        EntityType::Contact,
        EntityType::Company,
    ];

    /// Collection (table) name used locally and on the remote backend
    pub fn table_name(self) -> &'static str {
        match self {
            EntityType::Company => "companies",
            EntityType::Contact => "contacts",
            EntityType::JobApplication => "job_applications",
            EntityType::Interview => "interviews",
        }
    }

    /// Resolve a collection name, accepting the `applications` alias
    pub fn from_table_name(name: &str) -> Option<Self> {
        match name {
            "companies" | "company" => Some(EntityType::Company),
            "contacts" | "contact" => Some(EntityType::Contact),
            "job_applications" | "applications" | "job_application" | "application" => {
                Some(EntityType::JobApplication)
            }
            "interviews" | "interview" => Some(EntityType::Interview),
            _ => None,
        }
    }

    /// Fields holding dates, normalized to canonical timestamps on write
    pub fn date_columns(self) -> &'static [&'static str] {
        match self {
            EntityType::JobApplication => &["applied_date", "created_at", "updated_at"],
            EntityType::Interview => &["interview_date"],
            EntityType::Company | EntityType::Contact => &[],
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.table_name())
    }
}

impl FromStr for EntityType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        EntityType::from_table_name(&s.to_ascii_lowercase())
            .with_context(|| format!("Unknown entity type: '{}'", s))
    }
}

/// Status of a job application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Applied,
    Interviewing,
    Offered,
    Rejected,
    Accepted,
    Withdrawn,
}

/// Kind of interview
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterviewType {
    Phone,
    Video,
    Onsite,
    Technical,
    Other,
}

/// Progress of an interview
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterviewStatus {
    Scheduled,
    Completed,
    Cancelled,
}

/// A typed view over a row of one collection
pub trait Entity: Serialize + DeserializeOwned {
    const TYPE: EntityType;

    /// Identifier; empty until assigned on first write
    fn id(&self) -> &str;

    /// Convert into a storage row
    fn to_row(&self) -> Result<Row> {
        match serde_json::to_value(self)? {
            Value::Object(row) => Ok(row),
            other => anyhow::bail!("{} did not serialize to an object: {}", Self::TYPE, other),
        }
    }

    /// Build from a storage row, ignoring attached relation fields
    fn from_row(row: Row) -> Result<Self> {
        serde_json::from_value(Value::Object(row))
            .with_context(|| format!("Failed to decode {} row", Self::TYPE))
    }
}

/// A company the user applies to
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Company {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Company {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

impl Entity for Company {
    const TYPE: EntityType = EntityType::Company;

    fn id(&self) -> &str {
        &self.id
    }
}

/// A person met during the search
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Contact {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Entity for Contact {
    const TYPE: EntityType = EntityType::Contact;

    fn id(&self) -> &str {
        &self.id
    }
}

/// An application for a position
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobApplication {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_id: Option<String>,
    pub status: ApplicationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salary_range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_posting_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl JobApplication {
    pub fn new(title: impl Into<String>, status: ApplicationStatus) -> Self {
        Self {
            id: String::new(),
            title: title.into(),
            company_id: None,
            status,
            salary_range: None,
            job_posting_url: None,
            description: None,
            notes: None,
            applied_date: None,
            user_id: None,
            created_at: None,
            updated_at: None,
        }
    }
}

impl Entity for JobApplication {
    const TYPE: EntityType = EntityType::JobApplication;

    fn id(&self) -> &str {
        &self.id
    }
}

/// A scheduled or past interview for an application
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Interview {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub job_application_id: String,
    pub interview_date: DateTime<Utc>,
    pub interview_type: InterviewType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub status: InterviewStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Entity for Interview {
    const TYPE: EntityType = EntityType::Interview;

    fn id(&self) -> &str {
        &self.id
    }
}

/// Read a string field from a row
pub fn row_str<'a>(row: &'a Row, key: &str) -> Option<&'a str> {
    row.get(key).and_then(Value::as_str)
}

/// Identifier of a row, if present and non-empty
pub fn row_id(row: &Row) -> Option<&str> {
    row_str(row, "id").filter(|id| !id.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entity_type_names() {
        for entity in EntityType::ALL {
            assert_eq!(EntityType::from_table_name(entity.table_name()), Some(entity));
        }
        assert_eq!(
            EntityType::from_table_name("applications"),
            Some(EntityType::JobApplication)
        );
        assert_eq!(EntityType::from_table_name("users"), None);
    }

    #[test]
    fn test_entity_type_from_str() {
        assert_eq!("Companies".parse::<EntityType>().unwrap(), EntityType::Company);
        assert!("offers".parse::<EntityType>().is_err());
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_value(ApplicationStatus::Interviewing).unwrap(),
            json!("interviewing")
        );
        assert_eq!(
            serde_json::from_value::<InterviewType>(json!("onsite")).unwrap(),
            InterviewType::Onsite
        );
        assert!(serde_json::from_value::<InterviewStatus>(json!("postponed")).is_err());
    }

    #[test]
    fn test_company_row_skips_empty_fields() {
        let mut company = Company::new("Acme");
        company.industry = Some("Technology".to_string());
        let row = company.to_row().unwrap();

        assert_eq!(row.get("name"), Some(&json!("Acme")));
        assert_eq!(row.get("industry"), Some(&json!("Technology")));
        assert!(!row.contains_key("id"));
        assert!(!row.contains_key("website"));
    }

    #[test]
    fn test_company_keeps_updated_at() {
        let row = json!({
            "id": "c1",
            "name": "Acme",
            "created_at": "2024-01-01T09:00:00.000Z",
            "updated_at": "2024-02-01T09:00:00.000Z"
        });
        let Value::Object(row) = row else { unreachable!() };

        let company = Company::from_row(row).unwrap();
        assert_eq!(
            company.updated_at.map(|t| t.to_rfc3339()),
            Some("2024-02-01T09:00:00+00:00".to_string())
        );
        assert!(company.to_row().unwrap().contains_key("updated_at"));
        assert!(!Company::new("Initech").to_row().unwrap().contains_key("updated_at"));
    }

    #[test]
    fn test_from_row_ignores_relations() {
        let row = json!({
            "id": "a1",
            "title": "Backend Engineer",
            "status": "applied",
            "company_id": "c1",
            "company": {"id": "c1", "name": "Acme"},
            "interviews": [],
            "updated_at": "2024-03-01T10:00:00.000Z"
        });
        let Value::Object(row) = row else { unreachable!() };

        let app = JobApplication::from_row(row).unwrap();
        assert_eq!(app.id, "a1");
        assert_eq!(app.company_id.as_deref(), Some("c1"));
        assert_eq!(app.status, ApplicationStatus::Applied);
        assert!(app.updated_at.is_some());
    }

    #[test]
    fn test_row_id() {
        let Value::Object(row) = json!({"id": ""}) else { unreachable!() };
        assert_eq!(row_id(&row), None);
        let Value::Object(row) = json!({"id": "x"}) else { unreachable!() };
        assert_eq!(row_id(&row), Some("x"));
    }
}
