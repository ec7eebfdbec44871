//! Relation flattening and attachment
//!
//! Storage is foreign-key only. Callers may hand us rows carrying nested
//! relation objects (a job application with its `company` embedded, an
//! interview with its `contact`), and reads hand back rows with those
//! relations resolved. Both directions are defined here, once per entity
//! type, and shared by the query engine and the reconciliation engine.

use serde_json::Value;

use crate::models::{row_id, row_str, EntityType, Row};
use crate::query::compare_values;
use crate::storage::Snapshot;

/// A nested relation that collapses into a foreign-key column
struct ForeignKey {
    /// Keys the nested object may arrive under
    relations: &'static [&'static str],
    /// Column holding the identifier in storage
    column: &'static str,
}

const COMPANY_FK: ForeignKey = ForeignKey {
    relations: &["company", "companies"],
    column: "company_id",
};

const JOB_APPLICATION_FK: ForeignKey = ForeignKey {
    relations: &["job_application", "job_applications"],
    column: "job_application_id",
};

const CONTACT_FK: ForeignKey = ForeignKey {
    relations: &["contact", "contacts"],
    column: "contact_id",
};

fn foreign_keys(entity: EntityType) -> &'static [ForeignKey] {
    match entity {
        EntityType::JobApplication => &[COMPANY_FK],
        EntityType::Contact => &[COMPANY_FK],
        EntityType::Interview => &[JOB_APPLICATION_FK, CONTACT_FK],
        EntityType::Company => &[],
    }
}

/// Read-only collections attached on read, never persisted
fn derived_fields(entity: EntityType) -> &'static [&'static str] {
    match entity {
        EntityType::JobApplication => &["interviews"],
        EntityType::Company => &["applications", "job_applications"],
        EntityType::Contact | EntityType::Interview => &[],
    }
}

/// Identifier carried by a relation value: an object's `id`, or a bare id
fn relation_id(value: &Value) -> Option<Value> {
    match value {
        Value::Object(obj) => obj
            .get("id")
            .filter(|id| id.is_string() || id.is_number())
            .cloned(),
        Value::String(s) if !s.is_empty() => Some(value.clone()),
        _ => None,
    }
}

fn is_unset(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        _ => false,
    }
}

/// Flatten a row into its foreign-key-only storage form
///
/// Nested relation objects are dropped; their identifier fills the
/// foreign-key column unless the row already sets one. A foreign-key column
/// that itself holds an object collapses to that object's `id`.
pub fn sanitize(entity: EntityType, row: &Row) -> Row {
    let mut cleaned = row.clone();

    for fk in foreign_keys(entity) {
        let collapsed = match cleaned.get(fk.column) {
            Some(value @ Value::Object(_)) => Some(relation_id(value)),
            _ => None,
        };
        match collapsed {
            Some(Some(id)) => {
                cleaned.insert(fk.column.to_string(), id);
            }
            Some(None) => {
                cleaned.remove(fk.column);
            }
            None => {}
        }

        let nested = fk
            .relations
            .iter()
            .find_map(|key| row.get(*key).and_then(relation_id));
        if is_unset(cleaned.get(fk.column)) {
            if let Some(id) = nested {
                cleaned.insert(fk.column.to_string(), id);
            }
        }

        for key in fk.relations {
            cleaned.remove(*key);
        }
    }

    for key in derived_fields(entity) {
        cleaned.remove(*key);
    }

    cleaned
}

fn resolve(snapshot: &Snapshot, entity: EntityType, row: &Row, column: &str) -> Value {
    row_str(row, column)
        .and_then(|id| snapshot.find(entity, id))
        .map(|found| Value::Object(found.clone()))
        .unwrap_or(Value::Null)
}

/// Attach denormalized relation data to rows read from `entity`
///
/// - job applications get their `company` and their `interviews`, sorted by
///   interview date
/// - contacts get their `company`
/// - companies get `applications`, a list of `{id}` references
/// - interviews get their `contact`
pub fn attach(entity: EntityType, rows: Vec<Row>, snapshot: &Snapshot) -> Vec<Row> {
    rows.into_iter()
        .map(|mut row| {
            match entity {
                EntityType::JobApplication => {
                    let company = resolve(snapshot, EntityType::Company, &row, "company_id");
                    let mut interviews: Vec<&Row> = match row_id(&row) {
                        Some(id) => snapshot
                            .rows(EntityType::Interview)
                            .iter()
                            .filter(|i| row_str(i, "job_application_id") == Some(id))
                            .collect(),
                        None => Vec::new(),
                    };
                    interviews.sort_by(|a, b| {
                        compare_values(a.get("interview_date"), b.get("interview_date"))
                    });
                    let interviews = interviews
                        .into_iter()
                        .map(|i| Value::Object(i.clone()))
                        .collect();

                    row.insert("company".to_string(), company);
                    row.insert("interviews".to_string(), Value::Array(interviews));
                }
                EntityType::Contact => {
                    let company = resolve(snapshot, EntityType::Company, &row, "company_id");
                    row.insert("company".to_string(), company);
                }
                EntityType::Company => {
                    let applications = match row_id(&row) {
                        Some(id) => snapshot
                            .rows(EntityType::JobApplication)
                            .iter()
                            .filter(|app| row_str(app, "company_id") == Some(id))
                            .filter_map(row_id)
                            .map(|app_id| serde_json::json!({ "id": app_id }))
                            .collect(),
                        None => Vec::new(),
                    };
                    row.insert("applications".to_string(), Value::Array(applications));
                }
                EntityType::Interview => {
                    let contact = resolve(snapshot, EntityType::Contact, &row, "contact_id");
                    row.insert("contact".to_string(), contact);
                }
            }
            row
        })
        .collect()
}
