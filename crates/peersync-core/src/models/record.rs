//! Synchronizable record model

use std::collections::BTreeMap;

use rusqlite::types::Value as SqlValue;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::table::{SchemaError, TableKind};
use super::timestamp::{deserialize_lenient_option, Timestamp};

/// Advisory replication marker stored with every row; never used by merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Pending,
    Synced,
    #[serde(other)]
    Unknown,
}

impl SyncStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Synced => "synced",
            Self::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "pending" => Self::Pending,
            "synced" => Self::Synced,
            _ => Self::Unknown,
        }
    }
}

/// Generate a fresh cross-node identity for a new record.
pub fn new_global_id() -> String {
    Uuid::now_v7().to_string()
}

/// One row of a synchronizable table, as stored and as sent on the wire.
///
/// The wire form is a flat JSON object: the sync metadata keys below plus the
/// table's domain columns (collected in `fields`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Node-local primary key; meaningless on any other node
    #[serde(rename = "id", default, skip_serializing_if = "Option::is_none")]
    pub local_id: Option<i64>,
    /// Cross-node identity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_id: Option<String>,
    /// Last mutation time; the only input to conflict resolution
    #[serde(
        default,
        deserialize_with = "deserialize_lenient_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<Timestamp>,
    #[serde(default)]
    pub last_modified_by: Option<String>,
    /// Tombstone flag
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub is_deleted: bool,
    #[serde(default)]
    pub sync_status: SyncStatus,
    /// Domain columns
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

impl Record {
    /// Start a brand-new record authored by `node_id`, with every domain
    /// column of `table` set to null.
    #[must_use]
    pub fn new(table: TableKind, node_id: &str) -> Self {
        let fields = table
            .columns()
            .iter()
            .map(|column| (column.name.to_string(), Value::Null))
            .collect();
        Self {
            local_id: None,
            global_id: Some(new_global_id()),
            updated_at: Some(Timestamp::now()),
            last_modified_by: Some(node_id.to_string()),
            is_deleted: false,
            sync_status: SyncStatus::Pending,
            fields,
        }
    }

    /// Set a domain field
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// The `global_id`, if present and not blank
    pub fn global_id(&self) -> Option<&str> {
        self.global_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Check the domain fields against the table schema.
    ///
    /// The record must carry exactly the declared columns: a missing column
    /// is an error rather than an implicit null.
    pub fn validate(&self, table: TableKind) -> Result<(), SchemaError> {
        if let Some(unknown) = self
            .fields
            .keys()
            .find(|name| table.column(name).is_none())
        {
            return Err(SchemaError::UnknownColumn {
                table,
                column: unknown.clone(),
            });
        }

        for column in table.columns() {
            let value = self
                .fields
                .get(column.name)
                .ok_or_else(|| SchemaError::MissingColumn {
                    table,
                    column: column.name.to_string(),
                })?;
            if value.is_null() {
                if column.required {
                    return Err(SchemaError::NullValue {
                        table,
                        column: column.name.to_string(),
                    });
                }
                continue;
            }
            if column.kind.to_sql(value).is_none() {
                return Err(SchemaError::TypeMismatch {
                    table,
                    column: column.name.to_string(),
                    expected: column.kind,
                    found: json_kind(value).to_string(),
                });
            }
        }
        Ok(())
    }

    /// Domain values in schema column order, validated.
    pub fn domain_values(&self, table: TableKind) -> Result<Vec<SqlValue>, SchemaError> {
        self.validate(table)?;
        Ok(table
            .columns()
            .iter()
            .map(|column| {
                self.fields
                    .get(column.name)
                    .and_then(|value| column.kind.to_sql(value))
                    .unwrap_or(SqlValue::Null)
            })
            .collect())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(number) if number.is_i64() || number.is_u64() => "integer",
        Value::Number(_) => "real",
        Value::String(_) => "text",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Accept `true`/`false`, `0`/`1`, or null (false) for boolean flags.
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(flag)) => Ok(flag),
        Some(Value::Number(number)) => match number.as_i64() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(serde::de::Error::custom(format!(
                "expected boolean flag, got {number}"
            ))),
        },
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected boolean flag, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn student() -> Record {
        Record::new(TableKind::Student, "NODE_A").with_field("name", "Ama")
    }

    #[test]
    fn new_record_has_identity_and_all_columns() {
        let record = student();
        assert!(record.global_id().is_some());
        assert!(record.updated_at.is_some());
        assert_eq!(record.fields.len(), TableKind::Student.columns().len());
        assert!(record.validate(TableKind::Student).is_ok());
    }

    #[test]
    fn wire_format_is_flat() {
        let mut record = student();
        record.local_id = Some(7);
        record.global_id = Some("s1".to_string());
        record.updated_at = Some(Timestamp::from_millis(1_000));

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["id"], json!(7));
        assert_eq!(value["global_id"], json!("s1"));
        assert_eq!(value["updated_at"], json!(1_000));
        assert_eq!(value["is_deleted"], json!(false));
        assert_eq!(value["sync_status"], json!("pending"));
        assert_eq!(value["name"], json!("Ama"));
        assert!(value.get("fields").is_none());
    }

    #[test]
    fn legacy_payload_decodes() {
        let record: Record = serde_json::from_value(json!({
            "id": 3,
            "global_id": "s1",
            "updated_at": "2024-01-01 10:00:00",
            "last_modified_by": "NODE_B",
            "is_deleted": 0,
            "sync_status": "synced",
            "name": "Ama"
        }))
        .unwrap();

        assert_eq!(record.local_id, Some(3));
        assert_eq!(
            record.updated_at,
            Timestamp::parse_legacy("2024-01-01 10:00:00")
        );
        assert!(!record.is_deleted);
        assert_eq!(record.sync_status, SyncStatus::Synced);
        assert_eq!(record.field("name"), Some(&json!("Ama")));
    }

    #[test]
    fn blank_global_id_counts_as_missing() {
        let mut record = student();
        record.global_id = Some("   ".to_string());
        assert_eq!(record.global_id(), None);
    }

    #[test]
    fn validate_reports_missing_column() {
        let mut record = student();
        record.fields.remove("hall_of_residence");
        assert_eq!(
            record.validate(TableKind::Student),
            Err(SchemaError::MissingColumn {
                table: TableKind::Student,
                column: "hall_of_residence".to_string(),
            })
        );
    }

    #[test]
    fn validate_reports_unknown_column() {
        let record = student().with_field("created_at", "2024-01-01");
        assert!(matches!(
            record.validate(TableKind::Student),
            Err(SchemaError::UnknownColumn { column, .. }) if column == "created_at"
        ));
    }

    #[test]
    fn validate_reports_null_required_and_type_mismatch() {
        let record = student().with_field("name", Value::Null);
        assert!(matches!(
            record.validate(TableKind::Student),
            Err(SchemaError::NullValue { .. })
        ));

        let record = student().with_field("age", "twenty");
        assert!(matches!(
            record.validate(TableKind::Student),
            Err(SchemaError::TypeMismatch { expected: crate::models::ColumnType::Integer, .. })
        ));
    }

    #[test]
    fn domain_values_follow_schema_order() {
        let record = student().with_field("age", 20);
        let values = record.domain_values(TableKind::Student).unwrap();
        assert_eq!(values[0], SqlValue::Text("Ama".to_string()));
        assert_eq!(values[1], SqlValue::Integer(20));
        assert_eq!(values[2], SqlValue::Null);
    }
}
