//! Synchronizable tables and their explicit column schemas
//!
//! Every node must agree on this list. Records are validated against it both
//! when rows are read out of the local store and when incoming records are
//! merged, so schema drift between two installations fails loudly and
//! symmetrically instead of silently dropping columns.

use std::fmt;
use std::str::FromStr;

use rusqlite::types::{FromSqlError, FromSqlResult, Value as SqlValue, ValueRef};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Storage type of a domain column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Text,
    Integer,
    Real,
    Boolean,
}

impl ColumnType {
    /// SQL type used in `CREATE TABLE`
    pub const fn sql_type(self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Integer | Self::Boolean => "INTEGER",
            Self::Real => "REAL",
        }
    }

    /// Convert a non-null JSON value into its SQL representation.
    ///
    /// Returns `None` when the value does not fit the column type. Booleans
    /// also accept the `0`/`1` integers older nodes wrote.
    pub fn to_sql(self, value: &Value) -> Option<SqlValue> {
        match (self, value) {
            (Self::Text, Value::String(text)) => Some(SqlValue::Text(text.clone())),
            (Self::Integer, Value::Number(number)) => number.as_i64().map(SqlValue::Integer),
            (Self::Real, Value::Number(number)) => number.as_f64().map(SqlValue::Real),
            (Self::Boolean, Value::Bool(flag)) => Some(SqlValue::Integer(i64::from(*flag))),
            (Self::Boolean, Value::Number(number)) => match number.as_i64() {
                Some(flag @ (0 | 1)) => Some(SqlValue::Integer(flag)),
                _ => None,
            },
            _ => None,
        }
    }

    /// Read a stored SQL value back into JSON.
    pub fn from_sql(self, value: ValueRef<'_>) -> FromSqlResult<Value> {
        match (self, value) {
            (_, ValueRef::Null) => Ok(Value::Null),
            (Self::Text, ValueRef::Text(bytes)) => std::str::from_utf8(bytes)
                .map(|text| Value::String(text.to_string()))
                .map_err(|error| FromSqlError::Other(Box::new(error))),
            (Self::Integer, ValueRef::Integer(number)) => Ok(Value::from(number)),
            (Self::Real, ValueRef::Real(number)) => serde_json::Number::from_f64(number)
                .map(Value::Number)
                .ok_or(FromSqlError::InvalidType),
            #[allow(clippy::cast_precision_loss)]
            (Self::Real, ValueRef::Integer(number)) => serde_json::Number::from_f64(number as f64)
                .map(Value::Number)
                .ok_or(FromSqlError::InvalidType),
            (Self::Boolean, ValueRef::Integer(flag)) => Ok(Value::Bool(flag != 0)),
            _ => Err(FromSqlError::InvalidType),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Real => "real",
            Self::Boolean => "boolean",
        };
        f.write_str(name)
    }
}

/// One domain column of a synchronizable table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnType,
    /// `NOT NULL` in storage; a null or missing value is rejected on merge
    pub required: bool,
}

const fn text(name: &'static str) -> Column {
    Column {
        name,
        kind: ColumnType::Text,
        required: false,
    }
}

const fn required_text(name: &'static str) -> Column {
    Column {
        name,
        kind: ColumnType::Text,
        required: true,
    }
}

const fn integer(name: &'static str) -> Column {
    Column {
        name,
        kind: ColumnType::Integer,
        required: false,
    }
}

const fn real(name: &'static str) -> Column {
    Column {
        name,
        kind: ColumnType::Real,
        required: false,
    }
}

const fn boolean(name: &'static str) -> Column {
    Column {
        name,
        kind: ColumnType::Boolean,
        required: false,
    }
}

const STUDENT: &[Column] = &[
    required_text("name"),
    integer("age"),
    text("gender"),
    text("contact"),
    text("index_number"),
    text("department"),
    text("faculty"),
    text("programme"),
    text("parent_contact"),
    text("hall_of_residence"),
];

const APPOINTMENT: &[Column] = &[
    text("student_ref"),
    text("counsellor"),
    required_text("date"),
    required_text("time"),
    text("purpose"),
    text("status"),
    text("urgency"),
    text("checked_in_at"),
    text("completed_at"),
    text("referral_reason"),
    text("referral_source"),
];

const SESSION: &[Column] = &[
    text("appointment_ref"),
    text("session_type"),
    text("notes"),
    text("outcome"),
];

const REFERRAL: &[Column] = &[
    text("session_ref"),
    text("referred_by"),
    text("contact"),
    text("reasons"),
    text("action_taken"),
    text("outcome"),
];

const CASE_MANAGEMENT: &[Column] = &[
    text("session_ref"),
    text("client_appearance"),
    text("problems"),
    text("interventions"),
    text("recommendations"),
    text("next_visit_date"),
    text("counsellor_signature"),
];

const OUTCOME_QUESTIONNAIRE: &[Column] = &[
    text("student_ref"),
    text("session_ref"),
    integer("age"),
    text("sex"),
    text("responses"),
    integer("total_score"),
    text("completion_date"),
];

const DASS21: &[Column] = &[
    text("student_ref"),
    real("depression_score"),
    real("anxiety_score"),
    real("stress_score"),
    text("completion_date"),
];

const FEEDBACK: &[Column] = &[text("session_ref"), integer("rating"), text("comments")];

const SESSION_ISSUE: &[Column] = &[text("session_ref"), required_text("issue_name")];

const NOTIFICATION: &[Column] = &[
    text("recipient"),
    required_text("message"),
    required_text("type"),
    text("link"),
    boolean("is_read"),
];

const SETTINGS: &[Column] = &[required_text("setting_name"), text("setting_value")];

/// The fixed set of synchronizable tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TableKind {
    Student,
    Appointment,
    #[serde(rename = "session")]
    Session,
    Referral,
    CaseManagement,
    OutcomeQuestionnaire,
    #[serde(rename = "DASS21")]
    Dass21,
    Feedback,
    SessionIssue,
    Notification,
    #[serde(rename = "app_settings")]
    Settings,
}

impl TableKind {
    /// Every synchronizable table, in sync order
    pub const ALL: [Self; 11] = [
        Self::Student,
        Self::Appointment,
        Self::Session,
        Self::Referral,
        Self::CaseManagement,
        Self::OutcomeQuestionnaire,
        Self::Dass21,
        Self::Feedback,
        Self::SessionIssue,
        Self::Notification,
        Self::Settings,
    ];

    /// SQL table name, also the key used in sync payloads
    pub const fn table_name(self) -> &'static str {
        match self {
            Self::Student => "Student",
            Self::Appointment => "Appointment",
            Self::Session => "session",
            Self::Referral => "Referral",
            Self::CaseManagement => "CaseManagement",
            Self::OutcomeQuestionnaire => "OutcomeQuestionnaire",
            Self::Dass21 => "DASS21",
            Self::Feedback => "Feedback",
            Self::SessionIssue => "SessionIssue",
            Self::Notification => "Notification",
            Self::Settings => "app_settings",
        }
    }

    /// Ordered domain columns (sync metadata columns excluded)
    pub const fn columns(self) -> &'static [Column] {
        match self {
            Self::Student => STUDENT,
            Self::Appointment => APPOINTMENT,
            Self::Session => SESSION,
            Self::Referral => REFERRAL,
            Self::CaseManagement => CASE_MANAGEMENT,
            Self::OutcomeQuestionnaire => OUTCOME_QUESTIONNAIRE,
            Self::Dass21 => DASS21,
            Self::Feedback => FEEDBACK,
            Self::SessionIssue => SESSION_ISSUE,
            Self::Notification => NOTIFICATION,
            Self::Settings => SETTINGS,
        }
    }

    pub fn column(self, name: &str) -> Option<&'static Column> {
        self.columns().iter().find(|column| column.name == name)
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

impl FromStr for TableKind {
    type Err = SchemaError;

    /// Matches the payload table name, ignoring ASCII case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        Self::ALL
            .into_iter()
            .find(|table| table.table_name().eq_ignore_ascii_case(name))
            .ok_or_else(|| SchemaError::UnknownTable(name.to_string()))
    }
}

/// A record that does not match the declared table schema
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("unknown table '{0}'")]
    UnknownTable(String),
    #[error("{table}: column '{column}' is missing from the record")]
    MissingColumn { table: TableKind, column: String },
    #[error("{table}: column '{column}' is not part of the schema")]
    UnknownColumn { table: TableKind, column: String },
    #[error("{table}: column '{column}' must not be null")]
    NullValue { table: TableKind, column: String },
    #[error("{table}: column '{column}' expected {expected}, found {found}")]
    TypeMismatch {
        table: TableKind,
        column: String,
        expected: ColumnType,
        found: String,
    },
}
