use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

use peersync_core::identity::NODE_CONFIG_FILE;
use peersync_core::models::{ColumnType, SyncConflict};
use peersync_core::{NodeIdentity, NodeStore, Record, TableKind, Timestamp};
use serde::Serialize;
use serde_json::Value;

use crate::error::CliError;

const DEFAULT_DB_FILE: &str = "peersync.db";

/// Where one node keeps its state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodePaths {
    pub db_path: PathBuf,
    pub config_path: PathBuf,
}

impl NodePaths {
    pub fn identity(&self) -> NodeIdentity {
        NodeIdentity::new(&self.config_path)
    }

    pub async fn open_store(&self) -> Result<NodeStore, CliError> {
        Ok(NodeStore::open_path(&self.db_path).await?)
    }
}

#[derive(Debug, Serialize)]
pub struct RecordListItem {
    pub global_id: String,
    pub preview: String,
    pub updated_at: Timestamp,
    pub relative_time: String,
    pub last_modified_by: Option<String>,
    pub is_deleted: bool,
    pub sync_status: String,
}

#[derive(Debug, Serialize)]
pub struct SyncConflictItem {
    pub id: i64,
    pub table: String,
    pub global_id: String,
    pub local_updated_at: Timestamp,
    pub incoming_updated_at: Timestamp,
    pub resolved_at: Timestamp,
    pub resolved_at_iso: String,
    pub strategy: String,
}

/// Flags win over environment variables, which win over the data directory.
pub fn resolve_paths(
    data_dir: Option<PathBuf>,
    db_path: Option<PathBuf>,
    config: Option<PathBuf>,
) -> NodePaths {
    resolve_paths_with(data_dir, db_path, config, |name| env::var_os(name).map(PathBuf::from))
}

pub fn resolve_paths_with(
    data_dir: Option<PathBuf>,
    db_path: Option<PathBuf>,
    config: Option<PathBuf>,
    lookup: impl Fn(&str) -> Option<PathBuf>,
) -> NodePaths {
    let data_dir = data_dir
        .or_else(|| lookup("PEERSYNC_DATA_DIR"))
        .unwrap_or_else(default_data_dir);
    NodePaths {
        db_path: db_path
            .or_else(|| lookup("PEERSYNC_DB_PATH"))
            .unwrap_or_else(|| data_dir.join(DEFAULT_DB_FILE)),
        config_path: config
            .or_else(|| lookup("PEERSYNC_NODE_CONFIG"))
            .unwrap_or_else(|| data_dir.join(NODE_CONFIG_FILE)),
    }
}

pub fn default_data_dir() -> PathBuf {
    dirs::data_dir().map_or_else(|| PathBuf::from("data"), |dir| dir.join("peersync"))
}

pub fn parse_table(name: &str) -> Result<TableKind, CliError> {
    name.parse::<TableKind>()
        .map_err(|error| CliError::Core(error.into()))
}

pub fn normalize_record_id(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyRecordId)
    } else {
        Ok(trimmed.to_string())
    }
}

/// Parse `name=value` pairs into typed column values for `table`.
///
/// An empty value or the literal `null` clears the column.
pub fn parse_field_assignments(
    table: TableKind,
    assignments: &[String],
) -> Result<BTreeMap<String, Value>, CliError> {
    let mut fields = BTreeMap::new();
    for assignment in assignments {
        let Some((name, raw)) = assignment.split_once('=') else {
            return Err(CliError::InvalidField(format!(
                "'{assignment}' is not NAME=VALUE"
            )));
        };
        let name = name.trim();
        let column = table
            .columns()
            .iter()
            .find(|column| column.name == name)
            .ok_or_else(|| {
                CliError::InvalidField(format!(
                    "{} has no column '{name}'",
                    table.table_name()
                ))
            })?;
        let value = parse_column_value(column.kind, raw.trim()).ok_or_else(|| {
            CliError::InvalidField(format!("'{raw}' is not a valid {} for {name}", column.kind))
        })?;
        fields.insert(name.to_string(), value);
    }
    Ok(fields)
}

fn parse_column_value(kind: ColumnType, raw: &str) -> Option<Value> {
    if raw.is_empty() || raw == "null" {
        return Some(Value::Null);
    }
    match kind {
        ColumnType::Text => Some(Value::String(raw.to_string())),
        ColumnType::Integer => raw.parse::<i64>().ok().map(Value::from),
        ColumnType::Real => raw
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number),
        ColumnType::Boolean => match raw.to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(Value::Bool(true)),
            "false" | "no" | "0" => Some(Value::Bool(false)),
            _ => None,
        },
    }
}

pub async fn require_record(
    store: &NodeStore,
    table: TableKind,
    global_id: &str,
) -> Result<Record, CliError> {
    store
        .get_record(table, global_id)
        .await?
        .ok_or_else(|| CliError::RecordNotFound(format!("{} {global_id}", table.table_name())))
}

pub fn format_record_lines(table: TableKind, records: &[Record]) -> Vec<String> {
    let now = Timestamp::now();
    records
        .iter()
        .map(|record| {
            let global_id = record.global_id().unwrap_or("-");
            let short_id = global_id.chars().take(13).collect::<String>();
            let preview = record_preview(table, record, 40);
            let relative_time = record
                .updated_at
                .map_or_else(|| "-".to_string(), |at| format_relative_time(at, now));
            let marker = if record.is_deleted { "  [deleted]" } else { "" };
            format!("{short_id:<13}  {preview:<40}  {relative_time}{marker}")
        })
        .collect()
}

pub fn record_to_list_item(table: TableKind, record: &Record) -> RecordListItem {
    let updated_at = record.updated_at.unwrap_or(Timestamp::EPOCH);
    RecordListItem {
        global_id: record.global_id().unwrap_or_default().to_string(),
        preview: record_preview(table, record, 80),
        updated_at,
        relative_time: format_relative_time(updated_at, Timestamp::now()),
        last_modified_by: record.last_modified_by.clone(),
        is_deleted: record.is_deleted,
        sync_status: record.sync_status.as_str().to_string(),
    }
}

/// First non-null columns in schema order, collapsed to one line.
pub fn record_preview(table: TableKind, record: &Record, max_chars: usize) -> String {
    let collapsed = table
        .columns()
        .iter()
        .filter_map(|column| match record.field(column.name)? {
            Value::Null => None,
            Value::String(text) => Some(text.split_whitespace().collect::<Vec<_>>().join(" ")),
            other => Some(format!("{}={other}", column.name)),
        })
        .collect::<Vec<_>>()
        .join(", ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn sync_conflict_to_item(conflict: &SyncConflict) -> SyncConflictItem {
    SyncConflictItem {
        id: conflict.id,
        table: conflict.table_name.clone(),
        global_id: conflict.global_id.clone(),
        local_updated_at: conflict.local_updated_at,
        incoming_updated_at: conflict.incoming_updated_at,
        resolved_at: conflict.resolved_at,
        resolved_at_iso: format_sync_timestamp(conflict.resolved_at),
        strategy: conflict.strategy.clone(),
    }
}

pub fn format_sync_conflict_lines(conflicts: &[SyncConflict]) -> Vec<String> {
    conflicts
        .iter()
        .map(|conflict| {
            format!(
                "{}  {:<4}  {} {}  local={} incoming={}",
                format_sync_timestamp(conflict.resolved_at),
                conflict.strategy,
                conflict.table_name,
                conflict.global_id,
                conflict.local_updated_at.as_millis(),
                conflict.incoming_updated_at.as_millis()
            )
        })
        .collect()
}

pub fn format_sync_timestamp(timestamp: Timestamp) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp.as_millis()).map_or_else(
        || timestamp.as_millis().to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp: Timestamp, now: Timestamp) -> String {
    let diff = now.as_millis().saturating_sub(timestamp.as_millis());
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

/// Cut-off for tombstone purges, `days` before now.
pub fn retention_cutoff(days: u32, now: Timestamp) -> Timestamp {
    let window = chrono::Duration::days(i64::from(days)).num_milliseconds();
    Timestamp::from_millis(now.as_millis().saturating_sub(window))
}

pub fn display_path(path: &Path) -> String {
    path.display().to_string()
}
