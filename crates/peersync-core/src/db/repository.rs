//! Record repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::models::{Record, SyncConflict, SyncStatus, TableKind, Timestamp};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::Value;

/// Sync metadata columns, in the order every query selects them
const META_COLUMNS: [&str; 6] = [
    "id",
    "global_id",
    "updated_at",
    "last_modified_by",
    "is_deleted",
    "sync_status",
];

/// Trait for synchronizable record storage operations
pub trait RecordRepository {
    /// Get a record by `global_id`, tombstones included
    fn get(&self, table: TableKind, global_id: &str) -> Result<Option<Record>>;

    /// Every record with `updated_at > since`, tombstones included, oldest first
    fn changed_since(&self, table: TableKind, since: Timestamp) -> Result<Vec<Record>>;

    /// List live records, most recently updated first
    fn list(&self, table: TableKind, include_deleted: bool, limit: usize) -> Result<Vec<Record>>;

    /// Create a new record authored locally by `node_id`
    fn create(
        &self,
        table: TableKind,
        fields: BTreeMap<String, Value>,
        node_id: &str,
    ) -> Result<Record>;

    /// Change some domain fields of a live record
    fn update_fields(
        &self,
        table: TableKind,
        global_id: &str,
        fields: BTreeMap<String, Value>,
        node_id: &str,
    ) -> Result<Record>;

    /// Tombstone a live record
    fn soft_delete(&self, table: TableKind, global_id: &str, node_id: &str) -> Result<Record>;

    /// Physically remove tombstones last updated before `before`
    fn purge_tombstones(&self, table: TableKind, before: Timestamp) -> Result<usize>;

    /// Insert a record verbatim, assigning a new local id
    fn insert(&self, table: TableKind, record: &Record) -> Result<i64>;

    /// Overwrite every column except the local id of the row with the same `global_id`
    fn replace(&self, table: TableKind, record: &Record) -> Result<()>;

    /// Append an entry to the conflict log
    fn log_conflict(
        &self,
        table: TableKind,
        global_id: &str,
        local_updated_at: Timestamp,
        incoming_updated_at: Timestamp,
    ) -> Result<()>;

    /// Most recent conflict log entries first
    fn conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>>;
}

/// `SQLite` implementation of `RecordRepository`
pub struct SqliteRecordRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteRecordRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn select_sql(table: TableKind) -> String {
        let columns = META_COLUMNS
            .iter()
            .copied()
            .chain(table.columns().iter().map(|column| column.name))
            .map(|name| format!("\"{name}\""))
            .collect::<Vec<_>>()
            .join(", ");
        format!("SELECT {columns} FROM \"{}\"", table.table_name())
    }

    /// Parse a record from a database row
    fn parse_record(table: TableKind, row: &rusqlite::Row<'_>) -> rusqlite::Result<Record> {
        let mut fields = BTreeMap::new();
        for (offset, column) in table.columns().iter().enumerate() {
            let index = META_COLUMNS.len() + offset;
            let raw = row.get_ref(index)?;
            let value = column.kind.from_sql(raw).map_err(|error| {
                rusqlite::Error::FromSqlConversionFailure(index, raw.data_type(), Box::new(error))
            })?;
            fields.insert(column.name.to_string(), value);
        }

        let sync_status: String = row.get(5)?;
        Ok(Record {
            local_id: Some(row.get(0)?),
            global_id: Some(row.get(1)?),
            updated_at: Some(row.get(2)?),
            last_modified_by: row.get(3)?,
            is_deleted: row.get::<_, i64>(4)? != 0,
            sync_status: SyncStatus::parse(&sync_status),
            fields,
        })
    }

    fn query(
        &self,
        table: TableKind,
        clause: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<Record>> {
        let sql = format!("{} {clause}", Self::select_sql(table));
        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map(params, |row| Self::parse_record(table, row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        for record in &records {
            record.validate(table)?;
        }
        Ok(records)
    }

    /// Metadata values in `META_COLUMNS` order, minus the local id
    fn meta_values(record: &Record) -> Result<Vec<SqlValue>> {
        let global_id = record
            .global_id()
            .ok_or_else(|| Error::InvalidInput("record has no global_id".into()))?;
        let updated_at = record
            .updated_at
            .ok_or_else(|| Error::InvalidInput(format!("record {global_id} has no updated_at")))?;

        Ok(vec![
            SqlValue::Text(global_id.to_string()),
            SqlValue::Integer(updated_at.as_millis()),
            record
                .last_modified_by
                .clone()
                .map_or(SqlValue::Null, SqlValue::Text),
            SqlValue::Integer(i64::from(record.is_deleted)),
            SqlValue::Text(record.sync_status.as_str().to_string()),
        ])
    }

    fn write_columns(table: TableKind) -> Vec<&'static str> {
        META_COLUMNS[1..]
            .iter()
            .copied()
            .chain(table.columns().iter().map(|column| column.name))
            .collect()
    }

    fn live(&self, table: TableKind, global_id: &str) -> Result<Record> {
        self.get(table, global_id)?
            .filter(|record| !record.is_deleted)
            .ok_or_else(|| Error::NotFound(format!("{table} record {global_id}")))
    }

    /// Stamp a local mutation of `record` and write it back.
    fn touch(&self, table: TableKind, mut record: Record, node_id: &str) -> Result<Record> {
        let previous = record.updated_at.unwrap_or(Timestamp::EPOCH);
        record.updated_at = Some(Timestamp::next_after(previous));
        record.last_modified_by = Some(node_id.to_string());
        record.sync_status = SyncStatus::Pending;
        self.replace(table, &record)?;
        Ok(record)
    }
}

impl RecordRepository for SqliteRecordRepository<'_> {
    fn get(&self, table: TableKind, global_id: &str) -> Result<Option<Record>> {
        let sql = format!("{} WHERE global_id = ?1", Self::select_sql(table));
        let record = self
            .conn
            .query_row(&sql, params![global_id], |row| Self::parse_record(table, row))
            .optional()?;

        if let Some(record) = &record {
            record.validate(table)?;
        }
        Ok(record)
    }

    fn changed_since(&self, table: TableKind, since: Timestamp) -> Result<Vec<Record>> {
        self.query(
            table,
            "WHERE updated_at > ?1 ORDER BY updated_at ASC, id ASC",
            params![since],
        )
    }

    fn list(&self, table: TableKind, include_deleted: bool, limit: usize) -> Result<Vec<Record>> {
        let clause = if include_deleted {
            "ORDER BY updated_at DESC LIMIT ?1"
        } else {
            "WHERE is_deleted = 0 ORDER BY updated_at DESC LIMIT ?1"
        };
        self.query(table, clause, params![limit as i64])
    }

    fn create(
        &self,
        table: TableKind,
        fields: BTreeMap<String, Value>,
        node_id: &str,
    ) -> Result<Record> {
        let mut record = Record::new(table, node_id);
        record.fields.extend(fields);

        let local_id = self.insert(table, &record)?;
        record.local_id = Some(local_id);
        Ok(record)
    }

    fn update_fields(
        &self,
        table: TableKind,
        global_id: &str,
        fields: BTreeMap<String, Value>,
        node_id: &str,
    ) -> Result<Record> {
        let mut record = self.live(table, global_id)?;
        record.fields.extend(fields);
        record.validate(table)?;
        self.touch(table, record, node_id)
    }

    fn soft_delete(&self, table: TableKind, global_id: &str, node_id: &str) -> Result<Record> {
        let mut record = self.live(table, global_id)?;
        record.is_deleted = true;
        self.touch(table, record, node_id)
    }

    fn purge_tombstones(&self, table: TableKind, before: Timestamp) -> Result<usize> {
        let purged = self.conn.execute(
            &format!(
                "DELETE FROM \"{}\" WHERE is_deleted = 1 AND updated_at < ?1",
                table.table_name()
            ),
            params![before],
        )?;
        Ok(purged)
    }

    fn insert(&self, table: TableKind, record: &Record) -> Result<i64> {
        let mut values = Self::meta_values(record)?;
        values.extend(record.domain_values(table)?);

        let columns = Self::write_columns(table);
        let placeholders = (1..=columns.len())
            .map(|index| format!("?{index}"))
            .collect::<Vec<_>>()
            .join(", ");
        let column_list = columns
            .iter()
            .map(|name| format!("\"{name}\""))
            .collect::<Vec<_>>()
            .join(", ");

        self.conn.execute(
            &format!(
                "INSERT INTO \"{}\" ({column_list}) VALUES ({placeholders})",
                table.table_name()
            ),
            params_from_iter(values),
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn replace(&self, table: TableKind, record: &Record) -> Result<()> {
        let mut values = Self::meta_values(record)?;
        values.extend(record.domain_values(table)?);

        // global_id (?1) is the key; the remaining columns are assigned.
        let assignments = Self::write_columns(table)
            .iter()
            .enumerate()
            .skip(1)
            .map(|(index, name)| format!("\"{name}\" = ?{}", index + 1))
            .collect::<Vec<_>>()
            .join(", ");

        let rows = self.conn.execute(
            &format!(
                "UPDATE \"{}\" SET {assignments} WHERE global_id = ?1",
                table.table_name()
            ),
            params_from_iter(values),
        )?;

        if rows == 0 {
            return Err(Error::NotFound(format!(
                "{table} record {}",
                record.global_id().unwrap_or_default()
            )));
        }
        Ok(())
    }

    fn log_conflict(
        &self,
        table: TableKind,
        global_id: &str,
        local_updated_at: Timestamp,
        incoming_updated_at: Timestamp,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO sync_conflicts (
                table_name, global_id, local_updated_at, incoming_updated_at, resolved_at, strategy
            ) VALUES (?1, ?2, ?3, ?4, ?5, 'lww')",
            params![
                table.table_name(),
                global_id,
                local_updated_at,
                incoming_updated_at,
                Timestamp::now()
            ],
        )?;
        Ok(())
    }

    fn conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, table_name, global_id, local_updated_at, incoming_updated_at, resolved_at, strategy
             FROM sync_conflicts
             ORDER BY resolved_at DESC, id DESC
             LIMIT ?1",
        )?;

        let conflicts = stmt
            .query_map(params![limit as i64], |row| {
                Ok(SyncConflict {
                    id: row.get(0)?,
                    table_name: row.get(1)?,
                    global_id: row.get(2)?,
                    local_updated_at: row.get(3)?,
                    incoming_updated_at: row.get(4)?,
                    resolved_at: row.get(5)?,
                    strategy: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(conflicts)
    }
}
