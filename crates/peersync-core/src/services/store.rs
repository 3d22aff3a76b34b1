//! Shared local store used by the protocol handlers, the orchestrator and the CLI.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;

use crate::db::{Database, RecordRepository, SqliteRecordRepository};
use crate::models::{Record, SyncConflict, TableKind, Timestamp};
use crate::sync::{merge_record, ApplyReport, ChangeSet, WireChangeSet, WireRecord};
use crate::Result;

/// Thread-safe handle to the node database.
///
/// The connection is locked per operation and never across a network call,
/// so local writes and protocol handlers interleave with a running cycle.
#[derive(Clone)]
pub struct NodeStore {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl NodeStore {
    /// Open the store at the given filesystem path.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let path = db_path.clone();
        let db = tokio::task::spawn_blocking(move || Database::open(&path))
            .await
            .map_err(|error| crate::Error::Database(error.to_string()))??;
        tracing::debug!(path = %db_path.display(), "Opened node database");

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory store (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
        })
    }

    /// Path of the backing file, if any.
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Create a record authored by this node.
    pub async fn create_record(
        &self,
        table: TableKind,
        fields: BTreeMap<String, Value>,
        node_id: &str,
    ) -> Result<Record> {
        let db = self.db.lock().await;
        let repo = SqliteRecordRepository::new(db.connection());
        repo.create(table, fields, node_id)
    }

    /// Change domain fields of a live record.
    pub async fn update_record(
        &self,
        table: TableKind,
        global_id: &str,
        fields: BTreeMap<String, Value>,
        node_id: &str,
    ) -> Result<Record> {
        let db = self.db.lock().await;
        let repo = SqliteRecordRepository::new(db.connection());
        repo.update_fields(table, global_id, fields, node_id)
    }

    /// Tombstone a record so the deletion propagates.
    pub async fn delete_record(
        &self,
        table: TableKind,
        global_id: &str,
        node_id: &str,
    ) -> Result<Record> {
        let db = self.db.lock().await;
        let repo = SqliteRecordRepository::new(db.connection());
        repo.soft_delete(table, global_id, node_id)
    }

    /// Fetch a record by `global_id`, tombstones included.
    pub async fn get_record(&self, table: TableKind, global_id: &str) -> Result<Option<Record>> {
        let db = self.db.lock().await;
        let repo = SqliteRecordRepository::new(db.connection());
        repo.get(table, global_id)
    }

    /// List records most recently updated first.
    pub async fn list_records(
        &self,
        table: TableKind,
        include_deleted: bool,
        limit: usize,
    ) -> Result<Vec<Record>> {
        let db = self.db.lock().await;
        let repo = SqliteRecordRepository::new(db.connection());
        repo.list(table, include_deleted, limit)
    }

    /// Remove tombstones older than `before` from every table.
    pub async fn purge_tombstones(&self, before: Timestamp) -> Result<usize> {
        let mut db = self.db.lock().await;
        let tx = db.connection_mut().transaction()?;
        let mut purged = 0;
        {
            let repo = SqliteRecordRepository::new(&tx);
            for table in TableKind::ALL {
                purged += repo.purge_tombstones(table, before)?;
            }
        }
        tx.commit()?;

        if purged > 0 {
            tracing::info!(purged, before = %before, "Purged tombstones");
        }
        Ok(purged)
    }

    /// List recently logged sync conflicts.
    pub async fn list_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>> {
        let db = self.db.lock().await;
        let repo = SqliteRecordRepository::new(db.connection());
        repo.conflicts(limit)
    }

    /// Every record of every table changed after `since`. Tables without
    /// changes are omitted.
    pub async fn changes_since(&self, since: Timestamp) -> Result<ChangeSet> {
        let db = self.db.lock().await;
        let repo = SqliteRecordRepository::new(db.connection());

        let mut changes = ChangeSet::new();
        for table in TableKind::ALL {
            let records = repo.changed_since(table, since)?;
            if !records.is_empty() {
                changes.insert(table.table_name().to_string(), records);
            }
        }
        Ok(changes)
    }

    /// Merge a batch of incoming records.
    ///
    /// The batch runs in one transaction with a savepoint per record: a failing
    /// or undecodable record is rolled back alone and reported in
    /// [`ApplyReport::errors`].
    pub async fn apply_changes(&self, changes: &WireChangeSet) -> Result<ApplyReport> {
        let mut db = self.db.lock().await;
        let mut tx = db.connection_mut().transaction()?;
        let mut report = ApplyReport::default();

        for (table_name, records) in changes {
            let table = match table_name.parse::<TableKind>() {
                Ok(table) => table,
                Err(error) => {
                    tracing::warn!(table = %table_name, records = records.len(), "Unknown table in changes");
                    report
                        .errors
                        .push(format!("Error processing {table_name}: {error}"));
                    continue;
                }
            };

            for incoming in records {
                let record = match incoming {
                    WireRecord::Valid(record) => record,
                    WireRecord::Malformed { reason, .. } => {
                        let global_id = incoming.global_id().unwrap_or("<none>");
                        tracing::warn!(table = %table, global_id, %reason, "Undecodable record");
                        report.errors.push(format!(
                            "Error processing {table_name} record {global_id}: {reason}"
                        ));
                        continue;
                    }
                };
                let savepoint = tx.savepoint()?;
                let outcome = merge_record(&SqliteRecordRepository::new(&savepoint), table, record);
                match outcome {
                    Ok(outcome) => {
                        savepoint.commit()?;
                        report.record(outcome);
                    }
                    Err(error) => {
                        // Dropping the savepoint rolls this record back.
                        drop(savepoint);
                        let global_id = record.global_id().unwrap_or("<none>");
                        tracing::warn!(table = %table, global_id, %error, "Failed to merge record");
                        report.errors.push(format!(
                            "Error processing {table_name} record {global_id}: {error}"
                        ));
                    }
                }
            }
        }

        tx.commit()?;
        Ok(report)
    }
}
