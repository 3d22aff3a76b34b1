//! Last-Write-Wins merge of incoming records
//!
//! Each record is a LWW register keyed by `global_id`; the version with the
//! strictly greater `updated_at` wins, and ties keep the local copy. Applying
//! the same batch twice, or batches in any order, converges on the version
//! with the maximal timestamp per `global_id`.

use serde::Serialize;
use thiserror::Error;

use crate::db::RecordRepository;
use crate::models::{Record, SchemaError, TableKind};

/// Why a single incoming record could not be merged
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("record has no updated_at")]
    MissingTimestamp,
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Store(#[from] crate::Error),
}

/// What happened to one incoming record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeOutcome {
    /// No `global_id`; skipped without touching the store
    Rejected,
    /// Unknown `global_id`; inserted with a new local id
    Inserted,
    /// Incoming copy was newer and replaced the local one
    Updated,
    /// Same timestamp as the local copy; local copy kept
    Unchanged,
    /// Older than the local copy; discarded and logged as a conflict
    Stale,
}

/// Apply one incoming record to local state.
pub fn merge_record<R>(
    repo: &R,
    table: TableKind,
    incoming: &Record,
) -> Result<MergeOutcome, MergeError>
where
    R: RecordRepository + ?Sized,
{
    let Some(global_id) = incoming.global_id() else {
        tracing::debug!(table = %table, "Skipping incoming record without global_id");
        return Ok(MergeOutcome::Rejected);
    };
    let incoming_at = incoming.updated_at.ok_or(MergeError::MissingTimestamp)?;
    incoming.validate(table)?;

    let Some(local) = repo.get(table, global_id)? else {
        repo.insert(table, incoming)?;
        return Ok(MergeOutcome::Inserted);
    };

    let local_at = local.updated_at.unwrap_or_default();
    if incoming_at > local_at {
        repo.replace(table, incoming)?;
        Ok(MergeOutcome::Updated)
    } else if incoming_at == local_at {
        Ok(MergeOutcome::Unchanged)
    } else {
        tracing::debug!(
            table = %table,
            global_id,
            local = %local_at,
            incoming = %incoming_at,
            "Discarding stale incoming record"
        );
        repo.log_conflict(table, global_id, local_at, incoming_at)?;
        Ok(MergeOutcome::Stale)
    }
}

/// Tally of one applied batch of changes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    /// Records merged without error, rejections included
    pub processed: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub stale: usize,
    pub rejected: usize,
    /// One line per failed record or unknown table
    pub errors: Vec<String>,
}

impl ApplyReport {
    pub(crate) fn record(&mut self, outcome: MergeOutcome) {
        self.processed += 1;
        match outcome {
            MergeOutcome::Rejected => self.rejected += 1,
            MergeOutcome::Inserted => self.inserted += 1,
            MergeOutcome::Updated => self.updated += 1,
            MergeOutcome::Unchanged => self.unchanged += 1,
            MergeOutcome::Stale => self.stale += 1,
        }
    }

    /// Number of records that changed local state
    pub const fn applied(&self) -> usize {
        self.inserted + self.updated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, SqliteRecordRepository};
    use crate::models::Timestamp;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn student(global_id: &str, name: &str, at: i64) -> Record {
        let mut record = Record::new(TableKind::Student, "NODE_REMOTE").with_field("name", name);
        record.global_id = Some(global_id.to_string());
        record.updated_at = Some(Timestamp::from_millis(at));
        record
    }

    fn name_of(repo: &SqliteRecordRepository<'_>, global_id: &str) -> Option<serde_json::Value> {
        repo.get(TableKind::Student, global_id)
            .unwrap()
            .and_then(|record| record.field("name").cloned())
    }

    #[test]
    fn unknown_record_is_inserted_with_fresh_local_id() {
        let db = Database::open_in_memory().unwrap();
        let repo = SqliteRecordRepository::new(db.connection());

        let mut incoming = student("s1", "Ama", 10);
        incoming.local_id = Some(42);

        let outcome = merge_record(&repo, TableKind::Student, &incoming).unwrap();
        assert_eq!(outcome, MergeOutcome::Inserted);

        let stored = repo.get(TableKind::Student, "s1").unwrap().unwrap();
        assert_eq!(stored.local_id, Some(1));
        assert_eq!(stored.last_modified_by.as_deref(), Some("NODE_REMOTE"));
    }

    #[test]
    fn newer_wins_equal_keeps_local_older_is_logged() {
        let db = Database::open_in_memory().unwrap();
        let repo = SqliteRecordRepository::new(db.connection());
        merge_record(&repo, TableKind::Student, &student("s1", "Ama", 10)).unwrap();

        let outcome = merge_record(&repo, TableKind::Student, &student("s1", "Ama K.", 20)).unwrap();
        assert_eq!(outcome, MergeOutcome::Updated);
        assert_eq!(name_of(&repo, "s1"), Some(json!("Ama K.")));

        let outcome = merge_record(&repo, TableKind::Student, &student("s1", "Tie", 20)).unwrap();
        assert_eq!(outcome, MergeOutcome::Unchanged);
        assert_eq!(name_of(&repo, "s1"), Some(json!("Ama K.")));

        let outcome = merge_record(&repo, TableKind::Student, &student("s1", "Old", 5)).unwrap();
        assert_eq!(outcome, MergeOutcome::Stale);
        assert_eq!(name_of(&repo, "s1"), Some(json!("Ama K.")));

        let conflicts = repo.conflicts(10).unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].local_updated_at, Timestamp::from_millis(20));
        assert_eq!(conflicts[0].incoming_updated_at, Timestamp::from_millis(5));
    }

    #[test]
    fn missing_global_id_is_rejected_without_mutation() {
        let db = Database::open_in_memory().unwrap();
        let repo = SqliteRecordRepository::new(db.connection());

        let mut incoming = student("s1", "Ama", 10);
        incoming.global_id = None;
        assert_eq!(
            merge_record(&repo, TableKind::Student, &incoming).unwrap(),
            MergeOutcome::Rejected
        );
        assert!(repo
            .changed_since(TableKind::Student, Timestamp::EPOCH)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn schema_drift_fails_loudly() {
        let db = Database::open_in_memory().unwrap();
        let repo = SqliteRecordRepository::new(db.connection());

        let mut incoming = student("s1", "Ama", 10);
        incoming.fields.remove("faculty");
        let error = merge_record(&repo, TableKind::Student, &incoming).unwrap_err();
        assert!(matches!(
            error,
            MergeError::Schema(SchemaError::MissingColumn { ref column, .. }) if column == "faculty"
        ));
        assert!(repo.get(TableKind::Student, "s1").unwrap().is_none());
    }

    #[test]
    fn missing_timestamp_is_an_error() {
        let db = Database::open_in_memory().unwrap();
        let repo = SqliteRecordRepository::new(db.connection());

        let mut incoming = student("s1", "Ama", 10);
        incoming.updated_at = None;
        assert!(matches!(
            merge_record(&repo, TableKind::Student, &incoming),
            Err(MergeError::MissingTimestamp)
        ));
    }

    #[test]
    fn batch_order_does_not_matter() {
        let versions = [
            student("s1", "first", 1),
            student("s1", "third", 3),
            student("s1", "second", 2),
        ];

        let forward = Database::open_in_memory().unwrap();
        let backward = Database::open_in_memory().unwrap();
        let forward_repo = SqliteRecordRepository::new(forward.connection());
        let backward_repo = SqliteRecordRepository::new(backward.connection());

        for record in &versions {
            merge_record(&forward_repo, TableKind::Student, record).unwrap();
        }
        for record in versions.iter().rev() {
            merge_record(&backward_repo, TableKind::Student, record).unwrap();
        }

        assert_eq!(name_of(&forward_repo, "s1"), Some(json!("third")));
        assert_eq!(name_of(&backward_repo, "s1"), Some(json!("third")));
    }

    #[test]
    fn tombstone_wins_when_newer() {
        let db = Database::open_in_memory().unwrap();
        let repo = SqliteRecordRepository::new(db.connection());
        merge_record(&repo, TableKind::Student, &student("s1", "Ama", 10)).unwrap();

        let mut tombstone = student("s1", "Ama", 11);
        tombstone.is_deleted = true;
        merge_record(&repo, TableKind::Student, &tombstone).unwrap();

        assert!(repo.get(TableKind::Student, "s1").unwrap().unwrap().is_deleted);
        assert!(repo.list(TableKind::Student, false, 10).unwrap().is_empty());
    }

    #[test]
    fn apply_report_counts_outcomes() {
        let mut report = ApplyReport::default();
        report.record(MergeOutcome::Inserted);
        report.record(MergeOutcome::Rejected);
        report.record(MergeOutcome::Updated);
        assert_eq!(report.processed, 3);
        assert_eq!(report.applied(), 2);
        assert_eq!(report.rejected, 1);
    }
}
