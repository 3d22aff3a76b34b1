//! Database migrations

use crate::error::Result;
use crate::models::TableKind;
use rusqlite::{Connection, OptionalExtension};

/// Current schema version
const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub fn run(conn: &mut Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version'",
            [],
            |_| Ok(()),
        )
        .optional()?
        .is_some();

    if !exists {
        return Ok(0);
    }

    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

/// `CREATE TABLE` for one synchronizable table: sync metadata, then the
/// declared domain columns in order.
pub(crate) fn create_table_sql(table: TableKind) -> String {
    let mut sql = format!(
        "CREATE TABLE IF NOT EXISTS \"{}\" (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            global_id TEXT NOT NULL UNIQUE,
            updated_at INTEGER NOT NULL,
            last_modified_by TEXT,
            is_deleted INTEGER NOT NULL DEFAULT 0,
            sync_status TEXT NOT NULL DEFAULT 'pending'",
        table.table_name()
    );
    for column in table.columns() {
        sql.push_str(",\n            \"");
        sql.push_str(column.name);
        sql.push_str("\" ");
        sql.push_str(column.kind.sql_type());
        if column.required {
            sql.push_str(" NOT NULL");
        }
    }
    sql.push_str("\n        )");
    sql
}

/// Migration to version 1: synchronizable tables
fn migrate_v1(conn: &mut Connection) -> Result<()> {
    let tx = conn.transaction()?;

    tx.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        [],
    )?;

    for table in TableKind::ALL {
        let name = table.table_name();
        tx.execute(&create_table_sql(table), [])?;
        tx.execute(
            &format!(
                "CREATE INDEX IF NOT EXISTS \"idx_{name}_updated\" ON \"{name}\"(updated_at)"
            ),
            [],
        )?;
    }

    tx.execute("INSERT INTO schema_version (version) VALUES (1)", [])?;
    tx.commit()?;

    tracing::info!("Migrated database to version 1");
    Ok(())
}

/// Migration to version 2: LWW conflict logging support
fn migrate_v2(conn: &mut Connection) -> Result<()> {
    let tx = conn.transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS sync_conflicts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            table_name TEXT NOT NULL,
            global_id TEXT NOT NULL,
            local_updated_at INTEGER NOT NULL,
            incoming_updated_at INTEGER NOT NULL,
            resolved_at INTEGER NOT NULL,
            strategy TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_sync_conflicts_global_id ON sync_conflicts(global_id);
        CREATE INDEX IF NOT EXISTS idx_sync_conflicts_resolved_at ON sync_conflicts(resolved_at DESC);
        INSERT INTO schema_version (version) VALUES (2);",
    )?;
    tx.commit()?;

    tracing::info!("Migrated database to version {CURRENT_VERSION}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    #[test]
    fn test_migrations() {
        let mut conn = setup();
        run(&mut conn).unwrap();

        let version = get_version(&conn).unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_migrations_idempotent() {
        let mut conn = setup();
        run(&mut conn).unwrap();
        run(&mut conn).unwrap(); // Should not fail

        let version = get_version(&conn).unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_every_table_has_sync_columns() {
        let mut conn = setup();
        run(&mut conn).unwrap();

        for table in TableKind::ALL {
            let mut stmt = conn
                .prepare(&format!("PRAGMA table_info(\"{}\")", table.table_name()))
                .unwrap();
            let columns = stmt
                .query_map([], |row| row.get::<_, String>(1))
                .unwrap()
                .collect::<rusqlite::Result<Vec<_>>>()
                .unwrap();

            assert_eq!(columns.len(), 6 + table.columns().len(), "{table}");
            for name in ["global_id", "updated_at", "is_deleted", "sync_status"] {
                assert!(columns.iter().any(|c| c == name), "{table}.{name}");
            }
        }
    }

    #[test]
    fn test_global_id_is_unique() {
        let mut conn = setup();
        run(&mut conn).unwrap();

        let insert = "INSERT INTO app_settings (global_id, updated_at, setting_name) VALUES ('g1', 1, 'theme')";
        conn.execute(insert, []).unwrap();
        assert!(conn.execute(insert, []).is_err());
    }
}
