use caseflow_core::db::migrations::{latest_version, schema_version};
use caseflow_core::db::{open_db, open_db_in_memory, DbError};
use rusqlite::Connection;
use std::collections::BTreeSet;

const EXPECTED_TABLES: [&str; 20] = [
    "activity_log",
    "case_departments",
    "case_number_sequences",
    "case_stage_history",
    "cases",
    "departments",
    "document_access_log",
    "document_permissions",
    "document_reviews",
    "document_types",
    "documents",
    "meeting_participants",
    "meetings",
    "notification_preferences",
    "notifications",
    "sessions",
    "task_dependencies",
    "tasks",
    "user_permissions",
    "users",
];

fn user_tables(conn: &Connection) -> BTreeSet<String> {
    let mut stmt = conn
        .prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%';",
        )
        .unwrap();
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .unwrap()
        .collect::<Result<BTreeSet<_>, _>>()
        .unwrap();
    names
}

#[test]
fn in_memory_database_has_every_table() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn).unwrap(), latest_version());
    let tables = user_tables(&conn);
    for table in EXPECTED_TABLES {
        assert!(tables.contains(table), "missing table {table}");
    }
}

#[test]
fn dangling_department_reference_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    let result = conn.execute(
        "INSERT INTO departments (id, code, name, parent_id, is_active, created_at, updated_at)
         VALUES ('d1', 'LEGAL', 'Legal', 'missing-parent', 1, 0, 0);",
        [],
    );
    assert!(result.is_err(), "foreign keys must be enforced");
}

#[test]
fn reopening_a_file_database_keeps_schema_and_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("caseflow.db");

    {
        let conn = open_db(&path).unwrap();
        conn.execute(
            "INSERT INTO departments (id, code, name, parent_id, is_active, created_at, updated_at)
             VALUES ('d1', 'LEGAL', 'Legal', NULL, 1, 0, 0);",
            [],
        )
        .unwrap();
    }

    let conn = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn).unwrap(), latest_version());
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM departments;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 1);
}

#[test]
fn database_from_a_newer_release_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");
    Connection::open(&path)
        .unwrap()
        .execute_batch("PRAGMA user_version = 999;")
        .unwrap();

    match open_db(&path).unwrap_err() {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}
