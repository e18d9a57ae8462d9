//! Department repository contracts and SQLite implementation.
//!
//! # Invariants
//! - Listing order is deterministic: `code ASC`.
//! - Parent links are written as given; cycle checks live in the service.

use crate::model::directory::{Department, DepartmentId, UserId};
use crate::repo::{
    bool_to_int, parse_flag, parse_optional_uuid, parse_uuid, RepoError, RepoResult,
};
use rusqlite::{params, Connection, OptionalExtension, Row};

const DEPARTMENT_SELECT_SQL: &str = "SELECT
    id,
    code,
    name,
    description,
    parent_id,
    is_active,
    created_at,
    updated_at
FROM departments";

/// Repository interface for department operations.
pub trait DepartmentRepository {
    fn insert_department(&self, department: &Department) -> RepoResult<()>;
    fn update_department(&self, department: &Department) -> RepoResult<()>;
    fn get_department(&self, id: DepartmentId) -> RepoResult<Option<Department>>;
    fn find_by_code(&self, code: &str) -> RepoResult<Option<Department>>;
    fn list_departments(&self, include_inactive: bool) -> RepoResult<Vec<Department>>;
    fn list_member_ids(&self, id: DepartmentId, active_only: bool) -> RepoResult<Vec<UserId>>;
    fn count_children(&self, id: DepartmentId) -> RepoResult<u64>;
}

/// SQLite-backed department repository.
pub struct SqliteDepartmentRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteDepartmentRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl DepartmentRepository for SqliteDepartmentRepository<'_> {
    fn insert_department(&self, department: &Department) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO departments (
                id,
                code,
                name,
                description,
                parent_id,
                is_active
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                department.id.to_string(),
                department.code.as_str(),
                department.name.as_str(),
                department.description.as_deref(),
                department.parent_id.map(|id| id.to_string()),
                bool_to_int(department.is_active),
            ],
        )?;
        Ok(())
    }

    fn update_department(&self, department: &Department) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE departments
             SET
                code = ?2,
                name = ?3,
                description = ?4,
                parent_id = ?5,
                is_active = ?6,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![
                department.id.to_string(),
                department.code.as_str(),
                department.name.as_str(),
                department.description.as_deref(),
                department.parent_id.map(|id| id.to_string()),
                bool_to_int(department.is_active),
            ],
        )?;

        if changed == 0 {
            return Err(RepoError::not_found("department", department.id));
        }
        Ok(())
    }

    fn get_department(&self, id: DepartmentId) -> RepoResult<Option<Department>> {
        self.conn
            .query_row(
                &format!("{DEPARTMENT_SELECT_SQL} WHERE id = ?1;"),
                [id.to_string()],
                |row| Ok(parse_department_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn find_by_code(&self, code: &str) -> RepoResult<Option<Department>> {
        self.conn
            .query_row(
                &format!("{DEPARTMENT_SELECT_SQL} WHERE code = ?1 COLLATE NOCASE;"),
                [code],
                |row| Ok(parse_department_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn list_departments(&self, include_inactive: bool) -> RepoResult<Vec<Department>> {
        let mut stmt = self.conn.prepare(&format!(
            "{DEPARTMENT_SELECT_SQL}
             WHERE (?1 = 1 OR is_active = 1)
             ORDER BY code ASC;"
        ))?;
        let mut rows = stmt.query([bool_to_int(include_inactive)])?;
        let mut departments = Vec::new();
        while let Some(row) = rows.next()? {
            departments.push(parse_department_row(row)?);
        }
        Ok(departments)
    }

    fn list_member_ids(&self, id: DepartmentId, active_only: bool) -> RepoResult<Vec<UserId>> {
        let mut stmt = self.conn.prepare(
            "SELECT id
             FROM users
             WHERE department_id = ?1
               AND (?2 = 0 OR is_active = 1)
             ORDER BY email ASC;",
        )?;
        let mut rows = stmt.query(params![id.to_string(), bool_to_int(active_only)])?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            let text: String = row.get(0)?;
            ids.push(parse_uuid(&text, "users.id")?);
        }
        Ok(ids)
    }

    fn count_children(&self, id: DepartmentId) -> RepoResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM departments WHERE parent_id = ?1 AND is_active = 1;",
            [id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

fn parse_department_row(row: &Row<'_>) -> RepoResult<Department> {
    let id_text: String = row.get("id")?;
    Ok(Department {
        id: parse_uuid(&id_text, "departments.id")?,
        code: row.get("code")?,
        name: row.get("name")?,
        description: row.get("description")?,
        parent_id: parse_optional_uuid(row.get("parent_id")?, "departments.parent_id")?,
        is_active: parse_flag(row.get("is_active")?, "departments.is_active")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
