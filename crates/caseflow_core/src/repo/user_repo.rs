//! User repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist directory users, their credentials and extra permission grants.
//!
//! # Invariants
//! - Credentials never leave this module except through `get_credentials`.
//! - Listing order is deterministic: `last_name ASC, first_name ASC, id ASC`.

use crate::auth::Permission;
use crate::model::directory::{DepartmentId, Role, User, UserId};
use crate::repo::{
    bool_to_int, parse_enum, parse_flag, parse_optional_uuid, parse_uuid, push_in_filter,
    push_page, Page, PageRequest, RepoError, RepoResult,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::BTreeSet;

const USER_SELECT_SQL: &str = "SELECT
    id,
    email,
    first_name,
    last_name,
    role,
    department_id,
    is_active,
    last_login_at,
    created_at,
    updated_at
FROM users";

/// Stored credential material for one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserCredentials {
    pub user: User,
    pub password_hash: String,
    pub password_salt: String,
}

/// Filters for listing users.
#[derive(Debug, Clone, Default)]
pub struct UserListQuery {
    /// Restrict to these departments; `None` = any.
    pub department_ids: Option<Vec<DepartmentId>>,
    pub role: Option<Role>,
    pub include_inactive: bool,
    /// Case-insensitive substring over email and names.
    pub search: Option<String>,
    pub page: PageRequest,
}

/// Repository interface for user operations.
pub trait UserRepository {
    fn insert_user(&self, user: &User, password_hash: &str, password_salt: &str)
        -> RepoResult<()>;
    fn update_user(&self, user: &User) -> RepoResult<()>;
    fn get_user(&self, id: UserId) -> RepoResult<Option<User>>;
    fn find_by_email(&self, email: &str) -> RepoResult<Option<User>>;
    fn get_credentials(&self, email: &str) -> RepoResult<Option<UserCredentials>>;
    fn get_credentials_by_id(&self, id: UserId) -> RepoResult<Option<UserCredentials>>;
    fn set_password(&self, id: UserId, password_hash: &str, password_salt: &str)
        -> RepoResult<()>;
    fn touch_last_login(&self, id: UserId, at_ms: i64) -> RepoResult<()>;
    fn list_users(&self, query: &UserListQuery) -> RepoResult<Page<User>>;
    fn count_users(&self) -> RepoResult<u64>;
    fn list_extra_permissions(&self, id: UserId) -> RepoResult<BTreeSet<Permission>>;
    fn replace_extra_permissions(
        &self,
        id: UserId,
        permissions: &BTreeSet<Permission>,
    ) -> RepoResult<()>;
}

/// SQLite-backed user repository.
pub struct SqliteUserRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteUserRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl UserRepository for SqliteUserRepository<'_> {
    fn insert_user(
        &self,
        user: &User,
        password_hash: &str,
        password_salt: &str,
    ) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO users (
                id,
                email,
                first_name,
                last_name,
                role,
                department_id,
                password_hash,
                password_salt,
                is_active
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);",
            params![
                user.id.to_string(),
                user.email.as_str(),
                user.first_name.as_str(),
                user.last_name.as_str(),
                user.role.as_str(),
                user.department_id.map(|id| id.to_string()),
                password_hash,
                password_salt,
                bool_to_int(user.is_active),
            ],
        )?;
        Ok(())
    }

    fn update_user(&self, user: &User) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE users
             SET
                email = ?2,
                first_name = ?3,
                last_name = ?4,
                role = ?5,
                department_id = ?6,
                is_active = ?7,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![
                user.id.to_string(),
                user.email.as_str(),
                user.first_name.as_str(),
                user.last_name.as_str(),
                user.role.as_str(),
                user.department_id.map(|id| id.to_string()),
                bool_to_int(user.is_active),
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("user", user.id));
        }
        Ok(())
    }

    fn get_user(&self, id: UserId) -> RepoResult<Option<User>> {
        self.conn
            .query_row(
                &format!("{USER_SELECT_SQL} WHERE id = ?1;"),
                [id.to_string()],
                |row| Ok(parse_user_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn find_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        self.conn
            .query_row(
                &format!("{USER_SELECT_SQL} WHERE email = ?1 COLLATE NOCASE;"),
                [email],
                |row| Ok(parse_user_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn get_credentials(&self, email: &str) -> RepoResult<Option<UserCredentials>> {
        self.load_credentials("email = ?1 COLLATE NOCASE", email.to_string())
    }

    fn get_credentials_by_id(&self, id: UserId) -> RepoResult<Option<UserCredentials>> {
        self.load_credentials("id = ?1", id.to_string())
    }

    fn set_password(
        &self,
        id: UserId,
        password_hash: &str,
        password_salt: &str,
    ) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE users
             SET
                password_hash = ?2,
                password_salt = ?3,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![id.to_string(), password_hash, password_salt],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("user", id));
        }
        Ok(())
    }

    fn touch_last_login(&self, id: UserId, at_ms: i64) -> RepoResult<()> {
        self.conn.execute(
            "UPDATE users SET last_login_at = ?2 WHERE id = ?1;",
            params![id.to_string(), at_ms],
        )?;
        Ok(())
    }

    fn list_users(&self, query: &UserListQuery) -> RepoResult<Page<User>> {
        let mut filter = String::from(" WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if !query.include_inactive {
            filter.push_str(" AND is_active = 1");
        }
        if let Some(ids) = query.department_ids.as_ref() {
            push_in_filter(&mut filter, &mut bind_values, "department_id", ids);
        }
        if let Some(role) = query.role {
            filter.push_str(" AND role = ?");
            bind_values.push(Value::Text(role.as_str().to_string()));
        }
        if let Some(search) = query.search.as_ref().map(|s| s.trim()).filter(|s| !s.is_empty()) {
            filter.push_str(
                " AND (email LIKE ? ESCAPE '\\' OR first_name LIKE ? ESCAPE '\\' OR last_name LIKE ? ESCAPE '\\')",
            );
            let pattern = like_pattern(search);
            for _ in 0..3 {
                bind_values.push(Value::Text(pattern.clone()));
            }
        }

        let total: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM users{filter};"),
            params_from_iter(bind_values.iter()),
            |row| row.get(0),
        )?;

        let mut sql = format!("{USER_SELECT_SQL}{filter} ORDER BY last_name ASC, first_name ASC, id ASC");
        push_page(&mut sql, &mut bind_values, &query.page);

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut users = Vec::new();
        while let Some(row) = rows.next()? {
            users.push(parse_user_row(row)?);
        }

        Ok(Page {
            items: users,
            total: total as u64,
            limit: query.page.applied_limit(),
            offset: query.page.offset,
        })
    }

    fn count_users(&self) -> RepoResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM users;", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn list_extra_permissions(&self, id: UserId) -> RepoResult<BTreeSet<Permission>> {
        let mut stmt = self.conn.prepare(
            "SELECT permission FROM user_permissions WHERE user_id = ?1 ORDER BY permission ASC;",
        )?;
        let mut rows = stmt.query([id.to_string()])?;
        let mut permissions = BTreeSet::new();
        while let Some(row) = rows.next()? {
            let value: String = row.get(0)?;
            permissions.insert(parse_enum(
                &value,
                "user_permissions.permission",
                Permission::parse,
            )?);
        }
        Ok(permissions)
    }

    fn replace_extra_permissions(
        &self,
        id: UserId,
        permissions: &BTreeSet<Permission>,
    ) -> RepoResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM user_permissions WHERE user_id = ?1;",
            [id.to_string()],
        )?;
        for permission in permissions {
            tx.execute(
                "INSERT INTO user_permissions (user_id, permission) VALUES (?1, ?2);",
                params![id.to_string(), permission.as_str()],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}

impl SqliteUserRepository<'_> {
    fn load_credentials(
        &self,
        predicate: &str,
        value: String,
    ) -> RepoResult<Option<UserCredentials>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT
                        id, email, first_name, last_name, role, department_id,
                        is_active, last_login_at, created_at, updated_at,
                        password_hash, password_salt
                     FROM users
                     WHERE {predicate};"
                ),
                [value],
                |row| {
                    Ok(parse_user_row(row).and_then(|user| {
                        Ok(UserCredentials {
                            user,
                            password_hash: row.get("password_hash")?,
                            password_salt: row.get("password_salt")?,
                        })
                    }))
                },
            )
            .optional()?
            .transpose()
    }
}

/// Builds a `LIKE` pattern matching `text` as a literal substring.
pub(crate) fn like_pattern(text: &str) -> String {
    let escaped = text
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn parse_user_row(row: &Row<'_>) -> RepoResult<User> {
    let id_text: String = row.get("id")?;
    let role_text: String = row.get("role")?;
    Ok(User {
        id: parse_uuid(&id_text, "users.id")?,
        email: row.get("email")?,
        first_name: row.get("first_name")?,
        last_name: row.get("last_name")?,
        role: parse_enum(&role_text, "users.role", Role::parse)?,
        department_id: parse_optional_uuid(row.get("department_id")?, "users.department_id")?,
        is_active: parse_flag(row.get("is_active")?, "users.is_active")?,
        last_login_at: row.get("last_login_at")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::like_pattern;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("ana"), "%ana%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }
}
