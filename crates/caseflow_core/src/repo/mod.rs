//! Persistence traits for each aggregate and their SQLite implementations.
//!
//! # Responsibility
//! - One trait per aggregate (case, document, meeting, ...) so services never
//!   build SQL themselves.
//! - Shared paging types and row-decoding helpers.
//!
//! # Invariants
//! - Repository APIs return semantic errors (`NotFound`, `Conflict`) in
//!   addition to DB transport errors.
//! - Read paths reject invalid persisted state instead of masking it.
//! - List queries are deterministic and bounded by a normalized limit.

pub mod activity_repo;
pub mod case_repo;
pub mod department_repo;
pub mod document_repo;
pub mod meeting_repo;
pub mod notification_repo;
pub mod session_repo;
pub mod task_repo;
pub mod user_repo;

use crate::db::DbError;
use rusqlite::ErrorCode;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub const DEFAULT_PAGE_LIMIT: u32 = 20;
pub const MAX_PAGE_LIMIT: u32 = 100;

pub type RepoResult<T> = Result<T, RepoError>;

/// Generic repository error for persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    NotFound { entity: &'static str, id: String },
    /// Unique/foreign-key constraint rejected the write.
    Conflict(String),
    InvalidData(String),
}

impl RepoError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::Conflict(message) => write!(f, "conflicting write: {message}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::NotFound { .. } => None,
            Self::Conflict(_) => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(failure, message) = &value {
            if failure.code == ErrorCode::ConstraintViolation {
                return Self::Conflict(
                    message
                        .clone()
                        .unwrap_or_else(|| "constraint violation".to_string()),
                );
            }
        }
        Self::Db(DbError::Sqlite(value))
    }
}

/// Pagination input shared by list queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageRequest {
    /// Requested page size; `None`/`0` falls back to the default.
    pub limit: Option<u32>,
    pub offset: u32,
}

impl PageRequest {
    pub fn new(limit: Option<u32>, offset: u32) -> Self {
        Self { limit, offset }
    }

    /// Effective limit after clamping.
    pub fn applied_limit(&self) -> u32 {
        normalize_limit(self.limit, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT)
    }
}

/// One page of results plus the unpaginated total.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
}

impl<T> Page<T> {
    pub fn has_more(&self) -> bool {
        u64::from(self.offset) + (self.items.len() as u64) < self.total
    }
}

/// Normalizes a list limit: `None`/`0` → `default`, above `max` → `max`.
pub fn normalize_limit(limit: Option<u32>, default: u32, max: u32) -> u32 {
    match limit {
        Some(0) | None => default.min(max),
        Some(value) if value > max => max,
        Some(value) => value,
    }
}

pub(crate) fn parse_uuid(value: &str, column: &str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid value `{value}` in {column}")))
}

pub(crate) fn parse_optional_uuid(value: Option<String>, column: &str) -> RepoResult<Option<Uuid>> {
    value.map(|text| parse_uuid(&text, column)).transpose()
}

pub(crate) fn parse_flag(value: i64, column: &str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid flag value `{other}` in {column}"
        ))),
    }
}

pub(crate) fn parse_enum<T>(
    value: &str,
    column: &str,
    parse: impl FnOnce(&str) -> Option<T>,
) -> RepoResult<T> {
    parse(value).ok_or_else(|| RepoError::InvalidData(format!("invalid value `{value}` in {column}")))
}

pub(crate) fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

/// Appends `LIMIT ? OFFSET ?` for the normalized page.
pub(crate) fn push_page(
    sql: &mut String,
    bind_values: &mut Vec<rusqlite::types::Value>,
    page: &PageRequest,
) {
    sql.push_str(" LIMIT ? OFFSET ?");
    bind_values.push(rusqlite::types::Value::Integer(i64::from(
        page.applied_limit(),
    )));
    bind_values.push(rusqlite::types::Value::Integer(i64::from(page.offset)));
}

/// Appends `AND <column> IN (?, ?, ...)`; an empty set matches nothing.
pub(crate) fn push_in_filter(
    sql: &mut String,
    bind_values: &mut Vec<rusqlite::types::Value>,
    column: &str,
    ids: &[Uuid],
) {
    if ids.is_empty() {
        sql.push_str(" AND 0 = 1");
        return;
    }
    let placeholders = vec!["?"; ids.len()].join(", ");
    sql.push_str(&format!(" AND {column} IN ({placeholders})"));
    bind_values.extend(
        ids.iter()
            .map(|id| rusqlite::types::Value::Text(id.to_string())),
    );
}

#[cfg(test)]
mod tests {
    use super::{normalize_limit, Page, PageRequest, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};

    #[test]
    fn limit_defaults_and_clamps() {
        assert_eq!(normalize_limit(None, 20, 100), 20);
        assert_eq!(normalize_limit(Some(0), 20, 100), 20);
        assert_eq!(normalize_limit(Some(5), 20, 100), 5);
        assert_eq!(normalize_limit(Some(500), 20, 100), 100);
        assert_eq!(normalize_limit(None, 200, 100), 100);
    }

    #[test]
    fn page_request_uses_crate_bounds() {
        assert_eq!(PageRequest::default().applied_limit(), DEFAULT_PAGE_LIMIT);
        assert_eq!(
            PageRequest::new(Some(u32::MAX), 0).applied_limit(),
            MAX_PAGE_LIMIT
        );
    }

    #[test]
    fn has_more_compares_offset_window_with_total() {
        let page = Page {
            items: vec![1, 2],
            total: 5,
            limit: 2,
            offset: 2,
        };
        assert!(page.has_more());
        let last = Page {
            items: vec![5],
            total: 5,
            limit: 2,
            offset: 4,
        };
        assert!(!last.has_more());
    }
}
