//! Activity log persistence.
//!
//! Entries are append-only; listing is newest first.

use crate::model::activity::{ActivityEntry, EntityType};
use crate::model::case::CaseId;
use crate::repo::{
    parse_enum, parse_optional_uuid, parse_uuid, push_page, Page, PageRequest, RepoError,
    RepoResult,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use uuid::Uuid;

const ACTIVITY_SELECT_SQL: &str = "SELECT
    id,
    actor_id,
    action,
    entity_type,
    entity_id,
    case_id,
    details,
    created_at
FROM activity_log";

/// New activity entry before it receives a row id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewActivity {
    pub actor_id: Option<Uuid>,
    pub action: String,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub case_id: Option<CaseId>,
    pub details: Option<serde_json::Value>,
    pub created_at: i64,
}

/// Repository interface for activity log operations.
pub trait ActivityRepository {
    fn append(&self, entry: &NewActivity) -> RepoResult<i64>;
    fn list_for_entity(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
        page: &PageRequest,
    ) -> RepoResult<Page<ActivityEntry>>;
    fn list_for_case(&self, case_id: CaseId, page: &PageRequest) -> RepoResult<Page<ActivityEntry>>;
}

/// SQLite-backed activity repository.
pub struct SqliteActivityRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteActivityRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn list_where(
        &self,
        filter: &str,
        mut bind_values: Vec<Value>,
        page: &PageRequest,
    ) -> RepoResult<Page<ActivityEntry>> {
        let total: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM activity_log{filter};"),
            params_from_iter(bind_values.iter()),
            |row| row.get(0),
        )?;

        let mut sql = format!("{ACTIVITY_SELECT_SQL}{filter} ORDER BY created_at DESC, id DESC");
        push_page(&mut sql, &mut bind_values, page);

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_activity_row(row)?);
        }

        Ok(Page {
            items,
            total: total as u64,
            limit: page.applied_limit(),
            offset: page.offset,
        })
    }
}

impl ActivityRepository for SqliteActivityRepository<'_> {
    fn append(&self, entry: &NewActivity) -> RepoResult<i64> {
        let details = entry
            .details
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|err| RepoError::InvalidData(format!("activity details: {err}")))?;
        self.conn.execute(
            "INSERT INTO activity_log (actor_id, action, entity_type, entity_id, case_id, details, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                entry.actor_id.map(|id| id.to_string()),
                entry.action.as_str(),
                entry.entity_type.as_str(),
                entry.entity_id.to_string(),
                entry.case_id.map(|id| id.to_string()),
                details,
                entry.created_at,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn list_for_entity(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
        page: &PageRequest,
    ) -> RepoResult<Page<ActivityEntry>> {
        self.list_where(
            " WHERE entity_type = ? AND entity_id = ?",
            vec![
                Value::Text(entity_type.as_str().to_string()),
                Value::Text(entity_id.to_string()),
            ],
            page,
        )
    }

    fn list_for_case(&self, case_id: CaseId, page: &PageRequest) -> RepoResult<Page<ActivityEntry>> {
        self.list_where(
            " WHERE case_id = ?",
            vec![Value::Text(case_id.to_string())],
            page,
        )
    }
}

fn parse_activity_row(row: &Row<'_>) -> RepoResult<ActivityEntry> {
    let entity_type_text: String = row.get("entity_type")?;
    let entity_text: String = row.get("entity_id")?;
    let details_text: Option<String> = row.get("details")?;
    let details = details_text
        .map(|text| {
            serde_json::from_str(&text).map_err(|err| {
                RepoError::InvalidData(format!("invalid json in activity_log.details: {err}"))
            })
        })
        .transpose()?;

    Ok(ActivityEntry {
        id: row.get("id")?,
        actor_id: parse_optional_uuid(row.get("actor_id")?, "activity_log.actor_id")?,
        action: row.get("action")?,
        entity_type: parse_enum(&entity_type_text, "activity_log.entity_type", EntityType::parse)?,
        entity_id: parse_uuid(&entity_text, "activity_log.entity_id")?,
        case_id: parse_optional_uuid(row.get("case_id")?, "activity_log.case_id")?,
        details,
        created_at: row.get("created_at")?,
    })
}
