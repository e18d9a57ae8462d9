//! Case repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist case records, department participation and stage history.
//! - Provide scoped listing and aggregate statistics.
//!
//! # Invariants
//! - A case has at most one primary department; `cases.department_id`
//!   mirrors it.
//! - Stage updates and their history row are written in one transaction.
//! - Listing order is deterministic: `created_at DESC, id DESC`.

use crate::model::case::{
    Case, CaseDepartmentAssignment, CaseId, CasePriority, CaseStatus, StageChange,
};
use crate::model::directory::{DepartmentId, UserId};
use crate::model::stage::CaseStage;
use crate::repo::user_repo::like_pattern;
use crate::repo::{
    bool_to_int, parse_enum, parse_flag, parse_optional_uuid, parse_uuid, push_page, Page,
    PageRequest, RepoError, RepoResult,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::collections::BTreeMap;

const CASE_SELECT_SQL: &str = "SELECT
    id,
    case_number,
    title,
    description,
    property_address,
    property_municipality,
    property_province,
    owner_name,
    owner_identification,
    land_area,
    estimated_value,
    department_id,
    created_by,
    assigned_to,
    current_stage,
    status,
    priority,
    start_date,
    expected_end_date,
    actual_end_date,
    is_deleted,
    created_at,
    updated_at
FROM cases";

/// Visibility restriction applied to case queries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaseVisibility {
    /// Departments whose cases are visible; `None` = all departments.
    pub department_ids: Option<Vec<DepartmentId>>,
    /// Cases assigned to this user stay visible regardless of department.
    pub assignee: Option<UserId>,
}

impl CaseVisibility {
    pub fn unrestricted() -> Self {
        Self::default()
    }
}

/// Filters for case listing.
#[derive(Debug, Clone, Default)]
pub struct CaseListQuery {
    pub stage: Option<CaseStage>,
    pub status: Option<CaseStatus>,
    pub priority: Option<CasePriority>,
    /// Matches the owning department or any participating department.
    pub department_id: Option<DepartmentId>,
    pub assigned_to: Option<UserId>,
    /// Case-insensitive substring over number, title, owner and address.
    pub search: Option<String>,
    pub include_deleted: bool,
    pub visibility: CaseVisibility,
    pub page: PageRequest,
}

/// Aggregate counters over visible, non-deleted cases.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CaseStatistics {
    pub total: u64,
    pub by_stage: BTreeMap<String, u64>,
    pub by_status: BTreeMap<String, u64>,
    pub by_priority: BTreeMap<String, u64>,
    pub by_department: BTreeMap<String, u64>,
    /// Open cases whose expected end date has passed.
    pub overdue: u64,
    pub total_estimated_value: f64,
}

/// Repository interface for case operations.
pub trait CaseRepository {
    /// Inserts the case and its primary department assignment.
    fn insert_case(&self, case: &Case) -> RepoResult<()>;
    fn update_case(&self, case: &Case) -> RepoResult<()>;
    fn get_case(&self, id: CaseId) -> RepoResult<Option<Case>>;
    fn find_by_number(&self, case_number: &str) -> RepoResult<Option<Case>>;
    fn list_cases(&self, query: &CaseListQuery) -> RepoResult<Page<Case>>;
    /// Allocates the next sequence value for `year`, starting at 1.
    fn next_case_sequence(&self, year: i32) -> RepoResult<u32>;
    /// Persists the stage columns of `case` and appends one history row.
    fn record_stage_change(
        &self,
        case: &Case,
        from_stage: CaseStage,
        changed_by: UserId,
        notes: Option<&str>,
    ) -> RepoResult<StageChange>;
    fn list_stage_history(&self, id: CaseId) -> RepoResult<Vec<StageChange>>;
    fn list_case_departments(&self, id: CaseId) -> RepoResult<Vec<CaseDepartmentAssignment>>;
    /// Adds or updates a participating department. A primary assignment
    /// demotes the previous primary and moves `cases.department_id`.
    fn assign_department(
        &self,
        id: CaseId,
        department_id: DepartmentId,
        is_primary: bool,
        assigned_by: UserId,
        assigned_at: i64,
    ) -> RepoResult<CaseDepartmentAssignment>;
    /// Returns `false` when no such assignment exists.
    fn remove_department(&self, id: CaseId, department_id: DepartmentId) -> RepoResult<bool>;
    fn statistics(&self, visibility: &CaseVisibility, now_ms: i64) -> RepoResult<CaseStatistics>;
}

/// SQLite-backed case repository.
pub struct SqliteCaseRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteCaseRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl CaseRepository for SqliteCaseRepository<'_> {
    fn insert_case(&self, case: &Case) -> RepoResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO cases (
                id,
                case_number,
                title,
                description,
                property_address,
                property_municipality,
                property_province,
                owner_name,
                owner_identification,
                land_area,
                estimated_value,
                department_id,
                created_by,
                assigned_to,
                current_stage,
                status,
                priority,
                start_date,
                expected_end_date,
                actual_end_date,
                is_deleted,
                created_at,
                updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23
            );",
            params![
                case.id.to_string(),
                case.case_number.as_str(),
                case.title.as_str(),
                case.description.as_deref(),
                case.property_address.as_str(),
                case.property_municipality.as_deref(),
                case.property_province.as_deref(),
                case.owner_name.as_str(),
                case.owner_identification.as_deref(),
                case.land_area,
                case.estimated_value,
                case.department_id.to_string(),
                case.created_by.to_string(),
                case.assigned_to.map(|id| id.to_string()),
                case.current_stage.as_str(),
                case.status.as_str(),
                case.priority.as_str(),
                case.start_date,
                case.expected_end_date,
                case.actual_end_date,
                bool_to_int(case.is_deleted),
                case.created_at,
                case.updated_at,
            ],
        )?;
        tx.execute(
            "INSERT INTO case_departments (case_id, department_id, is_primary, assigned_by, assigned_at)
             VALUES (?1, ?2, 1, ?3, ?4);",
            params![
                case.id.to_string(),
                case.department_id.to_string(),
                case.created_by.to_string(),
                case.created_at,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn update_case(&self, case: &Case) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE cases
             SET
                title = ?2,
                description = ?3,
                property_address = ?4,
                property_municipality = ?5,
                property_province = ?6,
                owner_name = ?7,
                owner_identification = ?8,
                land_area = ?9,
                estimated_value = ?10,
                assigned_to = ?11,
                current_stage = ?12,
                status = ?13,
                priority = ?14,
                start_date = ?15,
                expected_end_date = ?16,
                actual_end_date = ?17,
                is_deleted = ?18,
                updated_at = ?19
             WHERE id = ?1;",
            params![
                case.id.to_string(),
                case.title.as_str(),
                case.description.as_deref(),
                case.property_address.as_str(),
                case.property_municipality.as_deref(),
                case.property_province.as_deref(),
                case.owner_name.as_str(),
                case.owner_identification.as_deref(),
                case.land_area,
                case.estimated_value,
                case.assigned_to.map(|id| id.to_string()),
                case.current_stage.as_str(),
                case.status.as_str(),
                case.priority.as_str(),
                case.start_date,
                case.expected_end_date,
                case.actual_end_date,
                bool_to_int(case.is_deleted),
                case.updated_at,
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("case", case.id));
        }
        Ok(())
    }

    fn get_case(&self, id: CaseId) -> RepoResult<Option<Case>> {
        self.conn
            .query_row(
                &format!("{CASE_SELECT_SQL} WHERE id = ?1;"),
                [id.to_string()],
                |row| Ok(parse_case_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn find_by_number(&self, case_number: &str) -> RepoResult<Option<Case>> {
        self.conn
            .query_row(
                &format!("{CASE_SELECT_SQL} WHERE case_number = ?1 COLLATE NOCASE;"),
                [case_number.trim()],
                |row| Ok(parse_case_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn list_cases(&self, query: &CaseListQuery) -> RepoResult<Page<Case>> {
        let mut filter = String::from(" WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if !query.include_deleted {
            filter.push_str(" AND is_deleted = 0");
        }
        push_visibility_filter(&mut filter, &mut bind_values, &query.visibility);

        if let Some(stage) = query.stage {
            filter.push_str(" AND current_stage = ?");
            bind_values.push(Value::Text(stage.as_str().to_string()));
        }
        if let Some(status) = query.status {
            filter.push_str(" AND status = ?");
            bind_values.push(Value::Text(status.as_str().to_string()));
        }
        if let Some(priority) = query.priority {
            filter.push_str(" AND priority = ?");
            bind_values.push(Value::Text(priority.as_str().to_string()));
        }
        if let Some(department_id) = query.department_id {
            filter.push_str(
                " AND (department_id = ? OR EXISTS (
                    SELECT 1 FROM case_departments cd
                    WHERE cd.case_id = cases.id AND cd.department_id = ?
                ))",
            );
            bind_values.push(Value::Text(department_id.to_string()));
            bind_values.push(Value::Text(department_id.to_string()));
        }
        if let Some(assignee) = query.assigned_to {
            filter.push_str(" AND assigned_to = ?");
            bind_values.push(Value::Text(assignee.to_string()));
        }
        if let Some(search) = query
            .search
            .as_ref()
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
        {
            filter.push_str(
                " AND (case_number LIKE ? ESCAPE '\\'
                    OR title LIKE ? ESCAPE '\\'
                    OR owner_name LIKE ? ESCAPE '\\'
                    OR property_address LIKE ? ESCAPE '\\')",
            );
            let pattern = like_pattern(search);
            for _ in 0..4 {
                bind_values.push(Value::Text(pattern.clone()));
            }
        }

        let total: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM cases{filter};"),
            params_from_iter(bind_values.iter()),
            |row| row.get(0),
        )?;

        let mut sql = format!("{CASE_SELECT_SQL}{filter} ORDER BY created_at DESC, id DESC");
        push_page(&mut sql, &mut bind_values, &query.page);

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut cases = Vec::new();
        while let Some(row) = rows.next()? {
            cases.push(parse_case_row(row)?);
        }

        Ok(Page {
            items: cases,
            total: total as u64,
            limit: query.page.applied_limit(),
            offset: query.page.offset,
        })
    }

    fn next_case_sequence(&self, year: i32) -> RepoResult<u32> {
        let value: i64 = self.conn.query_row(
            "INSERT INTO case_number_sequences (year, last_value)
             VALUES (?1, 1)
             ON CONFLICT(year) DO UPDATE SET last_value = last_value + 1
             RETURNING last_value;",
            [year],
            |row| row.get(0),
        )?;
        u32::try_from(value).map_err(|_| {
            RepoError::InvalidData(format!(
                "case number sequence out of range for {year}: {value}"
            ))
        })
    }

    fn record_stage_change(
        &self,
        case: &Case,
        from_stage: CaseStage,
        changed_by: UserId,
        notes: Option<&str>,
    ) -> RepoResult<StageChange> {
        let tx = self.conn.unchecked_transaction()?;
        let changed = tx.execute(
            "UPDATE cases
             SET
                current_stage = ?2,
                status = ?3,
                actual_end_date = ?4,
                updated_at = ?5
             WHERE id = ?1;",
            params![
                case.id.to_string(),
                case.current_stage.as_str(),
                case.status.as_str(),
                case.actual_end_date,
                case.updated_at,
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("case", case.id));
        }
        tx.execute(
            "INSERT INTO case_stage_history (case_id, from_stage, to_stage, changed_by, notes, changed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                case.id.to_string(),
                from_stage.as_str(),
                case.current_stage.as_str(),
                changed_by.to_string(),
                notes,
                case.updated_at,
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(StageChange {
            id,
            case_id: case.id,
            from_stage,
            to_stage: case.current_stage,
            changed_by,
            notes: notes.map(ToString::to_string),
            changed_at: case.updated_at,
        })
    }

    fn list_stage_history(&self, id: CaseId) -> RepoResult<Vec<StageChange>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, case_id, from_stage, to_stage, changed_by, notes, changed_at
             FROM case_stage_history
             WHERE case_id = ?1
             ORDER BY changed_at ASC, id ASC;",
        )?;
        let mut rows = stmt.query([id.to_string()])?;
        let mut history = Vec::new();
        while let Some(row) = rows.next()? {
            history.push(parse_stage_change_row(row)?);
        }
        Ok(history)
    }

    fn list_case_departments(&self, id: CaseId) -> RepoResult<Vec<CaseDepartmentAssignment>> {
        let mut stmt = self.conn.prepare(
            "SELECT case_id, department_id, is_primary, assigned_by, assigned_at
             FROM case_departments
             WHERE case_id = ?1
             ORDER BY is_primary DESC, assigned_at ASC, department_id ASC;",
        )?;
        let mut rows = stmt.query([id.to_string()])?;
        let mut assignments = Vec::new();
        while let Some(row) = rows.next()? {
            assignments.push(parse_assignment_row(row)?);
        }
        Ok(assignments)
    }

    fn assign_department(
        &self,
        id: CaseId,
        department_id: DepartmentId,
        is_primary: bool,
        assigned_by: UserId,
        assigned_at: i64,
    ) -> RepoResult<CaseDepartmentAssignment> {
        let tx = self.conn.unchecked_transaction()?;

        if is_primary {
            tx.execute(
                "UPDATE case_departments SET is_primary = 0 WHERE case_id = ?1 AND is_primary = 1;",
                [id.to_string()],
            )?;
            let changed = tx.execute(
                "UPDATE cases SET department_id = ?2, updated_at = ?3 WHERE id = ?1;",
                params![id.to_string(), department_id.to_string(), assigned_at],
            )?;
            if changed == 0 {
                return Err(RepoError::not_found("case", id));
            }
        }

        tx.execute(
            "INSERT INTO case_departments (case_id, department_id, is_primary, assigned_by, assigned_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(case_id, department_id) DO UPDATE SET
                is_primary = MAX(case_departments.is_primary, excluded.is_primary),
                assigned_by = excluded.assigned_by,
                assigned_at = excluded.assigned_at;",
            params![
                id.to_string(),
                department_id.to_string(),
                bool_to_int(is_primary),
                assigned_by.to_string(),
                assigned_at,
            ],
        )?;

        let assignment = tx.query_row(
            "SELECT case_id, department_id, is_primary, assigned_by, assigned_at
             FROM case_departments
             WHERE case_id = ?1 AND department_id = ?2;",
            params![id.to_string(), department_id.to_string()],
            |row| Ok(parse_assignment_row(row)),
        )??;
        tx.commit()?;
        Ok(assignment)
    }

    fn remove_department(&self, id: CaseId, department_id: DepartmentId) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "DELETE FROM case_departments WHERE case_id = ?1 AND department_id = ?2;",
            params![id.to_string(), department_id.to_string()],
        )?;
        Ok(changed > 0)
    }

    fn statistics(&self, visibility: &CaseVisibility, now_ms: i64) -> RepoResult<CaseStatistics> {
        let mut filter = String::from(" WHERE is_deleted = 0");
        let mut bind_values: Vec<Value> = Vec::new();
        push_visibility_filter(&mut filter, &mut bind_values, visibility);

        let mut stats = CaseStatistics::default();
        for (column, target) in [
            ("current_stage", &mut stats.by_stage),
            ("status", &mut stats.by_status),
            ("priority", &mut stats.by_priority),
            ("department_id", &mut stats.by_department),
        ] {
            let mut stmt = self.conn.prepare(&format!(
                "SELECT {column}, COUNT(*) FROM cases{filter} GROUP BY {column} ORDER BY {column} ASC;"
            ))?;
            let mut rows = stmt.query(params_from_iter(bind_values.iter()))?;
            while let Some(row) = rows.next()? {
                let key: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                target.insert(key, count as u64);
            }
        }

        let (total, value): (i64, f64) = self.conn.query_row(
            &format!("SELECT COUNT(*), COALESCE(SUM(estimated_value), 0.0) FROM cases{filter};"),
            params_from_iter(bind_values.iter()),
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        stats.total = total as u64;
        stats.total_estimated_value = value;

        let mut overdue_binds = bind_values.clone();
        overdue_binds.push(Value::Integer(now_ms));
        let overdue: i64 = self.conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM cases{filter}
                 AND expected_end_date IS NOT NULL
                 AND expected_end_date < ?
                 AND current_stage NOT IN ('COMPLETED', 'CANCELLED')
                 AND status NOT IN ('completed', 'archived');"
            ),
            params_from_iter(overdue_binds.iter()),
            |row| row.get(0),
        )?;
        stats.overdue = overdue as u64;

        Ok(stats)
    }
}

fn push_visibility_filter(
    sql: &mut String,
    bind_values: &mut Vec<Value>,
    visibility: &CaseVisibility,
) {
    let Some(ids) = visibility.department_ids.as_ref() else {
        return;
    };

    let mut clauses = Vec::new();
    if !ids.is_empty() {
        let placeholders = vec!["?"; ids.len()].join(", ");
        clauses.push(format!("department_id IN ({placeholders})"));
        bind_values.extend(ids.iter().map(|id| Value::Text(id.to_string())));
        clauses.push(format!(
            "EXISTS (SELECT 1 FROM case_departments cd
                     WHERE cd.case_id = cases.id AND cd.department_id IN ({placeholders}))"
        ));
        bind_values.extend(ids.iter().map(|id| Value::Text(id.to_string())));
    }
    if let Some(assignee) = visibility.assignee {
        clauses.push("assigned_to = ?".to_string());
        bind_values.push(Value::Text(assignee.to_string()));
    }

    if clauses.is_empty() {
        sql.push_str(" AND 0 = 1");
    } else {
        sql.push_str(&format!(" AND ({})", clauses.join(" OR ")));
    }
}

fn parse_case_row(row: &Row<'_>) -> RepoResult<Case> {
    let id_text: String = row.get("id")?;
    let department_text: String = row.get("department_id")?;
    let created_by_text: String = row.get("created_by")?;
    let stage_text: String = row.get("current_stage")?;
    let status_text: String = row.get("status")?;
    let priority_text: String = row.get("priority")?;

    Ok(Case {
        id: parse_uuid(&id_text, "cases.id")?,
        case_number: row.get("case_number")?,
        title: row.get("title")?,
        description: row.get("description")?,
        property_address: row.get("property_address")?,
        property_municipality: row.get("property_municipality")?,
        property_province: row.get("property_province")?,
        owner_name: row.get("owner_name")?,
        owner_identification: row.get("owner_identification")?,
        land_area: row.get("land_area")?,
        estimated_value: row.get("estimated_value")?,
        department_id: parse_uuid(&department_text, "cases.department_id")?,
        created_by: parse_uuid(&created_by_text, "cases.created_by")?,
        assigned_to: parse_optional_uuid(row.get("assigned_to")?, "cases.assigned_to")?,
        current_stage: parse_enum(&stage_text, "cases.current_stage", CaseStage::parse)?,
        status: parse_enum(&status_text, "cases.status", CaseStatus::parse)?,
        priority: parse_enum(&priority_text, "cases.priority", CasePriority::parse)?,
        start_date: row.get("start_date")?,
        expected_end_date: row.get("expected_end_date")?,
        actual_end_date: row.get("actual_end_date")?,
        is_deleted: parse_flag(row.get("is_deleted")?, "cases.is_deleted")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn parse_stage_change_row(row: &Row<'_>) -> RepoResult<StageChange> {
    let case_text: String = row.get("case_id")?;
    let from_text: String = row.get("from_stage")?;
    let to_text: String = row.get("to_stage")?;
    let changed_by_text: String = row.get("changed_by")?;
    Ok(StageChange {
        id: row.get("id")?,
        case_id: parse_uuid(&case_text, "case_stage_history.case_id")?,
        from_stage: parse_enum(&from_text, "case_stage_history.from_stage", CaseStage::parse)?,
        to_stage: parse_enum(&to_text, "case_stage_history.to_stage", CaseStage::parse)?,
        changed_by: parse_uuid(&changed_by_text, "case_stage_history.changed_by")?,
        notes: row.get("notes")?,
        changed_at: row.get("changed_at")?,
    })
}

fn parse_assignment_row(row: &Row<'_>) -> RepoResult<CaseDepartmentAssignment> {
    let case_text: String = row.get("case_id")?;
    let department_text: String = row.get("department_id")?;
    Ok(CaseDepartmentAssignment {
        case_id: parse_uuid(&case_text, "case_departments.case_id")?,
        department_id: parse_uuid(&department_text, "case_departments.department_id")?,
        is_primary: parse_flag(row.get("is_primary")?, "case_departments.is_primary")?,
        assigned_by: parse_optional_uuid(row.get("assigned_by")?, "case_departments.assigned_by")?,
        assigned_at: row.get("assigned_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::{push_visibility_filter, CaseVisibility};
    use rusqlite::types::Value;
    use uuid::Uuid;

    #[test]
    fn unrestricted_visibility_adds_no_clause() {
        let mut sql = String::new();
        let mut binds = Vec::new();
        push_visibility_filter(&mut sql, &mut binds, &CaseVisibility::unrestricted());
        assert!(sql.is_empty());
        assert!(binds.is_empty());
    }

    #[test]
    fn empty_scope_without_assignee_matches_nothing() {
        let mut sql = String::new();
        let mut binds = Vec::new();
        let visibility = CaseVisibility {
            department_ids: Some(Vec::new()),
            assignee: None,
        };
        push_visibility_filter(&mut sql, &mut binds, &visibility);
        assert_eq!(sql, " AND 0 = 1");
    }

    #[test]
    fn scope_binds_departments_twice_plus_assignee() {
        let mut sql = String::new();
        let mut binds = Vec::new();
        let user = Uuid::new_v4();
        let visibility = CaseVisibility {
            department_ids: Some(vec![Uuid::new_v4(), Uuid::new_v4()]),
            assignee: Some(user),
        };
        push_visibility_filter(&mut sql, &mut binds, &visibility);
        assert_eq!(binds.len(), 5);
        assert_eq!(binds[4], Value::Text(user.to_string()));
        assert!(sql.contains("assigned_to = ?"));
    }
}
