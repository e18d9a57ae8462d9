//! Task repository contracts and SQLite implementation.
//!
//! # Invariants
//! - Dependency edges are stored as `task_id -> depends_on`.
//! - Same-case and acyclicity checks live in the service.

use crate::model::case::{CaseId, CasePriority};
use crate::model::directory::UserId;
use crate::model::task::{Task, TaskId, TaskKind, TaskStatus};
use crate::repo::{parse_enum, parse_optional_uuid, parse_uuid, RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row};

const TASK_SELECT_SQL: &str = "SELECT
    id,
    case_id,
    department_id,
    assigned_to,
    title,
    description,
    kind,
    priority,
    status,
    due_at,
    completed_at,
    result,
    created_at,
    updated_at
FROM tasks";

/// Repository interface for task operations.
pub trait TaskRepository {
    fn insert_task(&self, task: &Task) -> RepoResult<()>;
    fn update_task(&self, task: &Task) -> RepoResult<()>;
    fn get_task(&self, id: TaskId) -> RepoResult<Option<Task>>;
    fn list_case_tasks(&self, case_id: CaseId) -> RepoResult<Vec<Task>>;
    fn list_assigned_tasks(&self, user_id: UserId, open_only: bool) -> RepoResult<Vec<Task>>;
    fn add_dependency(&self, task_id: TaskId, depends_on: TaskId) -> RepoResult<()>;
    /// Direct prerequisites of `task_id`.
    fn list_dependencies(&self, task_id: TaskId) -> RepoResult<Vec<TaskId>>;
    /// All dependency edges among tasks of one case.
    fn list_case_dependency_edges(&self, case_id: CaseId) -> RepoResult<Vec<(TaskId, TaskId)>>;
}

/// SQLite-backed task repository.
pub struct SqliteTaskRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTaskRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn collect_tasks(&self, sql: &str, params: impl rusqlite::Params) -> RepoResult<Vec<Task>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        let mut tasks = Vec::new();
        while let Some(row) = rows.next()? {
            tasks.push(parse_task_row(row)?);
        }
        Ok(tasks)
    }
}

impl TaskRepository for SqliteTaskRepository<'_> {
    fn insert_task(&self, task: &Task) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO tasks (
                id,
                case_id,
                department_id,
                assigned_to,
                title,
                description,
                kind,
                priority,
                status,
                due_at,
                completed_at,
                result,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14);",
            params![
                task.id.to_string(),
                task.case_id.to_string(),
                task.department_id.to_string(),
                task.assigned_to.map(|id| id.to_string()),
                task.title.as_str(),
                task.description.as_deref(),
                task.kind.as_str(),
                task.priority.as_str(),
                task.status.as_str(),
                task.due_at,
                task.completed_at,
                task.result.as_deref(),
                task.created_at,
                task.updated_at,
            ],
        )?;
        Ok(())
    }

    fn update_task(&self, task: &Task) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE tasks
             SET
                department_id = ?2,
                assigned_to = ?3,
                title = ?4,
                description = ?5,
                kind = ?6,
                priority = ?7,
                status = ?8,
                due_at = ?9,
                completed_at = ?10,
                result = ?11,
                updated_at = ?12
             WHERE id = ?1;",
            params![
                task.id.to_string(),
                task.department_id.to_string(),
                task.assigned_to.map(|id| id.to_string()),
                task.title.as_str(),
                task.description.as_deref(),
                task.kind.as_str(),
                task.priority.as_str(),
                task.status.as_str(),
                task.due_at,
                task.completed_at,
                task.result.as_deref(),
                task.updated_at,
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("task", task.id));
        }
        Ok(())
    }

    fn get_task(&self, id: TaskId) -> RepoResult<Option<Task>> {
        self.conn
            .query_row(
                &format!("{TASK_SELECT_SQL} WHERE id = ?1;"),
                [id.to_string()],
                |row| Ok(parse_task_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn list_case_tasks(&self, case_id: CaseId) -> RepoResult<Vec<Task>> {
        self.collect_tasks(
            &format!(
                "{TASK_SELECT_SQL}
                 WHERE case_id = ?1
                 ORDER BY due_at IS NULL ASC, due_at ASC, created_at ASC, id ASC;"
            ),
            [case_id.to_string()],
        )
    }

    fn list_assigned_tasks(&self, user_id: UserId, open_only: bool) -> RepoResult<Vec<Task>> {
        self.collect_tasks(
            &format!(
                "{TASK_SELECT_SQL}
                 WHERE assigned_to = ?1
                   AND (?2 = 0 OR status IN ('pending', 'in_progress', 'blocked'))
                 ORDER BY due_at IS NULL ASC, due_at ASC, created_at ASC, id ASC;"
            ),
            params![user_id.to_string(), i64::from(open_only)],
        )
    }

    fn add_dependency(&self, task_id: TaskId, depends_on: TaskId) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO task_dependencies (task_id, depends_on)
             VALUES (?1, ?2)
             ON CONFLICT(task_id, depends_on) DO NOTHING;",
            params![task_id.to_string(), depends_on.to_string()],
        )?;
        Ok(())
    }

    fn list_dependencies(&self, task_id: TaskId) -> RepoResult<Vec<TaskId>> {
        let mut stmt = self.conn.prepare(
            "SELECT depends_on FROM task_dependencies WHERE task_id = ?1 ORDER BY depends_on ASC;",
        )?;
        let mut rows = stmt.query([task_id.to_string()])?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            let text: String = row.get(0)?;
            ids.push(parse_uuid(&text, "task_dependencies.depends_on")?);
        }
        Ok(ids)
    }

    fn list_case_dependency_edges(&self, case_id: CaseId) -> RepoResult<Vec<(TaskId, TaskId)>> {
        let mut stmt = self.conn.prepare(
            "SELECT d.task_id, d.depends_on
             FROM task_dependencies d
             JOIN tasks t ON t.id = d.task_id
             WHERE t.case_id = ?1
             ORDER BY d.task_id ASC, d.depends_on ASC;",
        )?;
        let mut rows = stmt.query([case_id.to_string()])?;
        let mut edges = Vec::new();
        while let Some(row) = rows.next()? {
            let from_text: String = row.get(0)?;
            let to_text: String = row.get(1)?;
            edges.push((
                parse_uuid(&from_text, "task_dependencies.task_id")?,
                parse_uuid(&to_text, "task_dependencies.depends_on")?,
            ));
        }
        Ok(edges)
    }
}

fn parse_task_row(row: &Row<'_>) -> RepoResult<Task> {
    let id_text: String = row.get("id")?;
    let case_text: String = row.get("case_id")?;
    let department_text: String = row.get("department_id")?;
    let kind_text: String = row.get("kind")?;
    let priority_text: String = row.get("priority")?;
    let status_text: String = row.get("status")?;
    Ok(Task {
        id: parse_uuid(&id_text, "tasks.id")?,
        case_id: parse_uuid(&case_text, "tasks.case_id")?,
        department_id: parse_uuid(&department_text, "tasks.department_id")?,
        assigned_to: parse_optional_uuid(row.get("assigned_to")?, "tasks.assigned_to")?,
        title: row.get("title")?,
        description: row.get("description")?,
        kind: parse_enum(&kind_text, "tasks.kind", TaskKind::parse)?,
        priority: parse_enum(&priority_text, "tasks.priority", CasePriority::parse)?,
        status: parse_enum(&status_text, "tasks.status", TaskStatus::parse)?,
        due_at: row.get("due_at")?,
        completed_at: row.get("completed_at")?,
        result: row.get("result")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
