//! Case task use-cases and dependency checks.
//!
//! # Invariants
//! - A dependency links two tasks of the same case and never closes a cycle.
//! - A task starts or completes only when every dependency is completed.

use crate::auth::{Actor, Permission};
use crate::model::activity::EntityType;
use crate::model::case::{Case, CaseId, CasePriority};
use crate::model::directory::{DepartmentId, UserId};
use crate::model::notification::{NotificationKind, NotificationPriority};
use crate::model::task::{Task, TaskId, TaskKind, TaskStatus};
use crate::repo::case_repo::{CaseRepository, SqliteCaseRepository};
use crate::repo::department_repo::{DepartmentRepository, SqliteDepartmentRepository};
use crate::repo::notification_repo::SqliteNotificationRepository;
use crate::repo::task_repo::{SqliteTaskRepository, TaskRepository};
use crate::repo::user_repo::{SqliteUserRepository, UserRepository};
use crate::service::notification_service::{NewNotification, NotificationService};
use crate::service::{
    finish, load_visible_case, non_blank, record_activity, require, required, ServiceContext,
    ServiceError, ServiceResult,
};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub kind: TaskKind,
    pub priority: Option<CasePriority>,
    /// Defaults to the case's primary department.
    pub department_id: Option<DepartmentId>,
    pub assigned_to: Option<UserId>,
    pub due_at: Option<i64>,
}

pub struct TaskService<'a> {
    ctx: ServiceContext<'a>,
}

impl<'a> TaskService<'a> {
    pub fn new(ctx: ServiceContext<'a>) -> Self {
        Self { ctx }
    }

    fn repo(&self) -> SqliteTaskRepository<'a> {
        SqliteTaskRepository::new(self.ctx.conn)
    }

    fn notifications(&self) -> NotificationService<SqliteNotificationRepository<'a>> {
        NotificationService::new(SqliteNotificationRepository::new(self.ctx.conn))
    }

    pub fn create_task(
        &self,
        actor: &Actor,
        case_id: CaseId,
        input: NewTask,
    ) -> ServiceResult<Task> {
        let started = Instant::now();
        finish("task_create", started, self.create_inner(actor, case_id, input))
    }

    fn create_inner(&self, actor: &Actor, case_id: CaseId, input: NewTask) -> ServiceResult<Task> {
        require(actor, Permission::TaskManage)?;
        let case = load_visible_case(&self.ctx, actor, case_id)?;
        if case.current_stage.is_terminal() {
            return Err(ServiceError::Conflict(format!(
                "case {} is closed",
                case.case_number
            )));
        }
        let title = required(&input.title, "title")?;
        let department_id = input.department_id.unwrap_or(case.department_id);
        if SqliteDepartmentRepository::new(self.ctx.conn)
            .get_department(department_id)?
            .is_none()
        {
            return Err(ServiceError::not_found("department", department_id));
        }
        if let Some(assignee) = input.assigned_to {
            self.require_active_user(assignee)?;
        }

        let now = self.ctx.now();
        let task = Task {
            id: Uuid::new_v4(),
            case_id: case.id,
            department_id,
            assigned_to: input.assigned_to,
            title,
            description: non_blank(input.description),
            kind: input.kind,
            priority: input.priority.unwrap_or(case.priority),
            status: TaskStatus::Pending,
            due_at: input.due_at,
            completed_at: None,
            result: None,
            created_at: now,
            updated_at: now,
        };
        self.repo().insert_task(&task)?;
        record_activity(
            &self.ctx,
            Some(actor.user_id),
            "task.created",
            (EntityType::Task, task.id),
            Some(case.id),
            Some(json!({ "kind": task.kind.as_str() })),
        )?;
        if let Some(assignee) = task.assigned_to {
            self.notify_assignment(actor, &case, &task, assignee)?;
        }
        Ok(task)
    }

    /// Tasks are visible to their assignee and to anyone who sees the case.
    pub fn get_task(&self, actor: &Actor, id: TaskId) -> ServiceResult<Task> {
        Ok(self.load(actor, id)?.0)
    }

    pub fn assign_task(
        &self,
        actor: &Actor,
        id: TaskId,
        assignee: Option<UserId>,
    ) -> ServiceResult<Task> {
        let started = Instant::now();
        finish("task_assign", started, self.assign_inner(actor, id, assignee))
    }

    fn assign_inner(
        &self,
        actor: &Actor,
        id: TaskId,
        assignee: Option<UserId>,
    ) -> ServiceResult<Task> {
        require(actor, Permission::TaskManage)?;
        let (mut task, case) = self.load(actor, id)?;
        if !task.status.is_open() {
            return Err(ServiceError::Conflict(format!(
                "task is {}",
                task.status.as_str()
            )));
        }
        if task.assigned_to == assignee {
            return Ok(task);
        }
        if let Some(user_id) = assignee {
            self.require_active_user(user_id)?;
        }
        task.assigned_to = assignee;
        task.updated_at = self.ctx.now();
        self.repo().update_task(&task)?;
        record_activity(
            &self.ctx,
            Some(actor.user_id),
            "task.assigned",
            (EntityType::Task, task.id),
            Some(task.case_id),
            Some(json!({ "assigned_to": assignee })),
        )?;
        if let Some(user_id) = assignee {
            self.notify_assignment(actor, &case, &task, user_id)?;
        }
        Ok(task)
    }

    /// Moves a pending task to in-progress once its dependencies are done.
    pub fn start_task(&self, actor: &Actor, id: TaskId) -> ServiceResult<Task> {
        let (mut task, _) = self.load_for_worker(actor, id)?;
        if task.status == TaskStatus::InProgress {
            return Ok(task);
        }
        self.ensure_dependencies_done(&task)?;
        task.status = TaskStatus::InProgress;
        task.updated_at = self.ctx.now();
        self.repo().update_task(&task)?;
        Ok(task)
    }

    /// Completes a task and tells assignees of newly unblocked tasks.
    pub fn complete_task(
        &self,
        actor: &Actor,
        id: TaskId,
        result: Option<String>,
    ) -> ServiceResult<Task> {
        let started = Instant::now();
        finish("task_complete", started, self.complete_inner(actor, id, result))
    }

    fn complete_inner(
        &self,
        actor: &Actor,
        id: TaskId,
        result: Option<String>,
    ) -> ServiceResult<Task> {
        let (mut task, case) = self.load_for_worker(actor, id)?;
        self.ensure_dependencies_done(&task)?;

        let now = self.ctx.now();
        task.status = TaskStatus::Completed;
        task.completed_at = Some(now);
        task.result = non_blank(result);
        task.updated_at = now;
        let repo = self.repo();
        repo.update_task(&task)?;
        record_activity(
            &self.ctx,
            Some(actor.user_id),
            "task.completed",
            (EntityType::Task, task.id),
            Some(task.case_id),
            None,
        )?;

        let edges = repo.list_case_dependency_edges(task.case_id)?;
        for dependent_id in dependents_of(&edges, task.id) {
            let Some(dependent) = repo.get_task(dependent_id)? else {
                continue;
            };
            let Some(assignee) = dependent.assigned_to else {
                continue;
            };
            if dependent.status == TaskStatus::Pending && self.dependencies_done(&dependent)? {
                let draft = NewNotification {
                    kind: NotificationKind::TaskAssigned,
                    priority: NotificationPriority::Normal,
                    title: format!("Task ready: {}", dependent.title),
                    message: format!(
                        "All prerequisites are complete on case {}.",
                        case.case_number
                    ),
                    case_id: Some(case.id),
                };
                self.notifications().notify(assignee, &draft, now)?;
            }
        }
        Ok(task)
    }

    pub fn cancel_task(&self, actor: &Actor, id: TaskId) -> ServiceResult<Task> {
        require(actor, Permission::TaskManage)?;
        let (mut task, _) = self.load(actor, id)?;
        if !task.status.is_open() {
            return Err(ServiceError::Conflict(format!(
                "task is {}",
                task.status.as_str()
            )));
        }
        task.status = TaskStatus::Cancelled;
        task.updated_at = self.ctx.now();
        self.repo().update_task(&task)?;
        record_activity(
            &self.ctx,
            Some(actor.user_id),
            "task.cancelled",
            (EntityType::Task, task.id),
            Some(task.case_id),
            None,
        )?;
        Ok(task)
    }

    /// Makes `task_id` wait for `depends_on`.
    pub fn add_dependency(
        &self,
        actor: &Actor,
        task_id: TaskId,
        depends_on: TaskId,
    ) -> ServiceResult<()> {
        let started = Instant::now();
        finish(
            "task_add_dependency",
            started,
            self.add_dependency_inner(actor, task_id, depends_on),
        )
    }

    fn add_dependency_inner(
        &self,
        actor: &Actor,
        task_id: TaskId,
        depends_on: TaskId,
    ) -> ServiceResult<()> {
        require(actor, Permission::TaskManage)?;
        if task_id == depends_on {
            return Err(ServiceError::validation("a task cannot depend on itself"));
        }
        let (task, _) = self.load(actor, task_id)?;
        let (prerequisite, _) = self.load(actor, depends_on)?;
        if task.case_id != prerequisite.case_id {
            return Err(ServiceError::validation(
                "dependencies must belong to the same case",
            ));
        }
        let repo = self.repo();
        if creates_cycle(
            &repo.list_case_dependency_edges(task.case_id)?,
            task_id,
            depends_on,
        ) {
            return Err(ServiceError::Conflict(
                "dependency would create a cycle".to_string(),
            ));
        }
        repo.add_dependency(task_id, depends_on)?;
        record_activity(
            &self.ctx,
            Some(actor.user_id),
            "task.dependency_added",
            (EntityType::Task, task_id),
            Some(task.case_id),
            Some(json!({ "depends_on": depends_on })),
        )
    }

    pub fn dependencies(&self, actor: &Actor, id: TaskId) -> ServiceResult<Vec<Task>> {
        let (task, _) = self.load(actor, id)?;
        let repo = self.repo();
        let mut prerequisites = Vec::new();
        for dependency_id in repo.list_dependencies(task.id)? {
            if let Some(prerequisite) = repo.get_task(dependency_id)? {
                prerequisites.push(prerequisite);
            }
        }
        Ok(prerequisites)
    }

    /// Whether every dependency of `id` is completed.
    pub fn can_start(&self, actor: &Actor, id: TaskId) -> ServiceResult<bool> {
        let (task, _) = self.load(actor, id)?;
        self.dependencies_done(&task)
    }

    pub fn list_case_tasks(&self, actor: &Actor, case_id: CaseId) -> ServiceResult<Vec<Task>> {
        let case = load_visible_case(&self.ctx, actor, case_id)?;
        Ok(self.repo().list_case_tasks(case.id)?)
    }

    pub fn list_my_tasks(&self, actor: &Actor, open_only: bool) -> ServiceResult<Vec<Task>> {
        Ok(self.repo().list_assigned_tasks(actor.user_id, open_only)?)
    }

    fn load(&self, actor: &Actor, id: TaskId) -> ServiceResult<(Task, Case)> {
        let task = self
            .repo()
            .get_task(id)?
            .ok_or_else(|| ServiceError::not_found("task", id))?;
        let case = if task.assigned_to == Some(actor.user_id) {
            SqliteCaseRepository::new(self.ctx.conn)
                .get_case(task.case_id)?
                .filter(|case| !case.is_deleted)
                .ok_or_else(|| ServiceError::not_found("task", id))?
        } else {
            load_visible_case(&self.ctx, actor, task.case_id)?
        };
        Ok((task, case))
    }

    /// Assignee or a `TaskManage` holder, on an open task.
    fn load_for_worker(&self, actor: &Actor, id: TaskId) -> ServiceResult<(Task, Case)> {
        let (task, case) = self.load(actor, id)?;
        if task.assigned_to != Some(actor.user_id) {
            require(actor, Permission::TaskManage)?;
        }
        if !task.status.is_open() {
            return Err(ServiceError::Conflict(format!(
                "task is {}",
                task.status.as_str()
            )));
        }
        Ok((task, case))
    }

    fn dependencies_done(&self, task: &Task) -> ServiceResult<bool> {
        let repo = self.repo();
        for dependency_id in repo.list_dependencies(task.id)? {
            let done = repo
                .get_task(dependency_id)?
                .is_some_and(|dependency| dependency.status == TaskStatus::Completed);
            if !done {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn ensure_dependencies_done(&self, task: &Task) -> ServiceResult<()> {
        if self.dependencies_done(task)? {
            Ok(())
        } else {
            Err(ServiceError::Conflict(
                "task has unfinished dependencies".to_string(),
            ))
        }
    }

    fn notify_assignment(
        &self,
        actor: &Actor,
        case: &Case,
        task: &Task,
        assignee: UserId,
    ) -> ServiceResult<()> {
        if assignee == actor.user_id {
            return Ok(());
        }
        let draft = NewNotification {
            kind: NotificationKind::TaskAssigned,
            priority: if task.priority >= CasePriority::High {
                NotificationPriority::High
            } else {
                NotificationPriority::Normal
            },
            title: format!("Task assigned: {}", task.title),
            message: format!("New {} task on case {}.", task.kind.as_str(), case.case_number),
            case_id: Some(case.id),
        };
        self.notifications()
            .notify(assignee, &draft, self.ctx.now())?;
        Ok(())
    }

    fn require_active_user(&self, id: UserId) -> ServiceResult<()> {
        match SqliteUserRepository::new(self.ctx.conn).get_user(id)? {
            Some(user) if user.is_active => Ok(()),
            Some(_) => Err(ServiceError::validation(format!("user {id} is inactive"))),
            None => Err(ServiceError::not_found("user", id)),
        }
    }
}

/// Whether adding `task -> depends_on` closes a cycle over `edges`.
///
/// Edges are `(task, depends_on)`; a cycle exists when `depends_on` already
/// reaches `task`.
pub fn creates_cycle(edges: &[(TaskId, TaskId)], task: TaskId, depends_on: TaskId) -> bool {
    let mut adjacency: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
    for (from, to) in edges {
        adjacency.entry(*from).or_default().push(*to);
    }

    let mut visited = HashSet::new();
    let mut stack = vec![depends_on];
    while let Some(current) = stack.pop() {
        if current == task {
            return true;
        }
        if !visited.insert(current) {
            continue;
        }
        if let Some(next) = adjacency.get(&current) {
            stack.extend(next.iter().copied());
        }
    }
    false
}

fn dependents_of(edges: &[(TaskId, TaskId)], prerequisite: TaskId) -> Vec<TaskId> {
    edges
        .iter()
        .filter(|(_, depends_on)| *depends_on == prerequisite)
        .map(|(task, _)| *task)
        .collect()
}
