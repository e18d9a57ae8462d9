//! Case use-case service.
//!
//! # Responsibility
//! - Create, read, update and soft-delete expropriation cases.
//! - Drive the stage workflow and its history.
//! - Manage assignee and participating departments.
//!
//! # Invariants
//! - Case numbers are allocated once, `EXP-<year>-<seq>`, per calendar year.
//! - A stage change is only persisted when `CaseStage::can_transition_to`
//!   allows it, and always writes one history row.
//! - A case has exactly one primary department.

use crate::auth::{Actor, Permission};
use crate::model::activity::EntityType;
use crate::model::case::{
    format_case_number, validate_case_fields, year_of_epoch_ms, Case, CaseDepartmentAssignment,
    CaseFields, CaseId, CasePriority, CaseStatus, StageChange,
};
use crate::model::directory::{DepartmentId, User, UserId};
use crate::model::notification::{NotificationKind, NotificationPriority};
use crate::model::stage::CaseStage;
use crate::repo::case_repo::{CaseListQuery, CaseRepository, CaseStatistics, SqliteCaseRepository};
use crate::repo::department_repo::{DepartmentRepository, SqliteDepartmentRepository};
use crate::repo::notification_repo::SqliteNotificationRepository;
use crate::repo::user_repo::{SqliteUserRepository, UserRepository};
use crate::repo::Page;
use crate::service::notification_service::{NewNotification, NotificationService};
use crate::service::{
    case_visibility, ensure_case_visible, finish, load_visible_case, non_blank, record_activity,
    require, scope_for, ServiceContext, ServiceError, ServiceResult,
};
use log::info;
use serde_json::json;
use std::collections::BTreeSet;
use std::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewCase {
    pub title: String,
    pub description: Option<String>,
    pub property_address: String,
    pub property_municipality: Option<String>,
    pub property_province: Option<String>,
    pub owner_name: String,
    pub owner_identification: Option<String>,
    pub land_area: Option<f64>,
    pub estimated_value: Option<f64>,
    /// Defaults to the caller's department.
    pub department_id: Option<DepartmentId>,
    pub assigned_to: Option<UserId>,
    pub priority: Option<CasePriority>,
    pub start_date: Option<i64>,
    pub expected_end_date: Option<i64>,
}

/// Partial field update; `None` keeps the stored value, `Some(None)` clears
/// an optional column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaseUpdate {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub property_address: Option<String>,
    pub property_municipality: Option<Option<String>>,
    pub property_province: Option<Option<String>>,
    pub owner_name: Option<String>,
    pub owner_identification: Option<Option<String>>,
    pub land_area: Option<Option<f64>>,
    pub estimated_value: Option<Option<f64>>,
    pub priority: Option<CasePriority>,
    pub start_date: Option<Option<i64>>,
    pub expected_end_date: Option<Option<i64>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaseFilter {
    pub stage: Option<CaseStage>,
    pub status: Option<CaseStatus>,
    pub priority: Option<CasePriority>,
    pub department_id: Option<DepartmentId>,
    pub assigned_to: Option<UserId>,
    pub search: Option<String>,
    pub include_deleted: bool,
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Result of a successful stage transition.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionOutcome {
    pub case: Case,
    pub change: StageChange,
    /// Recipients that received a stored notification.
    pub notified: usize,
}

pub struct CaseService<'a> {
    ctx: ServiceContext<'a>,
}

impl<'a> CaseService<'a> {
    pub fn new(ctx: ServiceContext<'a>) -> Self {
        Self { ctx }
    }

    fn repo(&self) -> SqliteCaseRepository<'a> {
        SqliteCaseRepository::new(self.ctx.conn)
    }

    fn notifications(&self) -> NotificationService<SqliteNotificationRepository<'a>> {
        NotificationService::new(SqliteNotificationRepository::new(self.ctx.conn))
    }

    pub fn create_case(&self, actor: &Actor, input: NewCase) -> ServiceResult<Case> {
        let started = Instant::now();
        finish("case_create", started, self.create_inner(actor, input))
    }

    fn create_inner(&self, actor: &Actor, input: NewCase) -> ServiceResult<Case> {
        require(actor, Permission::CaseCreate)?;
        validate_case_fields(&CaseFields {
            title: &input.title,
            property_address: &input.property_address,
            owner_name: &input.owner_name,
            land_area: input.land_area,
            estimated_value: input.estimated_value,
            start_date: input.start_date,
            expected_end_date: input.expected_end_date,
        })?;

        let department_id = input
            .department_id
            .or(actor.department_id)
            .ok_or_else(|| ServiceError::validation("`department_id` is required"))?;
        self.require_active_department(department_id)?;
        if !scope_for(&self.ctx, actor)?.contains(department_id) {
            return Err(ServiceError::forbidden(
                "cannot open cases for a department outside the caller's scope",
            ));
        }
        if let Some(assignee) = input.assigned_to {
            self.require_active_user(assignee)?;
        }

        let repo = self.repo();
        let now = self.ctx.now();
        let sequence = repo.next_case_sequence(year_of_epoch_ms(now))?;
        let case = Case {
            id: Uuid::new_v4(),
            case_number: format_case_number(year_of_epoch_ms(now), sequence),
            title: input.title.trim().to_string(),
            description: non_blank(input.description),
            property_address: input.property_address.trim().to_string(),
            property_municipality: non_blank(input.property_municipality),
            property_province: non_blank(input.property_province),
            owner_name: input.owner_name.trim().to_string(),
            owner_identification: non_blank(input.owner_identification),
            land_area: input.land_area,
            estimated_value: input.estimated_value,
            department_id,
            created_by: actor.user_id,
            assigned_to: input.assigned_to,
            current_stage: CaseStage::first(),
            status: CaseStatus::Pending,
            priority: input.priority.unwrap_or(CasePriority::Medium),
            start_date: input.start_date,
            expected_end_date: input.expected_end_date,
            actual_end_date: None,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        };
        repo.insert_case(&case)?;
        record_activity(
            &self.ctx,
            Some(actor.user_id),
            "case.created",
            (EntityType::Case, case.id),
            Some(case.id),
            Some(json!({ "case_number": case.case_number })),
        )?;
        info!(
            "event=case_number_allocated module=service status=ok case_number={}",
            case.case_number
        );

        if let Some(assignee) = case.assigned_to {
            self.notify_assignment(actor, &case, assignee)?;
        }
        Ok(case)
    }

    pub fn get_case(&self, actor: &Actor, id: CaseId) -> ServiceResult<Case> {
        require(actor, Permission::CaseRead)?;
        load_visible_case(&self.ctx, actor, id)
    }

    pub fn get_by_number(&self, actor: &Actor, case_number: &str) -> ServiceResult<Case> {
        require(actor, Permission::CaseRead)?;
        let case = self
            .repo()
            .find_by_number(case_number.trim())?
            .filter(|case| !case.is_deleted)
            .ok_or_else(|| ServiceError::not_found("case", case_number.trim()))?;
        ensure_case_visible(&self.ctx, actor, &case)?;
        Ok(case)
    }

    /// Lists cases visible to `actor`. Deleted cases need `CaseDelete`.
    pub fn list_cases(&self, actor: &Actor, filter: CaseFilter) -> ServiceResult<Page<Case>> {
        require(actor, Permission::CaseRead)?;
        if filter.include_deleted {
            require(actor, Permission::CaseDelete)?;
        }
        Ok(self.repo().list_cases(&CaseListQuery {
            stage: filter.stage,
            status: filter.status,
            priority: filter.priority,
            department_id: filter.department_id,
            assigned_to: filter.assigned_to,
            search: non_blank(filter.search),
            include_deleted: filter.include_deleted,
            visibility: case_visibility(&self.ctx, actor)?,
            page: self.ctx.config.page(filter.limit, filter.offset),
        })?)
    }

    pub fn update_case(
        &self,
        actor: &Actor,
        id: CaseId,
        update: CaseUpdate,
    ) -> ServiceResult<Case> {
        let started = Instant::now();
        finish("case_update", started, self.update_inner(actor, id, update))
    }

    fn update_inner(&self, actor: &Actor, id: CaseId, update: CaseUpdate) -> ServiceResult<Case> {
        require(actor, Permission::CaseUpdate)?;
        let mut case = load_visible_case(&self.ctx, actor, id)?;
        let mut changed: Vec<&str> = Vec::new();

        if let Some(title) = update.title {
            case.title = title.trim().to_string();
            changed.push("title");
        }
        if let Some(description) = update.description {
            case.description = non_blank(description);
            changed.push("description");
        }
        if let Some(address) = update.property_address {
            case.property_address = address.trim().to_string();
            changed.push("property_address");
        }
        if let Some(municipality) = update.property_municipality {
            case.property_municipality = non_blank(municipality);
            changed.push("property_municipality");
        }
        if let Some(province) = update.property_province {
            case.property_province = non_blank(province);
            changed.push("property_province");
        }
        if let Some(owner_name) = update.owner_name {
            case.owner_name = owner_name.trim().to_string();
            changed.push("owner_name");
        }
        if let Some(identification) = update.owner_identification {
            case.owner_identification = non_blank(identification);
            changed.push("owner_identification");
        }
        if let Some(area) = update.land_area {
            case.land_area = area;
            changed.push("land_area");
        }
        if let Some(value) = update.estimated_value {
            case.estimated_value = value;
            changed.push("estimated_value");
        }
        if let Some(priority) = update.priority {
            case.priority = priority;
            changed.push("priority");
        }
        if let Some(start_date) = update.start_date {
            case.start_date = start_date;
            changed.push("start_date");
        }
        if let Some(expected_end_date) = update.expected_end_date {
            case.expected_end_date = expected_end_date;
            changed.push("expected_end_date");
        }
        if changed.is_empty() {
            return Ok(case);
        }

        case.validate()?;
        case.updated_at = self.ctx.now();
        self.repo().update_case(&case)?;
        record_activity(
            &self.ctx,
            Some(actor.user_id),
            "case.updated",
            (EntityType::Case, case.id),
            Some(case.id),
            Some(json!({ "fields": changed })),
        )?;
        Ok(case)
    }

    /// Sets the administrative status. `completed` requires the `Completed` stage.
    pub fn update_status(
        &self,
        actor: &Actor,
        id: CaseId,
        status: CaseStatus,
    ) -> ServiceResult<Case> {
        let started = Instant::now();
        finish("case_update_status", started, self.update_status_inner(actor, id, status))
    }

    fn update_status_inner(
        &self,
        actor: &Actor,
        id: CaseId,
        status: CaseStatus,
    ) -> ServiceResult<Case> {
        require(actor, Permission::CaseUpdate)?;
        let mut case = load_visible_case(&self.ctx, actor, id)?;
        if case.status == status {
            return Ok(case);
        }
        if status == CaseStatus::Completed && case.current_stage != CaseStage::Completed {
            return Err(ServiceError::validation(
                "status `completed` requires the COMPLETED stage",
            ));
        }

        let previous = case.status;
        case.status = status;
        case.updated_at = self.ctx.now();
        self.repo().update_case(&case)?;
        record_activity(
            &self.ctx,
            Some(actor.user_id),
            "case.status_changed",
            (EntityType::Case, case.id),
            Some(case.id),
            Some(json!({ "from": previous.as_str(), "to": status.as_str() })),
        )?;

        let draft = NewNotification {
            kind: NotificationKind::StatusChanged,
            priority: notification_priority(case.priority),
            title: format!("Case {} status changed", case.case_number),
            message: format!(
                "Status changed from {} to {}.",
                previous.as_str(),
                status.as_str()
            ),
            case_id: Some(case.id),
        };
        self.notifications().notify_many(
            [Some(case.created_by), case.assigned_to].into_iter().flatten(),
            Some(actor.user_id),
            &draft,
            self.ctx.now(),
        )?;
        Ok(case)
    }

    /// Moves the case to `target` when the workflow allows it.
    pub fn transition_stage(
        &self,
        actor: &Actor,
        id: CaseId,
        target: CaseStage,
        notes: Option<String>,
    ) -> ServiceResult<TransitionOutcome> {
        let started = Instant::now();
        finish(
            "case_transition_stage",
            started,
            self.transition_inner(actor, id, target, notes),
        )
    }

    fn transition_inner(
        &self,
        actor: &Actor,
        id: CaseId,
        target: CaseStage,
        notes: Option<String>,
    ) -> ServiceResult<TransitionOutcome> {
        require(actor, Permission::CaseTransition)?;
        let mut case = load_visible_case(&self.ctx, actor, id)?;
        let from = case.current_stage;
        if from == target {
            return Err(ServiceError::validation(format!(
                "case is already in stage {from}"
            )));
        }
        if !from.can_transition_to(target) {
            return Err(ServiceError::InvalidTransition { from, to: target });
        }

        let now = self.ctx.now();
        case.current_stage = target;
        case.status = status_after_transition(case.status, target);
        case.actual_end_date = if target == CaseStage::Completed {
            Some(now)
        } else if from == CaseStage::Completed {
            None
        } else {
            case.actual_end_date
        };
        case.updated_at = now;

        let notes = non_blank(notes);
        let change = self
            .repo()
            .record_stage_change(&case, from, actor.user_id, notes.as_deref())?;
        record_activity(
            &self.ctx,
            Some(actor.user_id),
            "case.stage_changed",
            (EntityType::Case, case.id),
            Some(case.id),
            Some(json!({ "from": from.as_str(), "to": target.as_str() })),
        )?;

        let draft = NewNotification {
            kind: NotificationKind::StageChanged,
            priority: if target.is_absorbing() {
                NotificationPriority::High
            } else {
                notification_priority(case.priority)
            },
            title: format!("Case {} moved to {}", case.case_number, target.as_str()),
            message: format!(
                "Stage changed from {} to {}.",
                from.as_str(),
                target.as_str()
            ),
            case_id: Some(case.id),
        };
        let recipients = self.stage_change_recipients(&case)?;
        let notified = self
            .notifications()
            .notify_many(recipients, Some(actor.user_id), &draft, now)?
            .len();

        Ok(TransitionOutcome {
            case,
            change,
            notified,
        })
    }

    /// Sets or clears the responsible user.
    pub fn assign_user(
        &self,
        actor: &Actor,
        id: CaseId,
        assignee: Option<UserId>,
    ) -> ServiceResult<Case> {
        let started = Instant::now();
        finish("case_assign_user", started, self.assign_user_inner(actor, id, assignee))
    }

    fn assign_user_inner(
        &self,
        actor: &Actor,
        id: CaseId,
        assignee: Option<UserId>,
    ) -> ServiceResult<Case> {
        require(actor, Permission::CaseAssign)?;
        let mut case = load_visible_case(&self.ctx, actor, id)?;
        if case.assigned_to == assignee {
            return Ok(case);
        }
        if let Some(user_id) = assignee {
            let user = self.require_active_user(user_id)?;
            let scope = scope_for(&self.ctx, actor)?;
            if !user.department_id.is_some_and(|department| scope.contains(department)) {
                return Err(ServiceError::forbidden(
                    "assignee is outside the caller's departments",
                ));
            }
        }

        case.assigned_to = assignee;
        case.updated_at = self.ctx.now();
        self.repo().update_case(&case)?;
        record_activity(
            &self.ctx,
            Some(actor.user_id),
            "case.assigned",
            (EntityType::Case, case.id),
            Some(case.id),
            Some(json!({ "assigned_to": assignee })),
        )?;
        if let Some(user_id) = assignee {
            self.notify_assignment(actor, &case, user_id)?;
        }
        Ok(case)
    }

    /// Adds a participating department. `is_primary` also moves ownership.
    pub fn assign_department(
        &self,
        actor: &Actor,
        id: CaseId,
        department_id: DepartmentId,
        is_primary: bool,
    ) -> ServiceResult<CaseDepartmentAssignment> {
        let started = Instant::now();
        finish(
            "case_assign_department",
            started,
            self.assign_department_inner(actor, id, department_id, is_primary),
        )
    }

    fn assign_department_inner(
        &self,
        actor: &Actor,
        id: CaseId,
        department_id: DepartmentId,
        is_primary: bool,
    ) -> ServiceResult<CaseDepartmentAssignment> {
        require(actor, Permission::CaseAssign)?;
        let case = load_visible_case(&self.ctx, actor, id)?;
        self.require_active_department(department_id)?;

        let assignment = self.repo().assign_department(
            case.id,
            department_id,
            is_primary,
            actor.user_id,
            self.ctx.now(),
        )?;
        record_activity(
            &self.ctx,
            Some(actor.user_id),
            "case.department_assigned",
            (EntityType::Case, case.id),
            Some(case.id),
            Some(json!({ "department_id": department_id, "is_primary": is_primary })),
        )?;
        Ok(assignment)
    }

    /// Removes a participating department. The primary one cannot be removed.
    pub fn remove_department(
        &self,
        actor: &Actor,
        id: CaseId,
        department_id: DepartmentId,
    ) -> ServiceResult<()> {
        let started = Instant::now();
        finish(
            "case_remove_department",
            started,
            self.remove_department_inner(actor, id, department_id),
        )
    }

    fn remove_department_inner(
        &self,
        actor: &Actor,
        id: CaseId,
        department_id: DepartmentId,
    ) -> ServiceResult<()> {
        require(actor, Permission::CaseAssign)?;
        let case = load_visible_case(&self.ctx, actor, id)?;
        if case.department_id == department_id {
            return Err(ServiceError::Conflict(
                "the primary department cannot be removed; assign another primary first"
                    .to_string(),
            ));
        }
        if !self.repo().remove_department(case.id, department_id)? {
            return Err(ServiceError::not_found("case department", department_id));
        }
        record_activity(
            &self.ctx,
            Some(actor.user_id),
            "case.department_removed",
            (EntityType::Case, case.id),
            Some(case.id),
            Some(json!({ "department_id": department_id })),
        )
    }

    pub fn departments(
        &self,
        actor: &Actor,
        id: CaseId,
    ) -> ServiceResult<Vec<CaseDepartmentAssignment>> {
        require(actor, Permission::CaseRead)?;
        let case = load_visible_case(&self.ctx, actor, id)?;
        Ok(self.repo().list_case_departments(case.id)?)
    }

    pub fn delete_case(&self, actor: &Actor, id: CaseId) -> ServiceResult<()> {
        let started = Instant::now();
        finish("case_delete", started, self.delete_inner(actor, id))
    }

    fn delete_inner(&self, actor: &Actor, id: CaseId) -> ServiceResult<()> {
        require(actor, Permission::CaseDelete)?;
        let mut case = load_visible_case(&self.ctx, actor, id)?;
        case.is_deleted = true;
        case.updated_at = self.ctx.now();
        self.repo().update_case(&case)?;
        record_activity(
            &self.ctx,
            Some(actor.user_id),
            "case.deleted",
            (EntityType::Case, case.id),
            Some(case.id),
            None,
        )
    }

    /// Stage history, oldest first.
    pub fn stage_history(&self, actor: &Actor, id: CaseId) -> ServiceResult<Vec<StageChange>> {
        require(actor, Permission::CaseRead)?;
        let case = load_visible_case(&self.ctx, actor, id)?;
        Ok(self.repo().list_stage_history(case.id)?)
    }

    /// Aggregates over the cases visible to `actor`.
    pub fn statistics(&self, actor: &Actor) -> ServiceResult<CaseStatistics> {
        require(actor, Permission::ReportView)?;
        Ok(self
            .repo()
            .statistics(&case_visibility(&self.ctx, actor)?, self.ctx.now())?)
    }

    fn notify_assignment(&self, actor: &Actor, case: &Case, assignee: UserId) -> ServiceResult<()> {
        if assignee == actor.user_id {
            return Ok(());
        }
        let draft = NewNotification {
            kind: NotificationKind::CaseAssigned,
            priority: notification_priority(case.priority),
            title: format!("Case {} assigned to you", case.case_number),
            message: format!("You are now responsible for case {}.", case.case_number),
            case_id: Some(case.id),
        };
        self.notifications()
            .notify(assignee, &draft, self.ctx.now())?;
        Ok(())
    }

    /// Creator, assignee and active members of every participating department.
    fn stage_change_recipients(&self, case: &Case) -> ServiceResult<BTreeSet<UserId>> {
        let mut recipients = BTreeSet::from([case.created_by]);
        recipients.extend(case.assigned_to);
        let departments = SqliteDepartmentRepository::new(self.ctx.conn);
        let mut department_ids: BTreeSet<DepartmentId> = self
            .repo()
            .list_case_departments(case.id)?
            .into_iter()
            .map(|assignment| assignment.department_id)
            .collect();
        department_ids.insert(case.department_id);
        for department_id in department_ids {
            recipients.extend(departments.list_member_ids(department_id, true)?);
        }
        Ok(recipients)
    }

    fn require_active_department(&self, id: DepartmentId) -> ServiceResult<()> {
        match SqliteDepartmentRepository::new(self.ctx.conn).get_department(id)? {
            Some(department) if department.is_active => Ok(()),
            Some(_) => Err(ServiceError::validation(format!(
                "department {id} is inactive"
            ))),
            None => Err(ServiceError::not_found("department", id)),
        }
    }

    fn require_active_user(&self, id: UserId) -> ServiceResult<User> {
        match SqliteUserRepository::new(self.ctx.conn).get_user(id)? {
            Some(user) if user.is_active => Ok(user),
            Some(_) => Err(ServiceError::validation(format!("user {id} is inactive"))),
            None => Err(ServiceError::not_found("user", id)),
        }
    }
}

/// Administrative status implied by entering `target`.
pub fn status_after_transition(current: CaseStatus, target: CaseStage) -> CaseStatus {
    match target {
        CaseStage::Completed => CaseStatus::Completed,
        CaseStage::Suspended => CaseStatus::OnHold,
        CaseStage::Cancelled => CaseStatus::Archived,
        _ if target == CaseStage::first() && current != CaseStatus::Archived => current,
        _ => CaseStatus::InProgress,
    }
}

fn notification_priority(priority: CasePriority) -> NotificationPriority {
    match priority {
        CasePriority::Low => NotificationPriority::Low,
        CasePriority::Medium => NotificationPriority::Normal,
        CasePriority::High => NotificationPriority::High,
        CasePriority::Urgent => NotificationPriority::Urgent,
    }
}
