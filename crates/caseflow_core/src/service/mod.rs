//! Use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Enforce permissions and department scope for the calling `Actor`.
//! - Record activity and fan out notifications.
//!
//! # Invariants
//! - Every mutating operation checks the actor's permission first.
//! - Errors crossing this boundary are `ServiceError`, mapped to a status code.

pub mod activity_service;
pub mod auth_service;
pub mod case_service;
pub mod department_service;
pub mod document_service;
pub mod meeting_service;
pub mod notification_service;
pub mod task_service;
pub mod user_service;

use crate::auth::{department_scope, Actor, DepartmentScope, Permission};
use crate::config::CoreConfig;
use crate::db::DbError;
use crate::model::activity::EntityType;
use crate::model::case::{Case, CaseValidationError};
use crate::model::document::DocumentValidationError;
use crate::model::stage::CaseStage;
use crate::repo::activity_repo::{ActivityRepository, NewActivity, SqliteActivityRepository};
use crate::repo::case_repo::{CaseRepository, CaseVisibility, SqliteCaseRepository};
use crate::repo::department_repo::{DepartmentRepository, SqliteDepartmentRepository};
use crate::repo::RepoError;
use crate::storage::StorageError;
use log::{info, warn};
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;
use uuid::Uuid;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Use-case level failure.
#[derive(Debug)]
pub enum ServiceError {
    /// Input rejected before touching storage.
    Validation(String),
    /// Missing, expired or revoked credentials.
    Unauthenticated(String),
    /// Authenticated but not allowed.
    Forbidden(String),
    NotFound { entity: &'static str, id: String },
    Conflict(String),
    InvalidTransition { from: CaseStage, to: CaseStage },
    Repo(RepoError),
    Storage(StorageError),
}

impl ServiceError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// HTTP-style status for the error family.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::InvalidTransition { .. } => 400,
            Self::Unauthenticated(_) => 401,
            Self::Forbidden(_) => 403,
            Self::NotFound { .. } => 404,
            Self::Conflict(_) => 409,
            Self::Repo(_) | Self::Storage(_) => 500,
        }
    }

    /// Stable snake_case code for clients.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Unauthenticated(_) => "unauthenticated",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound { .. } => "not_found",
            Self::Conflict(_) => "conflict",
            Self::InvalidTransition { .. } => "invalid_stage_transition",
            Self::Repo(_) => "internal_error",
            Self::Storage(StorageError::Integrity { .. }) => "integrity_error",
            Self::Storage(_) => "internal_error",
        }
    }

    /// `{ "error": { "code", "message" } }`. Internal details are not exposed.
    pub fn to_json(&self) -> serde_json::Value {
        let message = if self.status_code() >= 500 {
            "internal error".to_string()
        } else {
            self.to_string()
        };
        serde_json::json!({
            "error": {
                "code": self.error_code(),
                "message": message,
            }
        })
    }
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(message) => write!(f, "{message}"),
            Self::Unauthenticated(message) => write!(f, "{message}"),
            Self::Forbidden(message) => write!(f, "{message}"),
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::Conflict(message) => write!(f, "{message}"),
            Self::InvalidTransition { from, to } => {
                write!(f, "stage transition {from} -> {to} is not allowed")
            }
            Self::Repo(err) => write!(f, "{err}"),
            Self::Storage(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound { entity, id } => Self::NotFound { entity, id },
            RepoError::Conflict(message) => Self::Conflict(message),
            other => Self::Repo(other),
        }
    }
}

impl From<DbError> for ServiceError {
    fn from(value: DbError) -> Self {
        Self::Repo(RepoError::Db(value))
    }
}

impl From<StorageError> for ServiceError {
    fn from(value: StorageError) -> Self {
        Self::Storage(value)
    }
}

impl From<CaseValidationError> for ServiceError {
    fn from(value: CaseValidationError) -> Self {
        Self::Validation(value.to_string())
    }
}

impl From<DocumentValidationError> for ServiceError {
    fn from(value: DocumentValidationError) -> Self {
        Self::Validation(value.to_string())
    }
}

/// Shared handles every service works against.
#[derive(Clone, Copy)]
pub struct ServiceContext<'a> {
    pub conn: &'a Connection,
    pub config: &'a CoreConfig,
    clock: fn() -> i64,
}

impl<'a> ServiceContext<'a> {
    pub fn new(conn: &'a Connection, config: &'a CoreConfig) -> Self {
        Self {
            conn,
            config,
            clock: crate::db::now_epoch_ms,
        }
    }

    /// Replaces the wall clock, e.g. with a fixed instant in tests.
    pub fn with_clock(self, clock: fn() -> i64) -> Self {
        Self { clock, ..self }
    }

    /// Current time in epoch ms.
    pub fn now(&self) -> i64 {
        (self.clock)()
    }
}

/// Fails with `Forbidden` unless `actor` holds `permission`.
pub(crate) fn require(actor: &Actor, permission: Permission) -> ServiceResult<()> {
    if actor.can(permission) {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(format!(
            "{} may not perform {}",
            actor.role.as_str(),
            permission.as_str()
        )))
    }
}

/// Department scope of `actor` against the stored department tree.
pub(crate) fn scope_for(ctx: &ServiceContext<'_>, actor: &Actor) -> ServiceResult<DepartmentScope> {
    if actor.is_super_admin() {
        return Ok(DepartmentScope::All);
    }
    let departments = SqliteDepartmentRepository::new(ctx.conn).list_departments(true)?;
    Ok(department_scope(actor, &departments))
}

/// Case listing restriction for `actor`.
pub(crate) fn case_visibility(
    ctx: &ServiceContext<'_>,
    actor: &Actor,
) -> ServiceResult<CaseVisibility> {
    Ok(CaseVisibility {
        department_ids: scope_for(ctx, actor)?.ids(),
        assignee: Some(actor.user_id),
    })
}

/// Fails with `Forbidden` when `case` is outside the actor's scope.
pub(crate) fn ensure_case_visible(
    ctx: &ServiceContext<'_>,
    actor: &Actor,
    case: &Case,
) -> ServiceResult<()> {
    if actor.is_super_admin() || case.assigned_to == Some(actor.user_id) {
        return Ok(());
    }
    let scope = scope_for(ctx, actor)?;
    if scope.contains(case.department_id) {
        return Ok(());
    }
    let participating = SqliteCaseRepository::new(ctx.conn).list_case_departments(case.id)?;
    if participating
        .iter()
        .any(|assignment| scope.contains(assignment.department_id))
    {
        return Ok(());
    }
    Err(ServiceError::forbidden(format!(
        "case {} is outside the caller's departments",
        case.case_number
    )))
}

/// Loads a non-deleted case visible to `actor`.
pub(crate) fn load_visible_case(
    ctx: &ServiceContext<'_>,
    actor: &Actor,
    case_id: Uuid,
) -> ServiceResult<Case> {
    let case = SqliteCaseRepository::new(ctx.conn)
        .get_case(case_id)?
        .filter(|case| !case.is_deleted)
        .ok_or_else(|| ServiceError::not_found("case", case_id))?;
    ensure_case_visible(ctx, actor, &case)?;
    Ok(case)
}

/// Appends one activity log entry.
pub(crate) fn record_activity(
    ctx: &ServiceContext<'_>,
    actor_id: Option<Uuid>,
    action: &str,
    entity: (EntityType, Uuid),
    case_id: Option<Uuid>,
    details: Option<serde_json::Value>,
) -> ServiceResult<()> {
    SqliteActivityRepository::new(ctx.conn).append(&NewActivity {
        actor_id,
        action: action.to_string(),
        entity_type: entity.0,
        entity_id: entity.1,
        case_id,
        details,
        created_at: ctx.now(),
    })?;
    Ok(())
}

/// Logs the outcome of a use-case and passes the result through.
pub(crate) fn finish<T>(
    event: &str,
    started: Instant,
    result: ServiceResult<T>,
) -> ServiceResult<T> {
    let duration_ms = started.elapsed().as_millis();
    match &result {
        Ok(_) => info!("event={event} module=service status=ok duration_ms={duration_ms}"),
        Err(err) => warn!(
            "event={event} module=service status=error code={} duration_ms={duration_ms}",
            err.error_code()
        ),
    }
    result
}

/// Trims `value`, mapping blank input to `None`.
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

/// Trims a required field, failing when blank.
pub(crate) fn required(value: &str, field: &str) -> ServiceResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::Validation(format!("`{field}` is required")));
    }
    Ok(trimmed.to_string())
}
