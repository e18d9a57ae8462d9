//! Core domain logic for CaseFlow expropriation case tracking.
//! This crate is the single source of truth for business invariants.

pub mod auth;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod storage;

pub use auth::{Actor, Permission};
pub use config::{ConfigError, CoreConfig};
pub use db::{now_epoch_ms, open_db, open_db_in_memory, DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::case::{Case, CaseId, CasePriority, CaseStatus};
pub use model::directory::{Department, DepartmentId, Role, User, UserId};
pub use model::stage::{CaseStage, ALL_STAGES};
pub use repo::{Page, PageRequest, RepoError, RepoResult};
pub use service::activity_service::ActivityService;
pub use service::auth_service::{AuthService, LoginOutcome};
pub use service::case_service::{CaseFilter, CaseService, CaseUpdate, NewCase};
pub use service::department_service::{DepartmentService, NewDepartment};
pub use service::document_service::{DocumentService, UploadRequest};
pub use service::meeting_service::{MeetingService, NewMeeting};
pub use service::notification_service::NotificationService;
pub use service::task_service::{NewTask, TaskService};
pub use service::user_service::{NewUser, UserService};
pub use service::{ServiceContext, ServiceError, ServiceResult};
pub use storage::{BlobStore, LocalBlobStore, StorageError};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
