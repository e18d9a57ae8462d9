//! Authorization primitives: role permission matrix, actors and scoping.
//!
//! # Responsibility
//! - Map roles to the actions they may perform.
//! - Describe the authenticated caller (`Actor`) passed to every service call.
//! - Compute which departments an actor may see.
//!
//! # Invariants
//! - `SuperAdmin` holds every permission and is never department-scoped.
//! - Per-user extra grants only add permissions; they never remove any.

pub mod password;
pub mod scope;

use crate::model::directory::{DepartmentId, Role, User, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub use scope::{department_scope, DepartmentScope};

/// Action a caller may be allowed to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    CaseCreate,
    CaseRead,
    CaseUpdate,
    CaseDelete,
    CaseAssign,
    CaseTransition,
    DocumentUpload,
    DocumentRead,
    DocumentManage,
    DocumentReview,
    MeetingSchedule,
    TaskManage,
    UserManage,
    DepartmentManage,
    ReportView,
    NotificationBroadcast,
}

pub const ALL_PERMISSIONS: [Permission; 16] = [
    Permission::CaseCreate,
    Permission::CaseRead,
    Permission::CaseUpdate,
    Permission::CaseDelete,
    Permission::CaseAssign,
    Permission::CaseTransition,
    Permission::DocumentUpload,
    Permission::DocumentRead,
    Permission::DocumentManage,
    Permission::DocumentReview,
    Permission::MeetingSchedule,
    Permission::TaskManage,
    Permission::UserManage,
    Permission::DepartmentManage,
    Permission::ReportView,
    Permission::NotificationBroadcast,
];

impl Permission {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CaseCreate => "case_create",
            Self::CaseRead => "case_read",
            Self::CaseUpdate => "case_update",
            Self::CaseDelete => "case_delete",
            Self::CaseAssign => "case_assign",
            Self::CaseTransition => "case_transition",
            Self::DocumentUpload => "document_upload",
            Self::DocumentRead => "document_read",
            Self::DocumentManage => "document_manage",
            Self::DocumentReview => "document_review",
            Self::MeetingSchedule => "meeting_schedule",
            Self::TaskManage => "task_manage",
            Self::UserManage => "user_manage",
            Self::DepartmentManage => "department_manage",
            Self::ReportView => "report_view",
            Self::NotificationBroadcast => "notification_broadcast",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        ALL_PERMISSIONS
            .iter()
            .copied()
            .find(|permission| permission.as_str() == value.trim())
    }
}

/// Returns whether `role` grants `permission` without any extra grants.
pub fn role_allows(role: Role, permission: Permission) -> bool {
    use Permission::*;

    match role {
        Role::SuperAdmin => true,
        Role::DepartmentAdmin => !matches!(permission, DepartmentManage),
        Role::Supervisor => matches!(
            permission,
            CaseCreate
                | CaseRead
                | CaseUpdate
                | CaseAssign
                | CaseTransition
                | DocumentUpload
                | DocumentRead
                | DocumentManage
                | DocumentReview
                | MeetingSchedule
                | TaskManage
                | ReportView
        ),
        Role::Analyst => matches!(
            permission,
            CaseCreate
                | CaseRead
                | CaseUpdate
                | CaseTransition
                | DocumentUpload
                | DocumentRead
                | MeetingSchedule
                | TaskManage
        ),
        Role::Observer => matches!(permission, CaseRead | DocumentRead),
    }
}

/// Authenticated caller of a service operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
    pub department_id: Option<DepartmentId>,
    /// Grants on top of the role matrix.
    pub extra_permissions: BTreeSet<Permission>,
}

impl Actor {
    pub fn new(user_id: UserId, role: Role, department_id: Option<DepartmentId>) -> Self {
        Self {
            user_id,
            role,
            department_id,
            extra_permissions: BTreeSet::new(),
        }
    }

    /// Builds an actor from a directory user and their extra grants.
    pub fn from_user(user: &User, extra_permissions: BTreeSet<Permission>) -> Self {
        Self {
            user_id: user.id,
            role: user.role,
            department_id: user.department_id,
            extra_permissions,
        }
    }

    pub fn can(&self, permission: Permission) -> bool {
        role_allows(self.role, permission) || self.extra_permissions.contains(&permission)
    }

    pub fn is_super_admin(&self) -> bool {
        self.role == Role::SuperAdmin
    }
}

#[cfg(test)]
mod tests {
    use super::{role_allows, Actor, Permission, ALL_PERMISSIONS};
    use crate::model::directory::Role;
    use uuid::Uuid;

    #[test]
    fn super_admin_holds_every_permission() {
        for permission in ALL_PERMISSIONS {
            assert!(role_allows(Role::SuperAdmin, permission), "{permission:?}");
        }
    }

    #[test]
    fn observer_is_read_only() {
        let allowed: Vec<Permission> = ALL_PERMISSIONS
            .into_iter()
            .filter(|permission| role_allows(Role::Observer, *permission))
            .collect();
        assert_eq!(allowed, vec![Permission::CaseRead, Permission::DocumentRead]);
    }

    #[test]
    fn role_matrix_expected_cells() {
        let cases = [
            (Role::DepartmentAdmin, Permission::UserManage, true),
            (Role::DepartmentAdmin, Permission::DepartmentManage, false),
            (Role::Supervisor, Permission::CaseAssign, true),
            (Role::Supervisor, Permission::CaseDelete, false),
            (Role::Supervisor, Permission::UserManage, false),
            (Role::Analyst, Permission::CaseTransition, true),
            (Role::Analyst, Permission::CaseAssign, false),
            (Role::Analyst, Permission::DocumentManage, false),
            (Role::Analyst, Permission::ReportView, false),
            (Role::Observer, Permission::CaseCreate, false),
        ];
        for (role, permission, expected) in cases {
            assert_eq!(
                role_allows(role, permission),
                expected,
                "{role:?} / {permission:?}"
            );
        }
    }

    #[test]
    fn extra_grants_extend_role() {
        let mut actor = Actor::new(Uuid::new_v4(), Role::Observer, None);
        assert!(!actor.can(Permission::ReportView));
        actor.extra_permissions.insert(Permission::ReportView);
        assert!(actor.can(Permission::ReportView));
        assert!(!actor.can(Permission::CaseCreate));
    }

    #[test]
    fn permission_parse_roundtrips() {
        for permission in ALL_PERMISSIONS {
            assert_eq!(Permission::parse(permission.as_str()), Some(permission));
        }
        assert_eq!(Permission::parse("case_destroy"), None);
    }
}
