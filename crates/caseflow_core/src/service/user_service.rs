//! User administration use-cases.
//!
//! # Invariants
//! - Only super admins create or promote super admins and grant extra
//!   permissions.
//! - Department admins only manage users inside their department subtree.
//! - Deactivating a user revokes all of their sessions.

use crate::auth::password::{generate_salt, hash_password, password_policy_violation};
use crate::auth::{Actor, Permission};
use crate::model::activity::EntityType;
use crate::model::directory::{normalize_email, DepartmentId, Role, User, UserId};
use crate::repo::department_repo::{DepartmentRepository, SqliteDepartmentRepository};
use crate::repo::session_repo::{SessionRepository, SqliteSessionRepository};
use crate::repo::user_repo::{SqliteUserRepository, UserListQuery, UserRepository};
use crate::repo::Page;
use crate::service::{
    finish, record_activity, require, required, scope_for, ServiceContext, ServiceError,
    ServiceResult,
};
use serde_json::json;
use std::collections::BTreeSet;
use std::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub department_id: Option<DepartmentId>,
}

/// Partial update; `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<Role>,
    /// `Some(None)` detaches the user from any department.
    pub department_id: Option<Option<DepartmentId>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserFilter {
    pub role: Option<Role>,
    pub department_id: Option<DepartmentId>,
    pub include_inactive: bool,
    pub search: Option<String>,
    pub limit: Option<u32>,
    pub offset: u32,
}

pub struct UserService<'a> {
    ctx: ServiceContext<'a>,
}

impl<'a> UserService<'a> {
    pub fn new(ctx: ServiceContext<'a>) -> Self {
        Self { ctx }
    }

    fn repo(&self) -> SqliteUserRepository<'a> {
        SqliteUserRepository::new(self.ctx.conn)
    }

    pub fn create_user(&self, actor: &Actor, input: NewUser) -> ServiceResult<User> {
        let started = Instant::now();
        finish("user_create", started, self.create_inner(Some(actor), input))
    }

    /// Creates a super admin without a calling actor. Used for bootstrap.
    pub fn provision_super_admin(&self, input: NewUser) -> ServiceResult<User> {
        let started = Instant::now();
        let input = NewUser {
            role: Role::SuperAdmin,
            ..input
        };
        finish("user_provision_admin", started, self.create_inner(None, input))
    }

    fn create_inner(&self, actor: Option<&Actor>, input: NewUser) -> ServiceResult<User> {
        if let Some(actor) = actor {
            require(actor, Permission::UserManage)?;
            self.ensure_can_assign(actor, input.role, input.department_id)?;
        }
        let email = normalize_email(&input.email)
            .ok_or_else(|| ServiceError::validation("`email` is not a valid address"))?;
        let first_name = required(&input.first_name, "first_name")?;
        let last_name = required(&input.last_name, "last_name")?;
        if let Some(reason) = password_policy_violation(&input.password) {
            return Err(ServiceError::validation(reason));
        }
        if let Some(department_id) = input.department_id {
            self.require_active_department(department_id)?;
        }

        let repo = self.repo();
        if repo.find_by_email(&email)?.is_some() {
            return Err(ServiceError::Conflict(format!(
                "a user with email `{email}` already exists"
            )));
        }

        let now = self.ctx.now();
        let user = User {
            id: Uuid::new_v4(),
            email,
            first_name,
            last_name,
            role: input.role,
            department_id: input.department_id,
            is_active: true,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        };
        let salt = generate_salt();
        repo.insert_user(&user, &hash_password(&input.password, &salt), &salt)?;
        record_activity(
            &self.ctx,
            actor.map(|actor| actor.user_id),
            "user.created",
            (EntityType::User, user.id),
            None,
            Some(json!({ "role": user.role.as_str() })),
        )?;
        repo.get_user(user.id)?
            .ok_or_else(|| ServiceError::not_found("user", user.id))
    }

    /// Any user may read themselves; others need `UserManage` and scope.
    pub fn get_user(&self, actor: &Actor, id: UserId) -> ServiceResult<User> {
        let user = self
            .repo()
            .get_user(id)?
            .ok_or_else(|| ServiceError::not_found("user", id))?;
        if user.id != actor.user_id {
            require(actor, Permission::UserManage)?;
            self.ensure_in_scope(actor, user.department_id)?;
        }
        Ok(user)
    }

    pub fn update_user(
        &self,
        actor: &Actor,
        id: UserId,
        update: UserUpdate,
    ) -> ServiceResult<User> {
        let started = Instant::now();
        finish("user_update", started, self.update_inner(actor, id, update))
    }

    fn update_inner(&self, actor: &Actor, id: UserId, update: UserUpdate) -> ServiceResult<User> {
        let repo = self.repo();
        let mut user = self.get_user(actor, id)?;
        let changes_access = update.role.is_some() || update.department_id.is_some();
        if changes_access {
            require(actor, Permission::UserManage)?;
            if user.id == actor.user_id && !actor.is_super_admin() {
                return Err(ServiceError::forbidden(
                    "users cannot change their own role or department",
                ));
            }
            if user.role == Role::SuperAdmin && !actor.is_super_admin() {
                return Err(ServiceError::forbidden("only super admins manage super admins"));
            }
        }

        if let Some(first_name) = update.first_name {
            user.first_name = required(&first_name, "first_name")?;
        }
        if let Some(last_name) = update.last_name {
            user.last_name = required(&last_name, "last_name")?;
        }
        if let Some(role) = update.role {
            user.role = role;
        }
        if let Some(department_id) = update.department_id {
            if let Some(department_id) = department_id {
                self.require_active_department(department_id)?;
            }
            user.department_id = department_id;
        }
        if changes_access {
            self.ensure_can_assign(actor, user.role, user.department_id)?;
        }

        repo.update_user(&user)?;
        record_activity(
            &self.ctx,
            Some(actor.user_id),
            "user.updated",
            (EntityType::User, id),
            None,
            changes_access.then(|| {
                json!({
                    "role": user.role.as_str(),
                    "department_id": user.department_id,
                })
            }),
        )?;
        repo.get_user(id)?
            .ok_or_else(|| ServiceError::not_found("user", id))
    }

    pub fn deactivate_user(&self, actor: &Actor, id: UserId) -> ServiceResult<()> {
        let started = Instant::now();
        finish("user_deactivate", started, self.set_active(actor, id, false))
    }

    pub fn reactivate_user(&self, actor: &Actor, id: UserId) -> ServiceResult<()> {
        let started = Instant::now();
        finish("user_reactivate", started, self.set_active(actor, id, true))
    }

    fn set_active(&self, actor: &Actor, id: UserId, active: bool) -> ServiceResult<()> {
        require(actor, Permission::UserManage)?;
        if id == actor.user_id {
            return Err(ServiceError::forbidden(
                "users cannot change their own active flag",
            ));
        }
        let mut user = self.get_user(actor, id)?;
        if user.role == Role::SuperAdmin && !actor.is_super_admin() {
            return Err(ServiceError::forbidden("only super admins manage super admins"));
        }
        if user.is_active == active {
            return Ok(());
        }

        user.is_active = active;
        self.repo().update_user(&user)?;
        if !active {
            SqliteSessionRepository::new(self.ctx.conn).revoke_user_sessions(id)?;
        }
        record_activity(
            &self.ctx,
            Some(actor.user_id),
            if active {
                "user.reactivated"
            } else {
                "user.deactivated"
            },
            (EntityType::User, id),
            None,
            None,
        )
    }

    /// Lists users inside the caller's department scope.
    pub fn list_users(&self, actor: &Actor, filter: UserFilter) -> ServiceResult<Page<User>> {
        require(actor, Permission::UserManage)?;
        let scope = scope_for(&self.ctx, actor)?;
        let department_ids = match (filter.department_id, scope.ids()) {
            (Some(id), _) if !scope.contains(id) => {
                return Err(ServiceError::forbidden(
                    "department is outside the caller's scope",
                ))
            }
            (Some(id), _) => Some(vec![id]),
            (None, ids) => ids,
        };
        Ok(self.repo().list_users(&UserListQuery {
            department_ids,
            role: filter.role,
            include_inactive: filter.include_inactive,
            search: filter.search,
            page: self.ctx.config.page(filter.limit, filter.offset),
        })?)
    }

    /// Sets a new password for another user and revokes their sessions.
    pub fn reset_password(
        &self,
        actor: &Actor,
        id: UserId,
        new_password: &str,
    ) -> ServiceResult<()> {
        let started = Instant::now();
        finish(
            "user_reset_password",
            started,
            self.reset_password_inner(actor, id, new_password),
        )
    }

    fn reset_password_inner(
        &self,
        actor: &Actor,
        id: UserId,
        new_password: &str,
    ) -> ServiceResult<()> {
        require(actor, Permission::UserManage)?;
        let user = self.get_user(actor, id)?;
        if user.role == Role::SuperAdmin && !actor.is_super_admin() {
            return Err(ServiceError::forbidden("only super admins manage super admins"));
        }
        if let Some(reason) = password_policy_violation(new_password) {
            return Err(ServiceError::validation(reason));
        }
        let salt = generate_salt();
        self.repo()
            .set_password(id, &hash_password(new_password, &salt), &salt)?;
        SqliteSessionRepository::new(self.ctx.conn).revoke_user_sessions(id)?;
        record_activity(
            &self.ctx,
            Some(actor.user_id),
            "user.password_reset",
            (EntityType::User, id),
            None,
            None,
        )
    }

    pub fn extra_permissions(
        &self,
        actor: &Actor,
        id: UserId,
    ) -> ServiceResult<BTreeSet<Permission>> {
        self.get_user(actor, id)?;
        Ok(self.repo().list_extra_permissions(id)?)
    }

    /// Replaces the per-user grants on top of the role matrix.
    pub fn set_extra_permissions(
        &self,
        actor: &Actor,
        id: UserId,
        permissions: BTreeSet<Permission>,
    ) -> ServiceResult<()> {
        let started = Instant::now();
        finish(
            "user_set_permissions",
            started,
            self.set_extra_permissions_inner(actor, id, permissions),
        )
    }

    fn set_extra_permissions_inner(
        &self,
        actor: &Actor,
        id: UserId,
        permissions: BTreeSet<Permission>,
    ) -> ServiceResult<()> {
        if !actor.is_super_admin() {
            return Err(ServiceError::forbidden(
                "only super admins grant extra permissions",
            ));
        }
        self.get_user(actor, id)?;
        self.repo().replace_extra_permissions(id, &permissions)?;
        let names: Vec<&str> = permissions
            .iter()
            .map(|permission| permission.as_str())
            .collect();
        record_activity(
            &self.ctx,
            Some(actor.user_id),
            "user.permissions_changed",
            (EntityType::User, id),
            None,
            Some(json!({ "permissions": names })),
        )
    }

    fn ensure_in_scope(
        &self,
        actor: &Actor,
        department_id: Option<DepartmentId>,
    ) -> ServiceResult<()> {
        if actor.is_super_admin() {
            return Ok(());
        }
        match department_id {
            Some(id) if scope_for(&self.ctx, actor)?.contains(id) => Ok(()),
            _ => Err(ServiceError::forbidden(
                "user is outside the caller's departments",
            )),
        }
    }

    fn ensure_can_assign(
        &self,
        actor: &Actor,
        role: Role,
        department_id: Option<DepartmentId>,
    ) -> ServiceResult<()> {
        if actor.is_super_admin() {
            return Ok(());
        }
        if role == Role::SuperAdmin {
            return Err(ServiceError::forbidden(
                "only super admins assign the super_admin role",
            ));
        }
        self.ensure_in_scope(actor, department_id)
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
}
