//! Authentication use-cases: login, logout, token checks, password change.
//!
//! # Invariants
//! - Failed logins never reveal whether the email exists.
//! - A session authenticates only while unrevoked, unexpired and the user
//!   is still active.

use crate::auth::password::{
    generate_salt, hash_password, password_policy_violation, verify_against_dummy,
    verify_password,
};
use crate::auth::Actor;
use crate::model::activity::EntityType;
use crate::model::directory::{normalize_email, User};
use crate::repo::session_repo::{Session, SessionRepository, SqliteSessionRepository};
use crate::repo::user_repo::{SqliteUserRepository, UserRepository};
use crate::service::{finish, record_activity, ServiceContext, ServiceError, ServiceResult};
use std::time::Instant;
use uuid::Uuid;

const INVALID_CREDENTIALS: &str = "invalid email or password";

/// Successful login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginOutcome {
    pub token: String,
    pub expires_at: i64,
    pub user: User,
}

pub struct AuthService<'a> {
    ctx: ServiceContext<'a>,
}

impl<'a> AuthService<'a> {
    pub fn new(ctx: ServiceContext<'a>) -> Self {
        Self { ctx }
    }

    pub fn login(&self, email: &str, password: &str) -> ServiceResult<LoginOutcome> {
        let started = Instant::now();
        finish("auth_login", started, self.login_inner(email, password))
    }

    fn login_inner(&self, email: &str, password: &str) -> ServiceResult<LoginOutcome> {
        let users = SqliteUserRepository::new(self.ctx.conn);
        let credentials = match normalize_email(email) {
            Some(email) => users.get_credentials(&email)?,
            None => None,
        };
        let Some(credentials) = credentials.filter(|credentials| credentials.user.is_active) else {
            verify_against_dummy(password);
            return Err(ServiceError::Unauthenticated(INVALID_CREDENTIALS.to_string()));
        };
        if !verify_password(
            password,
            &credentials.password_salt,
            &credentials.password_hash,
        ) {
            return Err(ServiceError::Unauthenticated(INVALID_CREDENTIALS.to_string()));
        }

        let now = self.ctx.now();
        let session = Session {
            token: new_token(),
            user_id: credentials.user.id,
            created_at: now,
            expires_at: now + self.ctx.config.session_ttl_ms(),
            revoked: false,
        };
        SqliteSessionRepository::new(self.ctx.conn).insert_session(&session)?;
        users.touch_last_login(credentials.user.id, now)?;
        record_activity(
            &self.ctx,
            Some(credentials.user.id),
            "user.login",
            (EntityType::User, credentials.user.id),
            None,
            None,
        )?;

        let mut user = credentials.user;
        user.last_login_at = Some(now);
        Ok(LoginOutcome {
            token: session.token,
            expires_at: session.expires_at,
            user,
        })
    }

    /// Revokes `token`. Unknown or already revoked tokens are rejected.
    pub fn logout(&self, token: &str) -> ServiceResult<()> {
        let started = Instant::now();
        let result = SqliteSessionRepository::new(self.ctx.conn)
            .revoke_session(token.trim())
            .map_err(ServiceError::from)
            .and_then(|revoked| {
                if revoked {
                    Ok(())
                } else {
                    Err(ServiceError::Unauthenticated("unknown session".to_string()))
                }
            });
        finish("auth_logout", started, result)
    }

    /// Resolves a bearer token into the calling actor.
    pub fn authenticate(&self, token: &str) -> ServiceResult<Actor> {
        let sessions = SqliteSessionRepository::new(self.ctx.conn);
        let session = sessions
            .get_session(token.trim())?
            .filter(|session| session.is_valid_at(self.ctx.now()))
            .ok_or_else(|| {
                ServiceError::Unauthenticated("session is missing or expired".to_string())
            })?;
        let users = SqliteUserRepository::new(self.ctx.conn);
        let user = users
            .get_user(session.user_id)?
            .filter(|user| user.is_active)
            .ok_or_else(|| ServiceError::Unauthenticated("account is inactive".to_string()))?;
        let extra = users.list_extra_permissions(user.id)?;
        Ok(Actor::from_user(&user, extra))
    }

    /// Changes the caller's password and revokes all of their sessions.
    pub fn change_password(
        &self,
        actor: &Actor,
        current_password: &str,
        new_password: &str,
    ) -> ServiceResult<()> {
        let started = Instant::now();
        finish(
            "auth_change_password",
            started,
            self.change_password_inner(actor, current_password, new_password),
        )
    }

    fn change_password_inner(
        &self,
        actor: &Actor,
        current_password: &str,
        new_password: &str,
    ) -> ServiceResult<()> {
        if let Some(reason) = password_policy_violation(new_password) {
            return Err(ServiceError::validation(reason));
        }
        let users = SqliteUserRepository::new(self.ctx.conn);
        let credentials = users
            .get_credentials_by_id(actor.user_id)?
            .ok_or_else(|| ServiceError::not_found("user", actor.user_id))?;
        if !verify_password(
            current_password,
            &credentials.password_salt,
            &credentials.password_hash,
        ) {
            return Err(ServiceError::forbidden("current password does not match"));
        }

        let salt = generate_salt();
        users.set_password(actor.user_id, &hash_password(new_password, &salt), &salt)?;
        SqliteSessionRepository::new(self.ctx.conn).revoke_user_sessions(actor.user_id)?;
        record_activity(
            &self.ctx,
            Some(actor.user_id),
            "user.password_changed",
            (EntityType::User, actor.user_id),
            None,
            None,
        )
    }

    /// Deletes expired and revoked sessions.
    pub fn purge_sessions(&self) -> ServiceResult<u64> {
        Ok(SqliteSessionRepository::new(self.ctx.conn).purge_expired(self.ctx.now())?)
    }
}

fn new_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}
