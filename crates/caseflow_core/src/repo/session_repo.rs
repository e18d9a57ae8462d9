//! Login session persistence.
//!
//! Tokens are opaque; a session is valid while not revoked and
//! `expires_at` lies in the future.

use crate::model::directory::UserId;
use crate::repo::{parse_flag, parse_uuid, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row};

/// Stored session row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub user_id: UserId,
    pub created_at: i64,
    pub expires_at: i64,
    pub revoked: bool,
}

impl Session {
    pub fn is_valid_at(&self, now_ms: i64) -> bool {
        !self.revoked && now_ms < self.expires_at
    }
}

/// Repository interface for session operations.
pub trait SessionRepository {
    fn insert_session(&self, session: &Session) -> RepoResult<()>;
    fn get_session(&self, token: &str) -> RepoResult<Option<Session>>;
    fn revoke_session(&self, token: &str) -> RepoResult<bool>;
    fn revoke_user_sessions(&self, user_id: UserId) -> RepoResult<u64>;
    /// Deletes expired and revoked rows; returns the number removed.
    fn purge_expired(&self, now_ms: i64) -> RepoResult<u64>;
}

/// SQLite-backed session repository.
pub struct SqliteSessionRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSessionRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl SessionRepository for SqliteSessionRepository<'_> {
    fn insert_session(&self, session: &Session) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO sessions (token, user_id, created_at, expires_at, revoked)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                session.token.as_str(),
                session.user_id.to_string(),
                session.created_at,
                session.expires_at,
                i64::from(session.revoked),
            ],
        )?;
        Ok(())
    }

    fn get_session(&self, token: &str) -> RepoResult<Option<Session>> {
        self.conn
            .query_row(
                "SELECT token, user_id, created_at, expires_at, revoked
                 FROM sessions WHERE token = ?1;",
                [token],
                |row| Ok(parse_session_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn revoke_session(&self, token: &str) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "UPDATE sessions SET revoked = 1 WHERE token = ?1 AND revoked = 0;",
            [token],
        )?;
        Ok(changed > 0)
    }

    fn revoke_user_sessions(&self, user_id: UserId) -> RepoResult<u64> {
        let changed = self.conn.execute(
            "UPDATE sessions SET revoked = 1 WHERE user_id = ?1 AND revoked = 0;",
            [user_id.to_string()],
        )?;
        Ok(changed as u64)
    }

    fn purge_expired(&self, now_ms: i64) -> RepoResult<u64> {
        let changed = self.conn.execute(
            "DELETE FROM sessions WHERE revoked = 1 OR expires_at <= ?1;",
            [now_ms],
        )?;
        Ok(changed as u64)
    }
}

fn parse_session_row(row: &Row<'_>) -> RepoResult<Session> {
    let user_text: String = row.get("user_id")?;
    Ok(Session {
        token: row.get("token")?,
        user_id: parse_uuid(&user_text, "sessions.user_id")?,
        created_at: row.get("created_at")?,
        expires_at: row.get("expires_at")?,
        revoked: parse_flag(row.get("revoked")?, "sessions.revoked")?,
    })
}
