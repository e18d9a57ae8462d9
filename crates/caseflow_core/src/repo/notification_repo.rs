//! Notification repository contracts and SQLite implementation.
//!
//! # Invariants
//! - Inbox reads only return rows whose `deliver_after` has passed.
//! - Missing preference rows read back as the user's defaults.

use crate::model::directory::UserId;
use crate::model::notification::{
    Notification, NotificationId, NotificationKind, NotificationPreference,
    NotificationPriority, QuietHours,
};
use crate::repo::{
    bool_to_int, parse_enum, parse_flag, parse_optional_uuid, parse_uuid, push_page, Page,
    PageRequest, RepoError, RepoResult,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::BTreeSet;

const NOTIFICATION_SELECT_SQL: &str = "SELECT
    id,
    user_id,
    case_id,
    kind,
    priority,
    title,
    message,
    send_email,
    is_read,
    read_at,
    deliver_after,
    created_at
FROM notifications";

/// Inbox listing filters.
#[derive(Debug, Clone, Copy, Default)]
pub struct InboxQuery {
    pub unread_only: bool,
    pub page: PageRequest,
}

/// Repository interface for notification operations.
pub trait NotificationRepository {
    fn insert_notification(&self, notification: &Notification) -> RepoResult<()>;
    fn get_notification(&self, id: NotificationId) -> RepoResult<Option<Notification>>;
    /// Visible notifications for `user_id` at `now_ms`, newest first.
    fn list_visible(
        &self,
        user_id: UserId,
        now_ms: i64,
        query: &InboxQuery,
    ) -> RepoResult<Page<Notification>>;
    fn count_unread(&self, user_id: UserId, now_ms: i64) -> RepoResult<u64>;
    /// Returns `false` when the notification does not belong to `user_id`.
    fn mark_read(&self, id: NotificationId, user_id: UserId, read_at: i64) -> RepoResult<bool>;
    fn mark_all_read(&self, user_id: UserId, now_ms: i64) -> RepoResult<u64>;
    fn delete_notification(&self, id: NotificationId, user_id: UserId) -> RepoResult<bool>;
    fn get_preference(&self, user_id: UserId) -> RepoResult<NotificationPreference>;
    fn upsert_preference(&self, preference: &NotificationPreference) -> RepoResult<()>;
}

/// SQLite-backed notification repository.
pub struct SqliteNotificationRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteNotificationRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl NotificationRepository for SqliteNotificationRepository<'_> {
    fn insert_notification(&self, notification: &Notification) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO notifications (
                id,
                user_id,
                case_id,
                kind,
                priority,
                title,
                message,
                send_email,
                is_read,
                read_at,
                deliver_after,
                created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12);",
            params![
                notification.id.to_string(),
                notification.user_id.to_string(),
                notification.case_id.map(|id| id.to_string()),
                notification.kind.as_str(),
                notification.priority.as_str(),
                notification.title.as_str(),
                notification.message.as_str(),
                bool_to_int(notification.send_email),
                bool_to_int(notification.is_read),
                notification.read_at,
                notification.deliver_after,
                notification.created_at,
            ],
        )?;
        Ok(())
    }

    fn get_notification(&self, id: NotificationId) -> RepoResult<Option<Notification>> {
        self.conn
            .query_row(
                &format!("{NOTIFICATION_SELECT_SQL} WHERE id = ?1;"),
                [id.to_string()],
                |row| Ok(parse_notification_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn list_visible(
        &self,
        user_id: UserId,
        now_ms: i64,
        query: &InboxQuery,
    ) -> RepoResult<Page<Notification>> {
        let mut filter = String::from(" WHERE user_id = ? AND deliver_after <= ?");
        let mut bind_values = vec![Value::Text(user_id.to_string()), Value::Integer(now_ms)];
        if query.unread_only {
            filter.push_str(" AND is_read = 0");
        }

        let total: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM notifications{filter};"),
            params_from_iter(bind_values.iter()),
            |row| row.get(0),
        )?;

        let mut sql =
            format!("{NOTIFICATION_SELECT_SQL}{filter} ORDER BY deliver_after DESC, id DESC");
        push_page(&mut sql, &mut bind_values, &query.page);

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_notification_row(row)?);
        }

        Ok(Page {
            items,
            total: total as u64,
            limit: query.page.applied_limit(),
            offset: query.page.offset,
        })
    }

    fn count_unread(&self, user_id: UserId, now_ms: i64) -> RepoResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM notifications
             WHERE user_id = ?1 AND is_read = 0 AND deliver_after <= ?2;",
            params![user_id.to_string(), now_ms],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn mark_read(&self, id: NotificationId, user_id: UserId, read_at: i64) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "UPDATE notifications
             SET is_read = 1, read_at = COALESCE(read_at, ?3)
             WHERE id = ?1 AND user_id = ?2;",
            params![id.to_string(), user_id.to_string(), read_at],
        )?;
        Ok(changed > 0)
    }

    fn mark_all_read(&self, user_id: UserId, now_ms: i64) -> RepoResult<u64> {
        let changed = self.conn.execute(
            "UPDATE notifications
             SET is_read = 1, read_at = ?2
             WHERE user_id = ?1 AND is_read = 0 AND deliver_after <= ?2;",
            params![user_id.to_string(), now_ms],
        )?;
        Ok(changed as u64)
    }

    fn delete_notification(&self, id: NotificationId, user_id: UserId) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "DELETE FROM notifications WHERE id = ?1 AND user_id = ?2;",
            params![id.to_string(), user_id.to_string()],
        )?;
        Ok(changed > 0)
    }

    fn get_preference(&self, user_id: UserId) -> RepoResult<NotificationPreference> {
        let stored = self
            .conn
            .query_row(
                "SELECT
                    user_id,
                    disabled_kinds,
                    email_enabled,
                    quiet_hours_start,
                    quiet_hours_end,
                    utc_offset_minutes,
                    urgent_bypasses_quiet_hours
                 FROM notification_preferences
                 WHERE user_id = ?1;",
                [user_id.to_string()],
                |row| Ok(parse_preference_row(row)),
            )
            .optional()?
            .transpose()?;
        Ok(stored.unwrap_or_else(|| NotificationPreference::default_for(user_id)))
    }

    fn upsert_preference(&self, preference: &NotificationPreference) -> RepoResult<()> {
        let disabled: Vec<&str> = preference
            .disabled_kinds
            .iter()
            .map(|kind| kind.as_str())
            .collect();
        let disabled_json = serde_json::to_string(&disabled)
            .map_err(|err| RepoError::InvalidData(format!("disabled kinds: {err}")))?;
        let (quiet_start, quiet_end) = match preference.quiet_hours {
            Some(quiet) => (Some(quiet.start_minute()), Some(quiet.end_minute())),
            None => (None, None),
        };

        self.conn.execute(
            "INSERT INTO notification_preferences (
                user_id,
                disabled_kinds,
                email_enabled,
                quiet_hours_start,
                quiet_hours_end,
                utc_offset_minutes,
                urgent_bypasses_quiet_hours,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, (strftime('%s', 'now') * 1000))
            ON CONFLICT(user_id) DO UPDATE SET
                disabled_kinds = excluded.disabled_kinds,
                email_enabled = excluded.email_enabled,
                quiet_hours_start = excluded.quiet_hours_start,
                quiet_hours_end = excluded.quiet_hours_end,
                utc_offset_minutes = excluded.utc_offset_minutes,
                urgent_bypasses_quiet_hours = excluded.urgent_bypasses_quiet_hours,
                updated_at = excluded.updated_at;",
            params![
                preference.user_id.to_string(),
                disabled_json,
                bool_to_int(preference.email_enabled),
                quiet_start,
                quiet_end,
                preference.utc_offset_minutes,
                bool_to_int(preference.urgent_bypasses_quiet_hours),
            ],
        )?;
        Ok(())
    }
}

fn parse_notification_row(row: &Row<'_>) -> RepoResult<Notification> {
    let id_text: String = row.get("id")?;
    let user_text: String = row.get("user_id")?;
    let kind_text: String = row.get("kind")?;
    let priority_text: String = row.get("priority")?;
    Ok(Notification {
        id: parse_uuid(&id_text, "notifications.id")?,
        user_id: parse_uuid(&user_text, "notifications.user_id")?,
        case_id: parse_optional_uuid(row.get("case_id")?, "notifications.case_id")?,
        kind: parse_enum(&kind_text, "notifications.kind", NotificationKind::parse)?,
        priority: parse_enum(
            &priority_text,
            "notifications.priority",
            NotificationPriority::parse,
        )?,
        title: row.get("title")?,
        message: row.get("message")?,
        send_email: parse_flag(row.get("send_email")?, "notifications.send_email")?,
        is_read: parse_flag(row.get("is_read")?, "notifications.is_read")?,
        read_at: row.get("read_at")?,
        deliver_after: row.get("deliver_after")?,
        created_at: row.get("created_at")?,
    })
}

fn parse_preference_row(row: &Row<'_>) -> RepoResult<NotificationPreference> {
    let user_text: String = row.get("user_id")?;
    let disabled_text: String = row.get("disabled_kinds")?;
    let quiet_start: Option<u16> = row.get("quiet_hours_start")?;
    let quiet_end: Option<u16> = row.get("quiet_hours_end")?;

    let disabled_raw: Vec<String> = serde_json::from_str(&disabled_text).map_err(|err| {
        RepoError::InvalidData(format!(
            "invalid json in notification_preferences.disabled_kinds: {err}"
        ))
    })?;
    let mut disabled_kinds = BTreeSet::new();
    for value in &disabled_raw {
        disabled_kinds.insert(parse_enum(
            value,
            "notification_preferences.disabled_kinds",
            NotificationKind::parse,
        )?);
    }

    let quiet_hours = match (quiet_start, quiet_end) {
        (Some(start), Some(end)) => Some(QuietHours::new(start, end).ok_or_else(|| {
            RepoError::InvalidData(format!(
                "invalid quiet hours `{start}-{end}` in notification_preferences"
            ))
        })?),
        _ => None,
    };

    Ok(NotificationPreference {
        user_id: parse_uuid(&user_text, "notification_preferences.user_id")?,
        disabled_kinds,
        email_enabled: parse_flag(
            row.get("email_enabled")?,
            "notification_preferences.email_enabled",
        )?,
        quiet_hours,
        utc_offset_minutes: row.get("utc_offset_minutes")?,
        urgent_bypasses_quiet_hours: parse_flag(
            row.get("urgent_bypasses_quiet_hours")?,
            "notification_preferences.urgent_bypasses_quiet_hours",
        )?,
    })
}
