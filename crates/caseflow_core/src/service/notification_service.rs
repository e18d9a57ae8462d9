//! Notification use-case service.
//!
//! # Responsibility
//! - Evaluate recipient preferences and persist delivered or deferred items.
//! - Serve the inbox: visible listing, unread count, read marks, deletion.
//! - Read and update per-user preferences.
//!
//! # Invariants
//! - Suppressed notifications are never stored.
//! - Deferred notifications stay hidden until `deliver_after`.
//! - Users only touch their own inbox rows.

use crate::auth::{Actor, Permission};
use crate::model::directory::UserId;
use crate::model::notification::{
    DeliveryDecision, Notification, NotificationId, NotificationKind, NotificationPreference,
    NotificationPriority, QuietHours,
};
use crate::repo::notification_repo::{InboxQuery, NotificationRepository};
use crate::repo::Page;
use crate::service::{require, ServiceError, ServiceResult};
use log::debug;
use std::collections::BTreeSet;
use uuid::Uuid;

/// Content of a notification before recipient evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub kind: NotificationKind,
    pub priority: NotificationPriority,
    pub title: String,
    pub message: String,
    pub case_id: Option<Uuid>,
}

/// Partial preference update; `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreferenceUpdate {
    pub disabled_kinds: Option<BTreeSet<NotificationKind>>,
    pub email_enabled: Option<bool>,
    /// `Some(None)` clears quiet hours.
    pub quiet_hours: Option<Option<QuietHours>>,
    pub utc_offset_minutes: Option<i32>,
    pub urgent_bypasses_quiet_hours: Option<bool>,
}

const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

/// Notification service facade over repository implementations.
pub struct NotificationService<R: NotificationRepository> {
    repo: R,
}

impl<R: NotificationRepository> NotificationService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Evaluates `user_id`'s preferences and stores the notification.
    ///
    /// Returns `None` when the recipient disabled this kind.
    pub fn notify(
        &self,
        user_id: UserId,
        draft: &NewNotification,
        now_ms: i64,
    ) -> ServiceResult<Option<Notification>> {
        if draft.title.trim().is_empty() || draft.message.trim().is_empty() {
            return Err(ServiceError::validation(
                "notification title and message are required",
            ));
        }

        let preference = self.repo.get_preference(user_id)?;
        let (deliver_after, send_email) =
            match preference.evaluate(draft.kind, draft.priority, now_ms) {
                DeliveryDecision::Suppress => {
                    debug!(
                        "event=notification_suppressed module=service kind={}",
                        draft.kind.as_str()
                    );
                    return Ok(None);
                }
                DeliveryDecision::Deliver { send_email } => (now_ms, send_email),
                DeliveryDecision::Defer {
                    deliver_after,
                    send_email,
                } => (deliver_after, send_email),
            };

        let notification = Notification {
            id: Uuid::new_v4(),
            user_id,
            case_id: draft.case_id,
            kind: draft.kind,
            priority: draft.priority,
            title: draft.title.trim().to_string(),
            message: draft.message.trim().to_string(),
            send_email,
            is_read: false,
            read_at: None,
            deliver_after,
            created_at: now_ms,
        };
        self.repo.insert_notification(&notification)?;
        Ok(Some(notification))
    }

    /// Sends one draft to each distinct recipient, skipping `exclude`.
    pub fn notify_many(
        &self,
        recipients: impl IntoIterator<Item = UserId>,
        exclude: Option<UserId>,
        draft: &NewNotification,
        now_ms: i64,
    ) -> ServiceResult<Vec<Notification>> {
        let unique: BTreeSet<UserId> = recipients
            .into_iter()
            .filter(|user_id| Some(*user_id) != exclude)
            .collect();
        let mut stored = Vec::new();
        for user_id in unique {
            if let Some(notification) = self.notify(user_id, draft, now_ms)? {
                stored.push(notification);
            }
        }
        Ok(stored)
    }

    /// Operator broadcast; requires `NotificationBroadcast`.
    pub fn broadcast(
        &self,
        actor: &Actor,
        recipients: impl IntoIterator<Item = UserId>,
        draft: &NewNotification,
        now_ms: i64,
    ) -> ServiceResult<Vec<Notification>> {
        require(actor, Permission::NotificationBroadcast)?;
        self.notify_many(recipients, None, draft, now_ms)
    }

    pub fn list_inbox(
        &self,
        actor: &Actor,
        query: &InboxQuery,
        now_ms: i64,
    ) -> ServiceResult<Page<Notification>> {
        Ok(self.repo.list_visible(actor.user_id, now_ms, query)?)
    }

    pub fn unread_count(&self, actor: &Actor, now_ms: i64) -> ServiceResult<u64> {
        Ok(self.repo.count_unread(actor.user_id, now_ms)?)
    }

    pub fn mark_read(&self, actor: &Actor, id: NotificationId, now_ms: i64) -> ServiceResult<()> {
        if self.repo.mark_read(id, actor.user_id, now_ms)? {
            Ok(())
        } else {
            Err(ServiceError::not_found("notification", id))
        }
    }

    /// Marks every visible notification read; returns how many changed.
    pub fn mark_all_read(&self, actor: &Actor, now_ms: i64) -> ServiceResult<u64> {
        Ok(self.repo.mark_all_read(actor.user_id, now_ms)?)
    }

    pub fn delete(&self, actor: &Actor, id: NotificationId) -> ServiceResult<()> {
        if self.repo.delete_notification(id, actor.user_id)? {
            Ok(())
        } else {
            Err(ServiceError::not_found("notification", id))
        }
    }

    pub fn preferences(&self, actor: &Actor) -> ServiceResult<NotificationPreference> {
        Ok(self.repo.get_preference(actor.user_id)?)
    }

    pub fn update_preferences(
        &self,
        actor: &Actor,
        update: PreferenceUpdate,
    ) -> ServiceResult<NotificationPreference> {
        let mut preference = self.repo.get_preference(actor.user_id)?;

        if let Some(disabled) = update.disabled_kinds {
            if let Some(kind) = disabled.iter().find(|kind| kind.is_mandatory()) {
                return Err(ServiceError::Validation(format!(
                    "notification type `{}` cannot be disabled",
                    kind.as_str()
                )));
            }
            preference.disabled_kinds = disabled;
        }
        if let Some(email_enabled) = update.email_enabled {
            preference.email_enabled = email_enabled;
        }
        if let Some(quiet_hours) = update.quiet_hours {
            preference.quiet_hours = quiet_hours;
        }
        if let Some(offset) = update.utc_offset_minutes {
            if offset.abs() > MAX_UTC_OFFSET_MINUTES {
                return Err(ServiceError::Validation(format!(
                    "utc_offset_minutes must be within ±{MAX_UTC_OFFSET_MINUTES}"
                )));
            }
            preference.utc_offset_minutes = offset;
        }
        if let Some(bypass) = update.urgent_bypasses_quiet_hours {
            preference.urgent_bypasses_quiet_hours = bypass;
        }

        self.repo.upsert_preference(&preference)?;
        Ok(preference)
    }
}
