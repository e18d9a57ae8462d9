//! Meeting scheduling use-cases.
//!
//! # Invariants
//! - `ends_at` is strictly after `starts_at`.
//! - Participants are existing, active users; the organizer is implicit.
//! - Only the organizer (or a super admin) changes or cancels a meeting.
//! - Rescheduling resets every participant response to `pending`.

use crate::auth::{Actor, Permission};
use crate::model::activity::EntityType;
use crate::model::case::CaseId;
use crate::model::directory::UserId;
use crate::model::meeting::{
    Meeting, MeetingId, MeetingParticipant, MeetingStatus, ParticipantResponse,
};
use crate::model::notification::{NotificationKind, NotificationPriority};
use crate::repo::meeting_repo::{MeetingRepository, MeetingWindow, SqliteMeetingRepository};
use crate::repo::notification_repo::SqliteNotificationRepository;
use crate::repo::user_repo::{SqliteUserRepository, UserRepository};
use crate::service::notification_service::{NewNotification, NotificationService};
use crate::service::{
    finish, load_visible_case, non_blank, record_activity, require, required, ServiceContext,
    ServiceError, ServiceResult,
};
use serde_json::json;
use std::collections::BTreeSet;
use std::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewMeeting {
    pub case_id: Option<CaseId>,
    pub title: String,
    pub agenda: Option<String>,
    pub location: Option<String>,
    pub starts_at: i64,
    pub ends_at: i64,
    pub participant_ids: Vec<UserId>,
}

/// Partial change; `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MeetingChange {
    pub title: Option<String>,
    pub agenda: Option<Option<String>>,
    pub location: Option<Option<String>>,
    pub starts_at: Option<i64>,
    pub ends_at: Option<i64>,
}

pub struct MeetingService<'a> {
    ctx: ServiceContext<'a>,
}

impl<'a> MeetingService<'a> {
    pub fn new(ctx: ServiceContext<'a>) -> Self {
        Self { ctx }
    }

    fn repo(&self) -> SqliteMeetingRepository<'a> {
        SqliteMeetingRepository::new(self.ctx.conn)
    }

    fn notifications(&self) -> NotificationService<SqliteNotificationRepository<'a>> {
        NotificationService::new(SqliteNotificationRepository::new(self.ctx.conn))
    }

    pub fn schedule(&self, actor: &Actor, input: NewMeeting) -> ServiceResult<Meeting> {
        let started = Instant::now();
        finish("meeting_schedule", started, self.schedule_inner(actor, input))
    }

    fn schedule_inner(&self, actor: &Actor, input: NewMeeting) -> ServiceResult<Meeting> {
        require(actor, Permission::MeetingSchedule)?;
        let title = required(&input.title, "title")?;
        ensure_time_order(input.starts_at, input.ends_at)?;
        let case = match input.case_id {
            Some(case_id) => Some(load_visible_case(&self.ctx, actor, case_id)?),
            None => None,
        };
        let participant_ids = self.resolve_participants(actor, &input.participant_ids)?;

        let now = self.ctx.now();
        let meeting = Meeting {
            id: Uuid::new_v4(),
            case_id: case.as_ref().map(|case| case.id),
            organizer_id: actor.user_id,
            title,
            agenda: non_blank(input.agenda),
            location: non_blank(input.location),
            starts_at: input.starts_at,
            ends_at: input.ends_at,
            status: MeetingStatus::Scheduled,
            participants: participant_ids
                .iter()
                .map(|user_id| MeetingParticipant {
                    user_id: *user_id,
                    response: ParticipantResponse::Pending,
                    responded_at: None,
                })
                .collect(),
            created_at: now,
            updated_at: now,
        };
        self.repo().insert_meeting(&meeting)?;
        record_activity(
            &self.ctx,
            Some(actor.user_id),
            "meeting.scheduled",
            (EntityType::Meeting, meeting.id),
            meeting.case_id,
            Some(json!({ "participants": participant_ids.len() })),
        )?;

        let draft = NewNotification {
            kind: NotificationKind::MeetingScheduled,
            priority: NotificationPriority::Normal,
            title: format!("Meeting scheduled: {}", meeting.title),
            message: meeting_summary(&meeting),
            case_id: meeting.case_id,
        };
        self.notifications()
            .notify_many(participant_ids, Some(actor.user_id), &draft, now)?;
        Ok(meeting)
    }

    /// Organizer, participants and anyone who can see the linked case.
    pub fn get_meeting(&self, actor: &Actor, id: MeetingId) -> ServiceResult<Meeting> {
        let meeting = self.load(id)?;
        let involved = actor.is_super_admin()
            || meeting.organizer_id == actor.user_id
            || meeting
                .participants
                .iter()
                .any(|participant| participant.user_id == actor.user_id);
        if !involved {
            match meeting.case_id {
                Some(case_id) => {
                    load_visible_case(&self.ctx, actor, case_id)?;
                }
                None => return Err(ServiceError::not_found("meeting", id)),
            }
        }
        Ok(meeting)
    }

    /// Applies `change`; a new time window resets responses.
    pub fn reschedule(
        &self,
        actor: &Actor,
        id: MeetingId,
        change: MeetingChange,
    ) -> ServiceResult<Meeting> {
        let started = Instant::now();
        finish("meeting_reschedule", started, self.reschedule_inner(actor, id, change))
    }

    fn reschedule_inner(
        &self,
        actor: &Actor,
        id: MeetingId,
        change: MeetingChange,
    ) -> ServiceResult<Meeting> {
        let mut meeting = self.load_for_organizer(actor, id)?;
        let previous_window = (meeting.starts_at, meeting.ends_at);

        if let Some(title) = change.title {
            meeting.title = required(&title, "title")?;
        }
        if let Some(agenda) = change.agenda {
            meeting.agenda = non_blank(agenda);
        }
        if let Some(location) = change.location {
            meeting.location = non_blank(location);
        }
        meeting.starts_at = change.starts_at.unwrap_or(meeting.starts_at);
        meeting.ends_at = change.ends_at.unwrap_or(meeting.ends_at);
        ensure_time_order(meeting.starts_at, meeting.ends_at)?;

        let now = self.ctx.now();
        meeting.updated_at = now;
        let repo = self.repo();
        repo.update_meeting(&meeting)?;
        let time_changed = previous_window != (meeting.starts_at, meeting.ends_at);
        if time_changed {
            repo.reset_responses(meeting.id)?;
        }
        record_activity(
            &self.ctx,
            Some(actor.user_id),
            "meeting.updated",
            (EntityType::Meeting, meeting.id),
            meeting.case_id,
            Some(json!({ "time_changed": time_changed })),
        )?;

        let meeting = self.load(id)?;
        let draft = NewNotification {
            kind: NotificationKind::MeetingUpdated,
            priority: NotificationPriority::Normal,
            title: format!("Meeting updated: {}", meeting.title),
            message: meeting_summary(&meeting),
            case_id: meeting.case_id,
        };
        self.notifications().notify_many(
            participant_ids(&meeting),
            Some(actor.user_id),
            &draft,
            now,
        )?;
        Ok(meeting)
    }

    /// Adds participants to a scheduled meeting and notifies only the new ones.
    pub fn invite(
        &self,
        actor: &Actor,
        id: MeetingId,
        user_ids: &[UserId],
    ) -> ServiceResult<Meeting> {
        let started = Instant::now();
        finish("meeting_invite", started, self.invite_inner(actor, id, user_ids))
    }

    fn invite_inner(
        &self,
        actor: &Actor,
        id: MeetingId,
        user_ids: &[UserId],
    ) -> ServiceResult<Meeting> {
        let meeting = self.load_for_organizer(actor, id)?;
        let existing: BTreeSet<UserId> = participant_ids(&meeting).collect();
        let added: Vec<UserId> = self
            .resolve_participants(actor, user_ids)?
            .into_iter()
            .filter(|user_id| !existing.contains(user_id))
            .collect();
        if added.is_empty() {
            return Ok(meeting);
        }

        let repo = self.repo();
        for user_id in &added {
            repo.add_participant(meeting.id, *user_id)?;
        }
        let draft = NewNotification {
            kind: NotificationKind::MeetingScheduled,
            priority: NotificationPriority::Normal,
            title: format!("Meeting scheduled: {}", meeting.title),
            message: meeting_summary(&meeting),
            case_id: meeting.case_id,
        };
        self.notifications()
            .notify_many(added, Some(actor.user_id), &draft, self.ctx.now())?;
        self.load(id)
    }

    pub fn cancel(
        &self,
        actor: &Actor,
        id: MeetingId,
        reason: Option<String>,
    ) -> ServiceResult<Meeting> {
        let started = Instant::now();
        finish("meeting_cancel", started, self.cancel_inner(actor, id, reason))
    }

    fn cancel_inner(
        &self,
        actor: &Actor,
        id: MeetingId,
        reason: Option<String>,
    ) -> ServiceResult<Meeting> {
        let mut meeting = self.load_for_organizer(actor, id)?;
        let now = self.ctx.now();
        meeting.status = MeetingStatus::Cancelled;
        meeting.updated_at = now;
        self.repo().update_meeting(&meeting)?;
        record_activity(
            &self.ctx,
            Some(actor.user_id),
            "meeting.cancelled",
            (EntityType::Meeting, meeting.id),
            meeting.case_id,
            None,
        )?;

        let message = match non_blank(reason) {
            Some(reason) => format!("{} Reason: {reason}", meeting_summary(&meeting)),
            None => meeting_summary(&meeting),
        };
        let draft = NewNotification {
            kind: NotificationKind::MeetingCancelled,
            priority: NotificationPriority::High,
            title: format!("Meeting cancelled: {}", meeting.title),
            message,
            case_id: meeting.case_id,
        };
        self.notifications().notify_many(
            participant_ids(&meeting),
            Some(actor.user_id),
            &draft,
            now,
        )?;
        Ok(meeting)
    }

    /// Marks a held meeting as completed.
    pub fn complete(&self, actor: &Actor, id: MeetingId) -> ServiceResult<Meeting> {
        let mut meeting = self.load_for_organizer(actor, id)?;
        let now = self.ctx.now();
        if meeting.starts_at > now {
            return Err(ServiceError::validation(
                "a meeting cannot be completed before it starts",
            ));
        }
        meeting.status = MeetingStatus::Completed;
        meeting.updated_at = now;
        self.repo().update_meeting(&meeting)?;
        Ok(meeting)
    }

    /// Records the caller's answer to an invitation.
    pub fn respond(
        &self,
        actor: &Actor,
        id: MeetingId,
        response: ParticipantResponse,
    ) -> ServiceResult<Meeting> {
        if response == ParticipantResponse::Pending {
            return Err(ServiceError::validation(
                "response must be accepted, declined or tentative",
            ));
        }
        let meeting = self.load(id)?;
        if !meeting
            .participants
            .iter()
            .any(|participant| participant.user_id == actor.user_id)
        {
            return Err(ServiceError::forbidden("caller is not invited to this meeting"));
        }
        if meeting.status != MeetingStatus::Scheduled {
            return Err(ServiceError::Conflict(format!(
                "meeting is {}",
                meeting.status.as_str()
            )));
        }
        self.repo()
            .set_response(id, actor.user_id, response, self.ctx.now())?;
        self.load(id)
    }

    /// Meetings the caller organizes or attends.
    pub fn list_for_user(
        &self,
        actor: &Actor,
        window: MeetingWindow,
    ) -> ServiceResult<Vec<Meeting>> {
        Ok(self.repo().list_for_user(actor.user_id, &window)?)
    }

    pub fn list_for_case(
        &self,
        actor: &Actor,
        case_id: CaseId,
        window: MeetingWindow,
    ) -> ServiceResult<Vec<Meeting>> {
        let case = load_visible_case(&self.ctx, actor, case_id)?;
        Ok(self.repo().list_for_case(case.id, &window)?)
    }

    fn load(&self, id: MeetingId) -> ServiceResult<Meeting> {
        self.repo()
            .get_meeting(id)?
            .ok_or_else(|| ServiceError::not_found("meeting", id))
    }

    fn load_for_organizer(&self, actor: &Actor, id: MeetingId) -> ServiceResult<Meeting> {
        let meeting = self.get_meeting(actor, id)?;
        if meeting.organizer_id != actor.user_id && !actor.is_super_admin() {
            return Err(ServiceError::forbidden(
                "only the organizer can change this meeting",
            ));
        }
        if meeting.status != MeetingStatus::Scheduled {
            return Err(ServiceError::Conflict(format!(
                "meeting is {}",
                meeting.status.as_str()
            )));
        }
        Ok(meeting)
    }

    /// Deduplicated, active invitees without the organizer.
    fn resolve_participants(
        &self,
        actor: &Actor,
        user_ids: &[UserId],
    ) -> ServiceResult<BTreeSet<UserId>> {
        let users = SqliteUserRepository::new(self.ctx.conn);
        let mut resolved = BTreeSet::new();
        for user_id in user_ids {
            if *user_id == actor.user_id {
                continue;
            }
            match users.get_user(*user_id)? {
                Some(user) if user.is_active => {
                    resolved.insert(user.id);
                }
                Some(_) => {
                    return Err(ServiceError::validation(format!(
                        "participant {user_id} is inactive"
                    )))
                }
                None => return Err(ServiceError::not_found("user", user_id)),
            }
        }
        Ok(resolved)
    }
}

fn ensure_time_order(starts_at: i64, ends_at: i64) -> ServiceResult<()> {
    if ends_at <= starts_at {
        return Err(ServiceError::validation(
            "`ends_at` must be after `starts_at`",
        ));
    }
    Ok(())
}

fn participant_ids(meeting: &Meeting) -> impl Iterator<Item = UserId> + '_ {
    meeting
        .participants
        .iter()
        .map(|participant| participant.user_id)
}

fn meeting_summary(meeting: &Meeting) -> String {
    match &meeting.location {
        Some(location) => format!(
            "{} minutes starting at {} in {location}.",
            meeting.duration_minutes(),
            meeting.starts_at
        ),
        None => format!(
            "{} minutes starting at {}.",
            meeting.duration_minutes(),
            meeting.starts_at
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::ensure_time_order;

    #[test]
    fn end_must_follow_start() {
        assert!(ensure_time_order(1_000, 2_000).is_ok());
        assert!(ensure_time_order(2_000, 2_000).is_err());
        assert!(ensure_time_order(3_000, 2_000).is_err());
    }
}
