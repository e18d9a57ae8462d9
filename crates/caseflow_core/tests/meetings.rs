mod common;

use caseflow_core::model::meeting::{MeetingStatus, ParticipantResponse};
use caseflow_core::model::notification::NotificationKind;
use caseflow_core::repo::meeting_repo::MeetingWindow;
use caseflow_core::repo::notification_repo::{InboxQuery, SqliteNotificationRepository};
use caseflow_core::service::meeting_service::MeetingChange;
use caseflow_core::{
    Actor, MeetingService, NewMeeting, NotificationService, Role, ServiceError,
};
use common::{Fixture, HOUR_MS, NOW_MS};

fn inbox_kinds(fx: &Fixture, actor: &Actor) -> Vec<NotificationKind> {
    NotificationService::new(SqliteNotificationRepository::new(&fx.conn))
        .list_inbox(actor, &InboxQuery::default(), NOW_MS)
        .unwrap()
        .items
        .into_iter()
        .map(|notification| notification.kind)
        .collect()
}

fn site_visit(case_id: Option<uuid::Uuid>, participants: Vec<uuid::Uuid>) -> NewMeeting {
    NewMeeting {
        case_id,
        title: "Site visit".to_string(),
        agenda: Some("Walk the parcel boundary".to_string()),
        location: Some("Parcel 12".to_string()),
        starts_at: NOW_MS + 24 * HOUR_MS,
        ends_at: NOW_MS + 25 * HOUR_MS,
        participant_ids: participants,
    }
}

#[test]
fn scheduling_invites_participants_and_notifies_them() {
    let fx = Fixture::new();
    let legal = fx.department("LEGAL", None);
    let (_, organizer) = fx.user("org@caseflow.test", Role::Analyst, Some(legal.id));
    let (guest_user, guest) = fx.user("guest@caseflow.test", Role::Observer, Some(legal.id));
    let case = fx.case(&organizer, "Parcel 12");

    let meeting = MeetingService::new(fx.ctx())
        .schedule(
            &organizer,
            site_visit(Some(case.id), vec![guest_user.id, organizer.user_id]),
        )
        .unwrap();

    assert_eq!(meeting.status, MeetingStatus::Scheduled);
    assert_eq!(meeting.organizer_id, organizer.user_id);
    assert_eq!(meeting.participants.len(), 1);
    assert_eq!(meeting.participants[0].user_id, guest_user.id);
    assert_eq!(meeting.participants[0].response, ParticipantResponse::Pending);
    assert_eq!(meeting.duration_minutes(), 60);
    assert_eq!(inbox_kinds(&fx, &guest), vec![NotificationKind::MeetingScheduled]);
}

#[test]
fn meeting_must_end_after_it_starts() {
    let fx = Fixture::new();
    let mut input = site_visit(None, Vec::new());
    input.ends_at = input.starts_at;

    let err = MeetingService::new(fx.ctx())
        .schedule(&fx.admin, input)
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
}

#[test]
fn observers_cannot_schedule() {
    let fx = Fixture::new();
    let legal = fx.department("LEGAL", None);
    let (_, observer) = fx.user("obs@caseflow.test", Role::Observer, Some(legal.id));

    let err = MeetingService::new(fx.ctx())
        .schedule(&observer, site_visit(None, Vec::new()))
        .unwrap_err();
    assert_eq!(err.status_code(), 403);
}

#[test]
fn participants_respond_and_reschedule_resets_answers() {
    let fx = Fixture::new();
    let legal = fx.department("LEGAL", None);
    let (_, organizer) = fx.user("org@caseflow.test", Role::Analyst, Some(legal.id));
    let (guest_user, guest) = fx.user("guest@caseflow.test", Role::Analyst, Some(legal.id));
    let service = MeetingService::new(fx.ctx());
    let meeting = service
        .schedule(&organizer, site_visit(None, vec![guest_user.id]))
        .unwrap();

    let err = service
        .respond(&guest, meeting.id, ParticipantResponse::Pending)
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));

    let answered = service
        .respond(&guest, meeting.id, ParticipantResponse::Accepted)
        .unwrap();
    assert_eq!(answered.participants[0].response, ParticipantResponse::Accepted);
    assert_eq!(answered.participants[0].responded_at, Some(NOW_MS));

    let renamed = service
        .reschedule(
            &organizer,
            meeting.id,
            MeetingChange {
                title: Some("Site visit (north gate)".to_string()),
                ..MeetingChange::default()
            },
        )
        .unwrap();
    assert_eq!(renamed.participants[0].response, ParticipantResponse::Accepted);

    let moved = service
        .reschedule(
            &organizer,
            meeting.id,
            MeetingChange {
                starts_at: Some(NOW_MS + 48 * HOUR_MS),
                ends_at: Some(NOW_MS + 50 * HOUR_MS),
                ..MeetingChange::default()
            },
        )
        .unwrap();
    assert_eq!(moved.participants[0].response, ParticipantResponse::Pending);
    assert!(inbox_kinds(&fx, &guest).contains(&NotificationKind::MeetingUpdated));

    let err = service
        .reschedule(&guest, meeting.id, MeetingChange::default())
        .unwrap_err();
    assert_eq!(err.status_code(), 403);
}

#[test]
fn uninvited_users_cannot_respond() {
    let fx = Fixture::new();
    let legal = fx.department("LEGAL", None);
    let (_, organizer) = fx.user("org@caseflow.test", Role::Analyst, Some(legal.id));
    let (_, stranger) = fx.user("x@caseflow.test", Role::Analyst, Some(legal.id));
    let service = MeetingService::new(fx.ctx());
    let meeting = service
        .schedule(&organizer, site_visit(None, Vec::new()))
        .unwrap();

    let err = service
        .respond(&stranger, meeting.id, ParticipantResponse::Declined)
        .unwrap_err();
    assert_eq!(err.status_code(), 403);
    assert!(matches!(
        service.get_meeting(&stranger, meeting.id).unwrap_err(),
        ServiceError::NotFound { .. }
    ));
}

#[test]
fn invite_adds_only_new_participants() {
    let fx = Fixture::new();
    let legal = fx.department("LEGAL", None);
    let (_, organizer) = fx.user("org@caseflow.test", Role::Analyst, Some(legal.id));
    let (first_user, first) = fx.user("a@caseflow.test", Role::Analyst, Some(legal.id));
    let (second_user, _) = fx.user("b@caseflow.test", Role::Analyst, Some(legal.id));
    let service = MeetingService::new(fx.ctx());
    let meeting = service
        .schedule(&organizer, site_visit(None, vec![first_user.id]))
        .unwrap();

    let updated = service
        .invite(&organizer, meeting.id, &[first_user.id, second_user.id])
        .unwrap();
    assert_eq!(updated.participants.len(), 2);
    assert_eq!(inbox_kinds(&fx, &first), vec![NotificationKind::MeetingScheduled]);
}

#[test]
fn cancelled_meetings_are_frozen_and_hidden_by_default() {
    let fx = Fixture::new();
    let legal = fx.department("LEGAL", None);
    let (_, organizer) = fx.user("org@caseflow.test", Role::Analyst, Some(legal.id));
    let (guest_user, guest) = fx.user("guest@caseflow.test", Role::Analyst, Some(legal.id));
    let service = MeetingService::new(fx.ctx());
    let meeting = service
        .schedule(&organizer, site_visit(None, vec![guest_user.id]))
        .unwrap();

    let cancelled = service
        .cancel(&organizer, meeting.id, Some("Owner unavailable".to_string()))
        .unwrap();
    assert_eq!(cancelled.status, MeetingStatus::Cancelled);
    assert!(inbox_kinds(&fx, &guest).contains(&NotificationKind::MeetingCancelled));

    assert!(matches!(
        service
            .respond(&guest, meeting.id, ParticipantResponse::Accepted)
            .unwrap_err(),
        ServiceError::Conflict(_)
    ));
    assert!(matches!(
        service.cancel(&organizer, meeting.id, None).unwrap_err(),
        ServiceError::Conflict(_)
    ));

    assert!(service
        .list_for_user(&guest, MeetingWindow::default())
        .unwrap()
        .is_empty());
    let all = service
        .list_for_user(
            &guest,
            MeetingWindow {
                include_cancelled: true,
                ..MeetingWindow::default()
            },
        )
        .unwrap();
    assert_eq!(all.len(), 1);
}

#[test]
fn future_meetings_cannot_be_completed() {
    let fx = Fixture::new();
    let service = MeetingService::new(fx.ctx());
    let upcoming = service
        .schedule(&fx.admin, site_visit(None, Vec::new()))
        .unwrap();
    assert!(matches!(
        service.complete(&fx.admin, upcoming.id).unwrap_err(),
        ServiceError::Validation(_)
    ));

    let mut past = site_visit(None, Vec::new());
    past.starts_at = NOW_MS - 2 * HOUR_MS;
    past.ends_at = NOW_MS - HOUR_MS;
    let held = service.schedule(&fx.admin, past).unwrap();
    let completed = service.complete(&fx.admin, held.id).unwrap();
    assert_eq!(completed.status, MeetingStatus::Completed);
}

#[test]
fn listing_respects_time_window_and_case_scope() {
    let fx = Fixture::new();
    let legal = fx.department("LEGAL", None);
    let finance = fx.department("FINANCE", None);
    let (_, organizer) = fx.user("org@caseflow.test", Role::Analyst, Some(legal.id));
    let (_, outsider) = fx.user("fin@caseflow.test", Role::Analyst, Some(finance.id));
    let case = fx.case(&organizer, "Parcel 12");
    let service = MeetingService::new(fx.ctx());
    let tomorrow = service
        .schedule(&organizer, site_visit(Some(case.id), Vec::new()))
        .unwrap();
    let mut next_week = site_visit(Some(case.id), Vec::new());
    next_week.starts_at = NOW_MS + 7 * 24 * HOUR_MS;
    next_week.ends_at = next_week.starts_at + HOUR_MS;
    service.schedule(&organizer, next_week).unwrap();

    let window = MeetingWindow {
        from: Some(NOW_MS),
        to: Some(NOW_MS + 2 * 24 * HOUR_MS),
        include_cancelled: false,
    };
    let upcoming = service.list_for_user(&organizer, window).unwrap();
    assert_eq!(upcoming.len(), 1);
    assert_eq!(upcoming[0].id, tomorrow.id);

    assert_eq!(
        service
            .list_for_case(&organizer, case.id, MeetingWindow::default())
            .unwrap()
            .len(),
        2
    );
    assert_eq!(
        service
            .list_for_case(&outsider, case.id, MeetingWindow::default())
            .unwrap_err()
            .status_code(),
        403
    );
}
