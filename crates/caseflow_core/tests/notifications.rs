mod common;

use caseflow_core::model::notification::{NotificationKind, NotificationPriority, QuietHours};
use caseflow_core::repo::notification_repo::{InboxQuery, SqliteNotificationRepository};
use caseflow_core::repo::PageRequest;
use caseflow_core::service::notification_service::{NewNotification, PreferenceUpdate};
use caseflow_core::{NotificationService, Role, ServiceError};
use common::{Fixture, HOUR_MS, NOW_MS};
use std::collections::BTreeSet;

fn service(fx: &Fixture) -> NotificationService<SqliteNotificationRepository<'_>> {
    NotificationService::new(SqliteNotificationRepository::new(&fx.conn))
}

fn draft(kind: NotificationKind, priority: NotificationPriority) -> NewNotification {
    NewNotification {
        kind,
        priority,
        title: "Case EXP-2024-0001".to_string(),
        message: "Stage moved to appraisal".to_string(),
        case_id: None,
    }
}

fn quiet_morning() -> PreferenceUpdate {
    // 09:00-11:00 UTC surrounds the fixed clock at 10:00.
    PreferenceUpdate {
        quiet_hours: Some(QuietHours::new(9 * 60, 11 * 60)),
        ..PreferenceUpdate::default()
    }
}

#[test]
fn quiet_hours_defer_delivery_until_window_ends() {
    let fx = Fixture::new();
    let (user, actor) = fx.user("ana@caseflow.test", Role::Analyst, None);
    let notifications = service(&fx);
    notifications.update_preferences(&actor, quiet_morning()).unwrap();

    let stored = notifications
        .notify(
            user.id,
            &draft(NotificationKind::StageChanged, NotificationPriority::Normal),
            NOW_MS,
        )
        .unwrap()
        .unwrap();
    assert_eq!(stored.deliver_after, NOW_MS + HOUR_MS);

    assert_eq!(notifications.unread_count(&actor, NOW_MS).unwrap(), 0);
    assert!(notifications
        .list_inbox(&actor, &InboxQuery::default(), NOW_MS)
        .unwrap()
        .items
        .is_empty());

    let later = NOW_MS + HOUR_MS;
    assert_eq!(notifications.unread_count(&actor, later).unwrap(), 1);
    let inbox = notifications
        .list_inbox(&actor, &InboxQuery::default(), later)
        .unwrap();
    assert_eq!(inbox.items[0].id, stored.id);
}

#[test]
fn urgent_notifications_bypass_quiet_hours_when_allowed() {
    let fx = Fixture::new();
    let (user, actor) = fx.user("ana@caseflow.test", Role::Analyst, None);
    let notifications = service(&fx);
    notifications.update_preferences(&actor, quiet_morning()).unwrap();

    let urgent = draft(NotificationKind::SystemAlert, NotificationPriority::Urgent);
    let stored = notifications.notify(user.id, &urgent, NOW_MS).unwrap().unwrap();
    assert_eq!(stored.deliver_after, NOW_MS);
    assert!(stored.send_email);

    notifications
        .update_preferences(
            &actor,
            PreferenceUpdate {
                urgent_bypasses_quiet_hours: Some(false),
                ..PreferenceUpdate::default()
            },
        )
        .unwrap();
    let held = notifications.notify(user.id, &urgent, NOW_MS).unwrap().unwrap();
    assert_eq!(held.deliver_after, NOW_MS + HOUR_MS);
}

#[test]
fn disabled_kinds_are_suppressed_but_system_alerts_are_mandatory() {
    let fx = Fixture::new();
    let (user, actor) = fx.user("ana@caseflow.test", Role::Analyst, None);
    let notifications = service(&fx);

    let err = notifications
        .update_preferences(
            &actor,
            PreferenceUpdate {
                disabled_kinds: Some(BTreeSet::from([NotificationKind::SystemAlert])),
                ..PreferenceUpdate::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));

    let preference = notifications
        .update_preferences(
            &actor,
            PreferenceUpdate {
                disabled_kinds: Some(BTreeSet::from([NotificationKind::DocumentUploaded])),
                ..PreferenceUpdate::default()
            },
        )
        .unwrap();
    assert!(!preference.is_kind_enabled(NotificationKind::DocumentUploaded));
    assert_eq!(notifications.preferences(&actor).unwrap(), preference);

    let suppressed = notifications
        .notify(
            user.id,
            &draft(NotificationKind::DocumentUploaded, NotificationPriority::High),
            NOW_MS,
        )
        .unwrap();
    assert!(suppressed.is_none());
    assert_eq!(notifications.unread_count(&actor, NOW_MS).unwrap(), 0);
}

#[test]
fn email_flag_follows_priority_and_preference() {
    let fx = Fixture::new();
    let (user, actor) = fx.user("ana@caseflow.test", Role::Analyst, None);
    let notifications = service(&fx);

    let normal = notifications
        .notify(
            user.id,
            &draft(NotificationKind::TaskAssigned, NotificationPriority::Normal),
            NOW_MS,
        )
        .unwrap()
        .unwrap();
    assert!(!normal.send_email);
    let high = notifications
        .notify(
            user.id,
            &draft(NotificationKind::TaskAssigned, NotificationPriority::High),
            NOW_MS,
        )
        .unwrap()
        .unwrap();
    assert!(high.send_email);

    notifications
        .update_preferences(
            &actor,
            PreferenceUpdate {
                email_enabled: Some(false),
                ..PreferenceUpdate::default()
            },
        )
        .unwrap();
    let muted = notifications
        .notify(
            user.id,
            &draft(NotificationKind::TaskAssigned, NotificationPriority::Urgent),
            NOW_MS,
        )
        .unwrap()
        .unwrap();
    assert!(!muted.send_email);
}

#[test]
fn out_of_range_utc_offset_is_rejected() {
    let fx = Fixture::new();
    let (_, actor) = fx.user("ana@caseflow.test", Role::Analyst, None);
    let err = service(&fx)
        .update_preferences(
            &actor,
            PreferenceUpdate {
                utc_offset_minutes: Some(15 * 60),
                ..PreferenceUpdate::default()
            },
        )
        .unwrap_err();
    assert_eq!(err.status_code(), 400);
}

#[test]
fn quiet_hours_only_hold_minutes_within_a_day() {
    let fx = Fixture::new();
    let (_, actor) = fx.user("ana@caseflow.test", Role::Analyst, None);
    let notifications = service(&fx);

    assert!(QuietHours::new(1500, 60).is_none());
    assert!(serde_json::from_str::<QuietHours>(r#"{"start_minute":1500,"end_minute":60}"#).is_err());

    let overnight = QuietHours::new(22 * 60, 6 * 60);
    notifications
        .update_preferences(
            &actor,
            PreferenceUpdate {
                quiet_hours: Some(overnight),
                ..PreferenceUpdate::default()
            },
        )
        .unwrap();
    let stored = notifications.preferences(&actor).unwrap().quiet_hours.unwrap();
    assert_eq!((stored.start_minute(), stored.end_minute()), (22 * 60, 6 * 60));
}

#[test]
fn read_marks_and_deletion_stay_within_own_inbox() {
    let fx = Fixture::new();
    let (user, actor) = fx.user("ana@caseflow.test", Role::Analyst, None);
    let (_, other) = fx.user("bob@caseflow.test", Role::Analyst, None);
    let notifications = service(&fx);
    let kinds = [
        NotificationKind::StageChanged,
        NotificationKind::TaskAssigned,
        NotificationKind::MeetingScheduled,
    ];
    let stored: Vec<_> = kinds
        .into_iter()
        .map(|kind| {
            notifications
                .notify(user.id, &draft(kind, NotificationPriority::Normal), NOW_MS)
                .unwrap()
                .unwrap()
        })
        .collect();
    assert_eq!(notifications.unread_count(&actor, NOW_MS).unwrap(), 3);

    assert!(matches!(
        notifications.mark_read(&other, stored[0].id, NOW_MS).unwrap_err(),
        ServiceError::NotFound { .. }
    ));
    notifications.mark_read(&actor, stored[0].id, NOW_MS).unwrap();
    assert_eq!(notifications.unread_count(&actor, NOW_MS).unwrap(), 2);

    let unread = notifications
        .list_inbox(
            &actor,
            &InboxQuery {
                unread_only: true,
                page: PageRequest::new(Some(1), 0),
            },
            NOW_MS,
        )
        .unwrap();
    assert_eq!(unread.total, 2);
    assert_eq!(unread.items.len(), 1);
    assert!(unread.has_more());

    assert_eq!(notifications.mark_all_read(&actor, NOW_MS).unwrap(), 2);
    assert_eq!(notifications.unread_count(&actor, NOW_MS).unwrap(), 0);

    assert!(notifications.delete(&other, stored[1].id).is_err());
    notifications.delete(&actor, stored[1].id).unwrap();
    let inbox = notifications
        .list_inbox(&actor, &InboxQuery::default(), NOW_MS)
        .unwrap();
    assert_eq!(inbox.total, 2);
}

#[test]
fn broadcast_requires_permission_and_deduplicates_recipients() {
    let fx = Fixture::new();
    let (first, analyst) = fx.user("ana@caseflow.test", Role::Analyst, None);
    let (second, _) = fx.user("bob@caseflow.test", Role::Observer, None);
    let notifications = service(&fx);
    let alert = draft(NotificationKind::SystemAlert, NotificationPriority::High);

    let err = notifications
        .broadcast(&analyst, [first.id, second.id], &alert, NOW_MS)
        .unwrap_err();
    assert_eq!(err.status_code(), 403);

    let sent = notifications
        .broadcast(&fx.admin, [first.id, second.id, first.id], &alert, NOW_MS)
        .unwrap();
    assert_eq!(sent.len(), 2);
}

#[test]
fn blank_drafts_are_rejected() {
    let fx = Fixture::new();
    let (user, _) = fx.user("ana@caseflow.test", Role::Analyst, None);
    let mut blank = draft(NotificationKind::StageChanged, NotificationPriority::Normal);
    blank.message = "   ".to_string();

    let err = service(&fx).notify(user.id, &blank, NOW_MS).unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
}
