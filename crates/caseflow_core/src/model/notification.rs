//! Notification model and delivery-preference evaluation.
//!
//! # Responsibility
//! - Define notification records and per-user delivery preferences.
//! - Decide whether a notification is delivered now, deferred past quiet
//!   hours, or suppressed.
//!
//! # Invariants
//! - Quiet-hour bounds are minutes of local day in `0..1440`.
//! - `start == end` means no quiet window.
//! - A window with `start > end` wraps past midnight.
//! - Evaluation is pure; callers pass the current time explicitly.

use crate::model::directory::UserId;
use chrono::{DateTime, FixedOffset, NaiveTime, Offset, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

pub type NotificationId = Uuid;

pub const MINUTES_PER_DAY: i64 = 24 * 60;
const MS_PER_MINUTE: i64 = 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    CaseAssigned,
    StageChanged,
    StatusChanged,
    DocumentUploaded,
    DocumentShared,
    DocumentReviewed,
    MeetingScheduled,
    MeetingUpdated,
    MeetingCancelled,
    TaskAssigned,
    DeadlineApproaching,
    SystemAlert,
}

pub const ALL_NOTIFICATION_KINDS: [NotificationKind; 12] = [
    NotificationKind::CaseAssigned,
    NotificationKind::StageChanged,
    NotificationKind::StatusChanged,
    NotificationKind::DocumentUploaded,
    NotificationKind::DocumentShared,
    NotificationKind::DocumentReviewed,
    NotificationKind::MeetingScheduled,
    NotificationKind::MeetingUpdated,
    NotificationKind::MeetingCancelled,
    NotificationKind::TaskAssigned,
    NotificationKind::DeadlineApproaching,
    NotificationKind::SystemAlert,
];

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CaseAssigned => "case_assigned",
            Self::StageChanged => "stage_changed",
            Self::StatusChanged => "status_changed",
            Self::DocumentUploaded => "document_uploaded",
            Self::DocumentShared => "document_shared",
            Self::DocumentReviewed => "document_reviewed",
            Self::MeetingScheduled => "meeting_scheduled",
            Self::MeetingUpdated => "meeting_updated",
            Self::MeetingCancelled => "meeting_cancelled",
            Self::TaskAssigned => "task_assigned",
            Self::DeadlineApproaching => "deadline_approaching",
            Self::SystemAlert => "system_alert",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        ALL_NOTIFICATION_KINDS
            .iter()
            .copied()
            .find(|kind| kind.as_str() == value.trim())
    }

    /// System alerts cannot be switched off by preferences.
    pub fn is_mandatory(self) -> bool {
        matches!(self, Self::SystemAlert)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    Low,
    Normal,
    High,
    Urgent,
}

impl NotificationPriority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "low" => Some(Self::Low),
            "normal" => Some(Self::Normal),
            "high" => Some(Self::High),
            "urgent" => Some(Self::Urgent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    pub case_id: Option<Uuid>,
    pub kind: NotificationKind,
    pub priority: NotificationPriority,
    pub title: String,
    pub message: String,
    pub send_email: bool,
    pub is_read: bool,
    pub read_at: Option<i64>,
    /// Epoch ms before which the notification is hidden from the inbox.
    pub deliver_after: i64,
    pub created_at: i64,
}

/// Local-time quiet window, minutes of day.
///
/// Only constructible through [`QuietHours::new`], deserialization included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "QuietHoursBounds")]
pub struct QuietHours {
    start_minute: u16,
    end_minute: u16,
}

#[derive(Deserialize)]
struct QuietHoursBounds {
    start_minute: u16,
    end_minute: u16,
}

impl TryFrom<QuietHoursBounds> for QuietHours {
    type Error = String;

    fn try_from(bounds: QuietHoursBounds) -> Result<Self, Self::Error> {
        Self::new(bounds.start_minute, bounds.end_minute).ok_or_else(|| {
            format!(
                "quiet hours {}..{} must be minutes below {MINUTES_PER_DAY}",
                bounds.start_minute, bounds.end_minute
            )
        })
    }
}

impl QuietHours {
    pub fn new(start_minute: u16, end_minute: u16) -> Option<Self> {
        let limit = MINUTES_PER_DAY as u16;
        if start_minute >= limit || end_minute >= limit {
            return None;
        }
        Some(Self {
            start_minute,
            end_minute,
        })
    }

    pub fn start_minute(&self) -> u16 {
        self.start_minute
    }

    pub fn end_minute(&self) -> u16 {
        self.end_minute
    }

    /// Parses `HH:MM` into minutes of day.
    pub fn parse_clock(value: &str) -> Option<u16> {
        let time = NaiveTime::parse_from_str(value.trim(), "%H:%M").ok()?;
        Some((time.hour() * 60 + time.minute()) as u16)
    }

    pub fn contains(&self, minute_of_day: u16) -> bool {
        let (start, end) = (self.start_minute, self.end_minute);
        if start == end {
            false
        } else if start < end {
            minute_of_day >= start && minute_of_day < end
        } else {
            minute_of_day >= start || minute_of_day < end
        }
    }

    /// Whole minutes from `minute_of_day` until the window ends.
    fn minutes_until_end(&self, minute_of_day: u16) -> i64 {
        (i64::from(self.end_minute) - i64::from(minute_of_day)).rem_euclid(MINUTES_PER_DAY)
    }
}

/// Per-user delivery preferences. Missing rows use `Default`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPreference {
    pub user_id: UserId,
    pub disabled_kinds: BTreeSet<NotificationKind>,
    pub email_enabled: bool,
    pub quiet_hours: Option<QuietHours>,
    /// Offset applied to UTC to obtain the user's local time.
    pub utc_offset_minutes: i32,
    pub urgent_bypasses_quiet_hours: bool,
}

impl NotificationPreference {
    pub fn default_for(user_id: UserId) -> Self {
        Self {
            user_id,
            disabled_kinds: BTreeSet::new(),
            email_enabled: true,
            quiet_hours: None,
            utc_offset_minutes: 0,
            urgent_bypasses_quiet_hours: true,
        }
    }

    pub fn is_kind_enabled(&self, kind: NotificationKind) -> bool {
        kind.is_mandatory() || !self.disabled_kinds.contains(&kind)
    }

    /// Local minute of day for an epoch ms instant.
    ///
    /// Offsets chrono cannot represent are treated as UTC.
    pub fn local_minute_of_day(&self, now_ms: i64) -> u16 {
        let offset = FixedOffset::east_opt(self.utc_offset_minutes.saturating_mul(60))
            .unwrap_or_else(|| Utc.fix());
        DateTime::<Utc>::from_timestamp_millis(now_ms)
            .map(|instant| instant.with_timezone(&offset))
            .map_or(0, |local| (local.hour() * 60 + local.minute()) as u16)
    }

    /// Decides how a notification of `kind`/`priority` is handled at `now_ms`.
    pub fn evaluate(
        &self,
        kind: NotificationKind,
        priority: NotificationPriority,
        now_ms: i64,
    ) -> DeliveryDecision {
        if !self.is_kind_enabled(kind) {
            return DeliveryDecision::Suppress;
        }

        let send_email = self.email_enabled && priority >= NotificationPriority::High;
        let bypass =
            priority == NotificationPriority::Urgent && self.urgent_bypasses_quiet_hours;

        if let Some(quiet) = self.quiet_hours {
            let minute = self.local_minute_of_day(now_ms);
            if !bypass && quiet.contains(minute) {
                let minute_floor = now_ms - now_ms.rem_euclid(MS_PER_MINUTE);
                let deliver_after =
                    minute_floor + quiet.minutes_until_end(minute) * MS_PER_MINUTE;
                return DeliveryDecision::Defer {
                    deliver_after,
                    send_email,
                };
            }
        }

        DeliveryDecision::Deliver { send_email }
    }
}

/// Outcome of preference evaluation for one recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryDecision {
    Deliver { send_email: bool },
    Defer { deliver_after: i64, send_email: bool },
    Suppress,
}
