//! Meeting scheduling model.
//!
//! # Invariants
//! - `ends_at` is strictly later than `starts_at`.
//! - The organizer is always a participant with `Accepted` response.

use crate::model::directory::UserId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type MeetingId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingStatus {
    Scheduled,
    Cancelled,
    Completed,
}

impl MeetingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "scheduled" => Some(Self::Scheduled),
            "cancelled" => Some(Self::Cancelled),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantResponse {
    Pending,
    Accepted,
    Declined,
    Tentative,
}

impl ParticipantResponse {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
            Self::Tentative => "tentative",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "declined" => Some(Self::Declined),
            "tentative" => Some(Self::Tentative),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingParticipant {
    pub user_id: UserId,
    pub response: ParticipantResponse,
    pub responded_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meeting {
    pub id: MeetingId,
    pub case_id: Option<Uuid>,
    pub organizer_id: UserId,
    pub title: String,
    pub agenda: Option<String>,
    pub location: Option<String>,
    /// Epoch ms.
    pub starts_at: i64,
    /// Epoch ms, strictly after `starts_at`.
    pub ends_at: i64,
    pub status: MeetingStatus,
    pub participants: Vec<MeetingParticipant>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Meeting {
    pub fn duration_minutes(&self) -> i64 {
        (self.ends_at - self.starts_at) / 60_000
    }

    /// Whether `[starts_at, ends_at)` intersects the given window.
    pub fn overlaps(&self, starts_at: i64, ends_at: i64) -> bool {
        self.starts_at < ends_at && starts_at < self.ends_at
    }
}

#[cfg(test)]
mod tests {
    use super::{Meeting, MeetingStatus};
    use uuid::Uuid;

    fn meeting(starts_at: i64, ends_at: i64) -> Meeting {
        Meeting {
            id: Uuid::new_v4(),
            case_id: None,
            organizer_id: Uuid::new_v4(),
            title: "Appraisal review".to_string(),
            agenda: None,
            location: None,
            starts_at,
            ends_at,
            status: MeetingStatus::Scheduled,
            participants: Vec::new(),
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn overlap_is_half_open() {
        let m = meeting(1_000, 2_000);
        assert!(m.overlaps(1_500, 2_500));
        assert!(m.overlaps(0, 1_001));
        assert!(!m.overlaps(2_000, 3_000));
        assert!(!m.overlaps(0, 1_000));
    }

    #[test]
    fn duration_is_reported_in_minutes() {
        assert_eq!(meeting(0, 90 * 60_000).duration_minutes(), 90);
    }
}
