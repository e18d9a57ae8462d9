//! Activity log entries recorded by services for auditing.

use crate::model::directory::UserId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Entity family an activity entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Case,
    Department,
    User,
    Document,
    Meeting,
    Task,
}

impl EntityType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Case => "case",
            Self::Department => "department",
            Self::User => "user",
            Self::Document => "document",
            Self::Meeting => "meeting",
            Self::Task => "task",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "case" => Some(Self::Case),
            "department" => Some(Self::Department),
            "user" => Some(Self::User),
            "document" => Some(Self::Document),
            "meeting" => Some(Self::Meeting),
            "task" => Some(Self::Task),
            _ => None,
        }
    }
}

/// One recorded action. `details` holds a small JSON object of changed
/// fields, never document contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: i64,
    pub actor_id: Option<UserId>,
    /// Dotted action name, e.g. `case.stage_changed`.
    pub action: String,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub case_id: Option<Uuid>,
    pub details: Option<serde_json::Value>,
    pub created_at: i64,
}
