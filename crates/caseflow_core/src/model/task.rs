//! Case task model.
//!
//! # Invariants
//! - A task belongs to exactly one case and one department.
//! - `completed_at` is set iff `status == Completed`.
//! - Dependencies stay within one case and never form a cycle.

use crate::model::case::CasePriority;
use crate::model::directory::{DepartmentId, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type TaskId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Review,
    Approval,
    Coordination,
    Verification,
    Notification,
    Documentation,
}

impl TaskKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Review => "review",
            Self::Approval => "approval",
            Self::Coordination => "coordination",
            Self::Verification => "verification",
            Self::Notification => "notification",
            Self::Documentation => "documentation",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "review" => Some(Self::Review),
            "approval" => Some(Self::Approval),
            "coordination" => Some(Self::Coordination),
            "verification" => Some(Self::Verification),
            "notification" => Some(Self::Notification),
            "documentation" => Some(Self::Documentation),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
    Blocked,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Blocked => "blocked",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            "blocked" => Some(Self::Blocked),
            _ => None,
        }
    }

    /// Whether a dependency in this status still blocks dependents.
    pub fn is_open(self) -> bool {
        matches!(self, Self::Pending | Self::InProgress | Self::Blocked)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub case_id: Uuid,
    pub department_id: DepartmentId,
    pub assigned_to: Option<UserId>,
    pub title: String,
    pub description: Option<String>,
    pub kind: TaskKind,
    pub priority: CasePriority,
    pub status: TaskStatus,
    pub due_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub result: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Task {
    pub fn is_overdue(&self, now_ms: i64) -> bool {
        self.status.is_open() && self.due_at.is_some_and(|due_at| due_at < now_ms)
    }
}
