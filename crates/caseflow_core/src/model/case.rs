//! Expropriation case domain model.
//!
//! # Responsibility
//! - Define the canonical case record and its status/priority enums.
//! - Validate request-time invariants before persistence.
//!
//! # Invariants
//! - `id` is stable and never reused for another case.
//! - `case_number` is unique and assigned once at creation.
//! - `is_deleted` is the source of truth for tombstone state.

use crate::model::stage::CaseStage;
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type CaseId = Uuid;

/// Administrative status tracked alongside the workflow stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Pending,
    InProgress,
    OnHold,
    Completed,
    Archived,
}

impl CaseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::OnHold => "on_hold",
            Self::Completed => "completed",
            Self::Archived => "archived",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "on_hold" => Some(Self::OnHold),
            "completed" => Some(Self::Completed),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }
}

/// Case handling priority. Ordering follows urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CasePriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl CasePriority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "urgent" => Some(Self::Urgent),
            _ => None,
        }
    }
}

/// Canonical expropriation case record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub id: CaseId,
    /// Human-facing identifier, `EXP-<year>-<seq>`.
    pub case_number: String,
    pub title: String,
    pub description: Option<String>,
    pub property_address: String,
    pub property_municipality: Option<String>,
    pub property_province: Option<String>,
    pub owner_name: String,
    pub owner_identification: Option<String>,
    /// Square meters.
    pub land_area: Option<f64>,
    pub estimated_value: Option<f64>,
    /// Owning department. Mirrors the primary department assignment.
    pub department_id: Uuid,
    pub created_by: Uuid,
    pub assigned_to: Option<Uuid>,
    pub current_stage: CaseStage,
    pub status: CaseStatus,
    pub priority: CasePriority,
    /// Epoch ms.
    pub start_date: Option<i64>,
    /// Epoch ms. Must be >= `start_date` when both are set.
    pub expected_end_date: Option<i64>,
    /// Epoch ms. Set when the case reaches `Completed`.
    pub actual_end_date: Option<i64>,
    pub is_deleted: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Case {
    /// Validates field-level invariants shared by create and update paths.
    pub fn validate(&self) -> Result<(), CaseValidationError> {
        validate_case_fields(&CaseFields {
            title: &self.title,
            property_address: &self.property_address,
            owner_name: &self.owner_name,
            land_area: self.land_area,
            estimated_value: self.estimated_value,
            start_date: self.start_date,
            expected_end_date: self.expected_end_date,
        })
    }

    /// Whether the case is visible in default listings.
    pub fn is_active(&self) -> bool {
        !self.is_deleted
    }
}

/// Borrowed view over the validated subset of case fields.
pub struct CaseFields<'a> {
    pub title: &'a str,
    pub property_address: &'a str,
    pub owner_name: &'a str,
    pub land_area: Option<f64>,
    pub estimated_value: Option<f64>,
    pub start_date: Option<i64>,
    pub expected_end_date: Option<i64>,
}

/// Validates required/non-negative/date-order case invariants.
pub fn validate_case_fields(fields: &CaseFields<'_>) -> Result<(), CaseValidationError> {
    if fields.title.trim().is_empty() {
        return Err(CaseValidationError::MissingField("title"));
    }
    if fields.property_address.trim().is_empty() {
        return Err(CaseValidationError::MissingField("property_address"));
    }
    if fields.owner_name.trim().is_empty() {
        return Err(CaseValidationError::MissingField("owner_name"));
    }
    if let Some(area) = fields.land_area {
        if !area.is_finite() || area < 0.0 {
            return Err(CaseValidationError::NegativeAmount("land_area"));
        }
    }
    if let Some(value) = fields.estimated_value {
        if !value.is_finite() || value < 0.0 {
            return Err(CaseValidationError::NegativeAmount("estimated_value"));
        }
    }
    if let (Some(start), Some(end)) = (fields.start_date, fields.expected_end_date) {
        if end < start {
            return Err(CaseValidationError::EndBeforeStart { start, end });
        }
    }
    Ok(())
}

/// Field-level case validation failure.
#[derive(Debug, Clone, PartialEq)]
pub enum CaseValidationError {
    MissingField(&'static str),
    NegativeAmount(&'static str),
    EndBeforeStart { start: i64, end: i64 },
}

impl Display for CaseValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingField(field) => write!(f, "`{field}` is required"),
            Self::NegativeAmount(field) => write!(f, "`{field}` must be a non-negative number"),
            Self::EndBeforeStart { start, end } => write!(
                f,
                "expected_end_date ({end}) must not be earlier than start_date ({start})"
            ),
        }
    }
}

impl Error for CaseValidationError {}

/// Department participating in a case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseDepartmentAssignment {
    pub case_id: CaseId,
    pub department_id: Uuid,
    pub is_primary: bool,
    pub assigned_by: Option<Uuid>,
    pub assigned_at: i64,
}

/// One recorded stage change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageChange {
    pub id: i64,
    pub case_id: CaseId,
    pub from_stage: CaseStage,
    pub to_stage: CaseStage,
    pub changed_by: Uuid,
    pub notes: Option<String>,
    pub changed_at: i64,
}

/// Formats the human-facing case number.
pub fn format_case_number(year: i32, sequence: u32) -> String {
    format!("EXP-{year}-{sequence:04}")
}

/// UTC calendar year containing the epoch ms instant.
///
/// Instants outside chrono's range fall back to 1970.
pub fn year_of_epoch_ms(epoch_ms: i64) -> i32 {
    DateTime::<Utc>::from_timestamp_millis(epoch_ms).map_or(1970, |instant| instant.year())
}
