//! Case document model: stored files, versions, grants and reviews.
//!
//! # Responsibility
//! - Define document metadata and version chain shape.
//! - Define per-user/role/department permission grants.
//! - Validate uploads against document type constraints.
//!
//! # Invariants
//! - `sha256` is the lowercase hex digest of the stored bytes.
//! - Versions of one logical document share the root `parent_id`; only the
//!   newest version has status other than `Superseded`.

use crate::model::directory::{DepartmentId, Role, UserId};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type DocumentId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Active,
    Superseded,
    UnderReview,
    Approved,
    Rejected,
}

impl DocumentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Superseded => "superseded",
            Self::UnderReview => "under_review",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::Active),
            "superseded" => Some(Self::Superseded),
            "under_review" => Some(Self::UnderReview),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// Category of document with upload constraints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentType {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub is_required: bool,
    /// Uppercase extensions without dot, e.g. `["PDF", "JPG"]`. Empty = any.
    pub allowed_formats: Vec<String>,
    pub max_size_bytes: Option<u64>,
}

impl DocumentType {
    /// Checks file name extension and size against this type.
    pub fn validate_upload(
        &self,
        file_name: &str,
        size_bytes: u64,
    ) -> Result<(), DocumentValidationError> {
        if let Some(max) = self.max_size_bytes {
            if size_bytes > max {
                return Err(DocumentValidationError::TooLarge {
                    size_bytes,
                    max_bytes: max,
                });
            }
        }

        if !self.allowed_formats.is_empty() {
            let extension = file_extension(file_name).unwrap_or_default();
            if !self
                .allowed_formats
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(&extension))
            {
                return Err(DocumentValidationError::FormatNotAllowed {
                    extension,
                    allowed: self.allowed_formats.clone(),
                });
            }
        }

        Ok(())
    }
}

/// Parses a comma-separated format list into normalized uppercase entries.
pub fn parse_allowed_formats(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|format| format.trim().trim_start_matches('.').to_ascii_uppercase())
        .filter(|format| !format.is_empty())
        .collect()
}

/// Returns the uppercase extension of `file_name`, if any.
pub fn file_extension(file_name: &str) -> Option<String> {
    let (stem, extension) = file_name.rsplit_once('.')?;
    if stem.is_empty() || extension.is_empty() {
        return None;
    }
    Some(extension.to_ascii_uppercase())
}

/// Stored document version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub case_id: Uuid,
    pub document_type_id: Option<Uuid>,
    pub title: String,
    pub original_name: String,
    /// Path relative to the storage root.
    pub storage_path: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub sha256: String,
    pub version: u32,
    /// Root document of the version chain. `None` for the first version.
    pub parent_id: Option<DocumentId>,
    pub status: DocumentStatus,
    pub uploaded_by: UserId,
    pub is_deleted: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Document {
    /// Root id of the version chain this document belongs to.
    pub fn root_id(&self) -> DocumentId {
        self.parent_id.unwrap_or(self.id)
    }
}

/// One right that can be granted on a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentRight {
    View,
    Edit,
    Download,
    Share,
    Delete,
}

impl DocumentRight {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Edit => "edit",
            Self::Download => "download",
            Self::Share => "share",
            Self::Delete => "delete",
        }
    }
}

/// Set of document rights.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRights {
    pub view: bool,
    pub edit: bool,
    pub download: bool,
    pub share: bool,
    pub delete: bool,
}

impl DocumentRights {
    pub fn all() -> Self {
        Self {
            view: true,
            edit: true,
            download: true,
            share: true,
            delete: true,
        }
    }

    pub fn view_only() -> Self {
        Self {
            view: true,
            ..Self::default()
        }
    }

    pub fn allows(&self, right: DocumentRight) -> bool {
        match right {
            DocumentRight::View => self.view,
            DocumentRight::Edit => self.edit,
            DocumentRight::Download => self.download,
            DocumentRight::Share => self.share,
            DocumentRight::Delete => self.delete,
        }
    }

    pub fn union(self, other: Self) -> Self {
        Self {
            view: self.view || other.view,
            edit: self.edit || other.edit,
            download: self.download || other.download,
            share: self.share || other.share,
            delete: self.delete || other.delete,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Any other right implies view.
    pub fn normalized(self) -> Self {
        let implies_view = self.edit || self.download || self.share || self.delete;
        Self {
            view: self.view || implies_view,
            ..self
        }
    }
}

/// Who a document grant applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PermissionSubject {
    User(UserId),
    Role(Role),
    Department(DepartmentId),
}

impl PermissionSubject {
    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::User(_) => "user",
            Self::Role(_) => "role",
            Self::Department(_) => "department",
        }
    }

    pub fn value_string(&self) -> String {
        match self {
            Self::User(id) | Self::Department(id) => id.to_string(),
            Self::Role(role) => role.as_str().to_string(),
        }
    }

    pub fn parse(kind: &str, value: &str) -> Option<Self> {
        match kind {
            "user" => Uuid::parse_str(value).ok().map(Self::User),
            "role" => Role::parse(value).map(Self::Role),
            "department" => Uuid::parse_str(value).ok().map(Self::Department),
            _ => None,
        }
    }
}

/// Grant of rights on one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentPermission {
    pub id: Uuid,
    pub document_id: DocumentId,
    pub subject: PermissionSubject,
    pub rights: DocumentRights,
    pub granted_by: UserId,
    /// Epoch ms after which the grant no longer applies.
    pub expires_at: Option<i64>,
    pub created_at: i64,
}

impl DocumentPermission {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentAccessKind {
    View,
    Download,
    Edit,
    Delete,
    Share,
}

impl DocumentAccessKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Download => "download",
            Self::Edit => "edit",
            Self::Delete => "delete",
            Self::Share => "share",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "view" => Some(Self::View),
            "download" => Some(Self::Download),
            "edit" => Some(Self::Edit),
            "delete" => Some(Self::Delete),
            "share" => Some(Self::Share),
            _ => None,
        }
    }
}

/// One access log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentAccess {
    pub document_id: DocumentId,
    pub user_id: UserId,
    pub access_kind: DocumentAccessKind,
    pub accessed_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewOutcome {
    Approved,
    Rejected,
    ChangesRequested,
}

impl ReviewOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::ChangesRequested => "changes_requested",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "changes_requested" => Some(Self::ChangesRequested),
            _ => None,
        }
    }

    /// Document status that results from this review outcome.
    pub fn resulting_status(self) -> DocumentStatus {
        match self {
            Self::Approved => DocumentStatus::Approved,
            Self::Rejected => DocumentStatus::Rejected,
            Self::ChangesRequested => DocumentStatus::UnderReview,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentReview {
    pub id: Uuid,
    pub document_id: DocumentId,
    pub reviewer_id: UserId,
    pub outcome: ReviewOutcome,
    pub comments: Option<String>,
    pub reviewed_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentValidationError {
    TooLarge { size_bytes: u64, max_bytes: u64 },
    FormatNotAllowed { extension: String, allowed: Vec<String> },
}

impl Display for DocumentValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooLarge {
                size_bytes,
                max_bytes,
            } => write!(
                f,
                "file size {size_bytes} bytes exceeds maximum of {max_bytes} bytes"
            ),
            Self::FormatNotAllowed { extension, allowed } => write!(
                f,
                "file format `{extension}` is not allowed; allowed formats: {}",
                allowed.join(", ")
            ),
        }
    }
}

impl Error for DocumentValidationError {}
