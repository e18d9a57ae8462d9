//! Document use-case service.
//!
//! # Responsibility
//! - Upload, version, download and soft-delete case documents.
//! - Manage per-document grants and compute effective rights.
//! - Record reviews and the access log.
//!
//! # Invariants
//! - Stored bytes are verified against their SHA-256 on every download.
//! - Only the newest version of a chain accepts new versions and reviews.
//! - Expired grants never contribute rights.
//! - Grants belong to the version chain, so a new version keeps its sharing.
//! - Deleting the head version reactivates the newest surviving predecessor.

use crate::auth::{Actor, Permission};
use crate::model::activity::EntityType;
use crate::model::case::{Case, CaseId};
use crate::model::directory::Role;
use crate::model::document::{
    file_extension, parse_allowed_formats, Document, DocumentAccess, DocumentAccessKind,
    DocumentId, DocumentPermission, DocumentReview, DocumentRight, DocumentRights,
    DocumentStatus, DocumentType, PermissionSubject, ReviewOutcome,
};
use crate::model::notification::{NotificationKind, NotificationPriority};
use crate::repo::case_repo::{CaseRepository, SqliteCaseRepository};
use crate::repo::department_repo::{DepartmentRepository, SqliteDepartmentRepository};
use crate::repo::document_repo::{DocumentRepository, SqliteDocumentRepository};
use crate::repo::notification_repo::SqliteNotificationRepository;
use crate::repo::user_repo::{SqliteUserRepository, UserRepository};
use crate::repo::MAX_PAGE_LIMIT;
use crate::service::notification_service::{NewNotification, NotificationService};
use crate::service::{
    ensure_case_visible, finish, load_visible_case, non_blank, record_activity, require,
    required, ServiceContext, ServiceError, ServiceResult,
};
use crate::storage::BlobStore;
use log::warn;
use serde_json::json;
use std::time::Instant;
use uuid::Uuid;

/// Bytes plus metadata for a new document or version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadRequest {
    pub title: Option<String>,
    pub original_name: String,
    /// Guessed from the extension when absent.
    pub mime_type: Option<String>,
    pub document_type_id: Option<Uuid>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewDocumentType {
    pub code: String,
    pub name: String,
    pub is_required: bool,
    /// Extensions, with or without leading dot. Empty accepts any format.
    pub allowed_formats: Vec<String>,
    pub max_size_bytes: Option<u64>,
}

/// Verified document contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedDocument {
    pub document: Document,
    pub bytes: Vec<u8>,
}

pub struct DocumentService<'a, S: BlobStore> {
    ctx: ServiceContext<'a>,
    store: &'a S,
}

impl<'a, S: BlobStore> DocumentService<'a, S> {
    pub fn new(ctx: ServiceContext<'a>, store: &'a S) -> Self {
        Self { ctx, store }
    }

    fn repo(&self) -> SqliteDocumentRepository<'a> {
        SqliteDocumentRepository::new(self.ctx.conn)
    }

    fn notifications(&self) -> NotificationService<SqliteNotificationRepository<'a>> {
        NotificationService::new(SqliteNotificationRepository::new(self.ctx.conn))
    }

    pub fn create_document_type(
        &self,
        actor: &Actor,
        input: NewDocumentType,
    ) -> ServiceResult<DocumentType> {
        require(actor, Permission::DocumentManage)?;
        let code = required(&input.code, "code")?.to_ascii_uppercase();
        let name = required(&input.name, "name")?;
        let repo = self.repo();
        if repo.find_document_type_by_code(&code)?.is_some() {
            return Err(ServiceError::Conflict(format!(
                "document type `{code}` already exists"
            )));
        }
        if input.max_size_bytes == Some(0) {
            return Err(ServiceError::validation("`max_size_bytes` must be positive"));
        }
        let document_type = DocumentType {
            id: Uuid::new_v4(),
            code,
            name,
            is_required: input.is_required,
            allowed_formats: parse_allowed_formats(&input.allowed_formats.join(",")),
            max_size_bytes: input.max_size_bytes,
        };
        repo.insert_document_type(&document_type)?;
        Ok(document_type)
    }

    pub fn document_types(&self) -> ServiceResult<Vec<DocumentType>> {
        Ok(self.repo().list_document_types()?)
    }

    /// Stores a new document on `case_id`.
    pub fn upload(
        &self,
        actor: &Actor,
        case_id: CaseId,
        request: UploadRequest,
    ) -> ServiceResult<Document> {
        let started = Instant::now();
        finish("document_upload", started, self.upload_inner(actor, case_id, request))
    }

    fn upload_inner(
        &self,
        actor: &Actor,
        case_id: CaseId,
        request: UploadRequest,
    ) -> ServiceResult<Document> {
        require(actor, Permission::DocumentUpload)?;
        let case = load_visible_case(&self.ctx, actor, case_id)?;
        let document_type = match request.document_type_id {
            Some(id) => Some(
                self.repo()
                    .get_document_type(id)?
                    .ok_or_else(|| ServiceError::not_found("document type", id))?,
            ),
            None => None,
        };
        let document = self.store_version(actor, &case, document_type.as_ref(), request, None)?;
        self.repo().insert_document(&document).map_err(|err| {
            self.discard_blob(&document.storage_path);
            ServiceError::from(err)
        })?;

        record_activity(
            &self.ctx,
            Some(actor.user_id),
            "document.uploaded",
            (EntityType::Document, document.id),
            Some(case.id),
            Some(json!({ "size_bytes": document.size_bytes, "version": 1 })),
        )?;
        let draft = NewNotification {
            kind: NotificationKind::DocumentUploaded,
            priority: NotificationPriority::Normal,
            title: format!("New document on case {}", case.case_number),
            message: format!("Document \"{}\" was uploaded.", document.title),
            case_id: Some(case.id),
        };
        self.notifications().notify_many(
            [Some(case.created_by), case.assigned_to].into_iter().flatten(),
            Some(actor.user_id),
            &draft,
            self.ctx.now(),
        )?;
        Ok(document)
    }

    /// Adds a version to the chain `id` belongs to. `id` must be the newest.
    pub fn new_version(
        &self,
        actor: &Actor,
        id: DocumentId,
        request: UploadRequest,
    ) -> ServiceResult<Document> {
        let started = Instant::now();
        finish("document_new_version", started, self.new_version_inner(actor, id, request))
    }

    fn new_version_inner(
        &self,
        actor: &Actor,
        id: DocumentId,
        request: UploadRequest,
    ) -> ServiceResult<Document> {
        let (previous, case) = self.load(id)?;
        self.require_right(actor, &previous, &case, DocumentRight::Edit)?;
        if previous.status == DocumentStatus::Superseded {
            return Err(ServiceError::Conflict(
                "only the newest version can be replaced".to_string(),
            ));
        }
        let document_type = match previous.document_type_id {
            Some(type_id) => self.repo().get_document_type(type_id)?,
            None => None,
        };
        let request = UploadRequest {
            title: request.title.or_else(|| Some(previous.title.clone())),
            document_type_id: previous.document_type_id,
            ..request
        };
        // Deleted versions keep their numbers.
        let latest = self
            .repo()
            .list_versions(previous.root_id())?
            .iter()
            .map(|version| version.version)
            .max()
            .unwrap_or(previous.version);
        let mut next =
            self.store_version(actor, &case, document_type.as_ref(), request, Some(&previous))?;
        next.version = latest + 1;
        self.repo().insert_version(&previous, &next).map_err(|err| {
            self.discard_blob(&next.storage_path);
            ServiceError::from(err)
        })?;

        record_activity(
            &self.ctx,
            Some(actor.user_id),
            "document.versioned",
            (EntityType::Document, next.id),
            Some(case.id),
            Some(json!({ "previous_id": previous.id, "version": next.version })),
        )?;
        Ok(next)
    }

    pub fn get_document(&self, actor: &Actor, id: DocumentId) -> ServiceResult<Document> {
        let (document, case) = self.load(id)?;
        self.require_right(actor, &document, &case, DocumentRight::View)?;
        self.log_access(actor, &document, DocumentAccessKind::View)?;
        Ok(document)
    }

    /// Current documents of a case the caller may view.
    pub fn list_case_documents(
        &self,
        actor: &Actor,
        case_id: CaseId,
    ) -> ServiceResult<Vec<Document>> {
        let case = load_visible_case(&self.ctx, actor, case_id)?;
        let mut visible = Vec::new();
        for document in self.repo().list_case_documents(case.id)? {
            if self.rights_for(actor, &document, &case)?.view {
                visible.push(document);
            }
        }
        Ok(visible)
    }

    /// Returns verified bytes and logs the download.
    pub fn download(&self, actor: &Actor, id: DocumentId) -> ServiceResult<DownloadedDocument> {
        let started = Instant::now();
        finish("document_download", started, self.download_inner(actor, id))
    }

    fn download_inner(&self, actor: &Actor, id: DocumentId) -> ServiceResult<DownloadedDocument> {
        let (document, case) = self.load(id)?;
        self.require_right(actor, &document, &case, DocumentRight::Download)?;
        let bytes = self
            .store
            .get_verified(&document.storage_path, &document.sha256)?;
        self.log_access(actor, &document, DocumentAccessKind::Download)?;
        Ok(DownloadedDocument { document, bytes })
    }

    /// Every version of the chain `id` belongs to, oldest first.
    pub fn versions(&self, actor: &Actor, id: DocumentId) -> ServiceResult<Vec<Document>> {
        let (document, case) = self.load(id)?;
        self.require_right(actor, &document, &case, DocumentRight::View)?;
        Ok(self
            .repo()
            .list_versions(document.root_id())?
            .into_iter()
            .filter(|version| !version.is_deleted)
            .collect())
    }

    /// Soft-deletes one version. The blob stays for audit.
    pub fn delete_document(&self, actor: &Actor, id: DocumentId) -> ServiceResult<()> {
        let started = Instant::now();
        finish("document_delete", started, self.delete_inner(actor, id))
    }

    fn delete_inner(&self, actor: &Actor, id: DocumentId) -> ServiceResult<()> {
        let (document, case) = self.load(id)?;
        self.require_right(actor, &document, &case, DocumentRight::Delete)?;
        let restored = self
            .repo()
            .soft_delete_version(&document, self.ctx.now())?;
        self.log_access(actor, &document, DocumentAccessKind::Delete)?;
        record_activity(
            &self.ctx,
            Some(actor.user_id),
            "document.deleted",
            (EntityType::Document, document.id),
            Some(case.id),
            Some(json!({ "version": document.version, "restored_id": restored })),
        )
    }

    /// Grants `rights` to `subject`, replacing any previous grant.
    pub fn grant_permission(
        &self,
        actor: &Actor,
        id: DocumentId,
        subject: PermissionSubject,
        rights: DocumentRights,
        expires_at: Option<i64>,
    ) -> ServiceResult<DocumentPermission> {
        let started = Instant::now();
        finish(
            "document_grant",
            started,
            self.grant_inner(actor, id, subject, rights, expires_at),
        )
    }

    fn grant_inner(
        &self,
        actor: &Actor,
        id: DocumentId,
        subject: PermissionSubject,
        rights: DocumentRights,
        expires_at: Option<i64>,
    ) -> ServiceResult<DocumentPermission> {
        let (document, case) = self.load(id)?;
        self.require_right(actor, &document, &case, DocumentRight::Share)?;
        let rights = rights.normalized();
        if rights.is_empty() {
            return Err(ServiceError::validation("at least one right must be granted"));
        }
        let now = self.ctx.now();
        if expires_at.is_some_and(|expires_at| expires_at <= now) {
            return Err(ServiceError::validation("`expires_at` must be in the future"));
        }
        self.require_subject_exists(&subject)?;

        let permission = DocumentPermission {
            id: Uuid::new_v4(),
            document_id: document.root_id(),
            subject,
            rights,
            granted_by: actor.user_id,
            expires_at,
            created_at: now,
        };
        self.repo().upsert_permission(&permission)?;
        self.log_access(actor, &document, DocumentAccessKind::Share)?;
        record_activity(
            &self.ctx,
            Some(actor.user_id),
            "document.shared",
            (EntityType::Document, document.id),
            Some(case.id),
            Some(json!({
                "subject_kind": subject.kind_str(),
                "subject": subject.value_string(),
            })),
        )?;

        if let PermissionSubject::User(user_id) = subject {
            if user_id != actor.user_id {
                let draft = NewNotification {
                    kind: NotificationKind::DocumentShared,
                    priority: NotificationPriority::Normal,
                    title: format!("Document shared on case {}", case.case_number),
                    message: format!("\"{}\" was shared with you.", document.title),
                    case_id: Some(case.id),
                };
                self.notifications().notify(user_id, &draft, now)?;
            }
        }
        Ok(permission)
    }

    pub fn revoke_permission(
        &self,
        actor: &Actor,
        id: DocumentId,
        subject: PermissionSubject,
    ) -> ServiceResult<()> {
        let started = Instant::now();
        finish("document_revoke", started, self.revoke_inner(actor, id, subject))
    }

    fn revoke_inner(
        &self,
        actor: &Actor,
        id: DocumentId,
        subject: PermissionSubject,
    ) -> ServiceResult<()> {
        let (document, case) = self.load(id)?;
        self.require_right(actor, &document, &case, DocumentRight::Share)?;
        if !self.repo().delete_permission(document.root_id(), &subject)? {
            return Err(ServiceError::not_found(
                "document permission",
                format!("{}:{}", subject.kind_str(), subject.value_string()),
            ));
        }
        record_activity(
            &self.ctx,
            Some(actor.user_id),
            "document.unshared",
            (EntityType::Document, document.id),
            Some(case.id),
            Some(json!({
                "subject_kind": subject.kind_str(),
                "subject": subject.value_string(),
            })),
        )
    }

    pub fn permissions(
        &self,
        actor: &Actor,
        id: DocumentId,
    ) -> ServiceResult<Vec<DocumentPermission>> {
        let (document, case) = self.load(id)?;
        self.require_right(actor, &document, &case, DocumentRight::Share)?;
        Ok(self.repo().list_permissions(document.root_id())?)
    }

    /// Rights `actor` currently holds on document `id`.
    pub fn effective_rights(&self, actor: &Actor, id: DocumentId) -> ServiceResult<DocumentRights> {
        let (document, case) = self.load(id)?;
        self.rights_for(actor, &document, &case)
    }

    /// Records a review decision and moves the document status accordingly.
    pub fn review_document(
        &self,
        actor: &Actor,
        id: DocumentId,
        outcome: ReviewOutcome,
        comments: Option<String>,
    ) -> ServiceResult<DocumentReview> {
        let started = Instant::now();
        finish(
            "document_review",
            started,
            self.review_inner(actor, id, outcome, comments),
        )
    }

    fn review_inner(
        &self,
        actor: &Actor,
        id: DocumentId,
        outcome: ReviewOutcome,
        comments: Option<String>,
    ) -> ServiceResult<DocumentReview> {
        require(actor, Permission::DocumentReview)?;
        let (document, case) = self.load(id)?;
        self.require_right(actor, &document, &case, DocumentRight::View)?;
        if document.status == DocumentStatus::Superseded {
            return Err(ServiceError::Conflict(
                "superseded versions cannot be reviewed".to_string(),
            ));
        }
        let comments = non_blank(comments);
        if outcome != ReviewOutcome::Approved && comments.is_none() {
            return Err(ServiceError::validation(
                "`comments` are required unless the document is approved",
            ));
        }

        let review = DocumentReview {
            id: Uuid::new_v4(),
            document_id: document.id,
            reviewer_id: actor.user_id,
            outcome,
            comments,
            reviewed_at: self.ctx.now(),
        };
        self.repo()
            .insert_review(&review, outcome.resulting_status())?;
        record_activity(
            &self.ctx,
            Some(actor.user_id),
            "document.reviewed",
            (EntityType::Document, document.id),
            Some(case.id),
            Some(json!({ "outcome": outcome.as_str() })),
        )?;

        if document.uploaded_by != actor.user_id {
            let draft = NewNotification {
                kind: NotificationKind::DocumentReviewed,
                priority: if outcome == ReviewOutcome::Approved {
                    NotificationPriority::Normal
                } else {
                    NotificationPriority::High
                },
                title: format!("Document reviewed on case {}", case.case_number),
                message: format!("\"{}\" was marked {}.", document.title, outcome.as_str()),
                case_id: Some(case.id),
            };
            self.notifications()
                .notify(document.uploaded_by, &draft, review.reviewed_at)?;
        }
        Ok(review)
    }

    pub fn reviews(&self, actor: &Actor, id: DocumentId) -> ServiceResult<Vec<DocumentReview>> {
        let (document, case) = self.load(id)?;
        self.require_right(actor, &document, &case, DocumentRight::View)?;
        Ok(self.repo().list_reviews(document.id)?)
    }

    /// Most recent access entries; requires `DocumentManage`.
    pub fn access_log(
        &self,
        actor: &Actor,
        id: DocumentId,
        limit: Option<u32>,
    ) -> ServiceResult<Vec<DocumentAccess>> {
        require(actor, Permission::DocumentManage)?;
        let (document, case) = self.load(id)?;
        ensure_case_visible(&self.ctx, actor, &case)?;
        let limit = limit.unwrap_or(MAX_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);
        Ok(self.repo().list_access(document.id, limit)?)
    }

    fn store_version(
        &self,
        actor: &Actor,
        case: &Case,
        document_type: Option<&DocumentType>,
        request: UploadRequest,
        previous: Option<&Document>,
    ) -> ServiceResult<Document> {
        let original_name = required(&request.original_name, "original_name")?;
        if request.bytes.is_empty() {
            return Err(ServiceError::validation("uploaded file is empty"));
        }
        let size_bytes = request.bytes.len() as u64;
        if size_bytes > self.ctx.config.max_upload_bytes {
            return Err(ServiceError::validation(format!(
                "file size {size_bytes} bytes exceeds the upload limit of {} bytes",
                self.ctx.config.max_upload_bytes
            )));
        }
        if let Some(document_type) = document_type {
            document_type.validate_upload(&original_name, size_bytes)?;
        }

        let blob = self
            .store
            .put(&case.case_number, &original_name, &request.bytes)?;
        let now = self.ctx.now();
        Ok(Document {
            id: Uuid::new_v4(),
            case_id: case.id,
            document_type_id: request.document_type_id,
            title: non_blank(request.title).unwrap_or_else(|| original_name.clone()),
            mime_type: non_blank(request.mime_type)
                .unwrap_or_else(|| mime_for_name(&original_name).to_string()),
            original_name,
            storage_path: blob.relative_path,
            size_bytes: blob.size_bytes,
            sha256: blob.sha256,
            version: previous.map_or(1, |previous| previous.version + 1),
            parent_id: previous.map(Document::root_id),
            status: DocumentStatus::Active,
            uploaded_by: actor.user_id,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        })
    }

    /// Non-deleted document and its non-deleted case.
    fn load(&self, id: DocumentId) -> ServiceResult<(Document, Case)> {
        let document = self
            .repo()
            .get_document(id)?
            .filter(|document| !document.is_deleted)
            .ok_or_else(|| ServiceError::not_found("document", id))?;
        let case = SqliteCaseRepository::new(self.ctx.conn)
            .get_case(document.case_id)?
            .filter(|case| !case.is_deleted)
            .ok_or_else(|| ServiceError::not_found("document", id))?;
        Ok((document, case))
    }

    fn require_right(
        &self,
        actor: &Actor,
        document: &Document,
        case: &Case,
        right: DocumentRight,
    ) -> ServiceResult<()> {
        let rights = self.rights_for(actor, document, case)?;
        if rights.allows(right) {
            Ok(())
        } else if rights.view {
            Err(ServiceError::forbidden(format!(
                "missing `{}` right on this document",
                right.as_str()
            )))
        } else {
            Err(ServiceError::not_found("document", document.id))
        }
    }

    fn rights_for(
        &self,
        actor: &Actor,
        document: &Document,
        case: &Case,
    ) -> ServiceResult<DocumentRights> {
        if actor.is_super_admin() || document.uploaded_by == actor.user_id {
            return Ok(DocumentRights::all());
        }
        let case_visible = match ensure_case_visible(&self.ctx, actor, case) {
            Ok(()) => true,
            Err(ServiceError::Forbidden(_)) => false,
            Err(err) => return Err(err),
        };
        if case_visible && actor.can(Permission::DocumentManage) {
            return Ok(DocumentRights::all());
        }

        let mut rights = if case_visible && actor.can(Permission::DocumentRead) {
            DocumentRights {
                view: true,
                download: true,
                ..DocumentRights::default()
            }
        } else {
            DocumentRights::default()
        };
        let now = self.ctx.now();
        for grant in self.repo().list_permissions(document.root_id())? {
            if !grant.is_expired(now) && subject_matches(&grant.subject, actor) {
                rights = rights.union(grant.rights);
            }
        }
        Ok(rights.normalized())
    }

    fn require_subject_exists(&self, subject: &PermissionSubject) -> ServiceResult<()> {
        match subject {
            PermissionSubject::User(user_id) => {
                SqliteUserRepository::new(self.ctx.conn)
                    .get_user(*user_id)?
                    .filter(|user| user.is_active)
                    .ok_or_else(|| ServiceError::not_found("user", user_id))?;
            }
            PermissionSubject::Department(department_id) => {
                SqliteDepartmentRepository::new(self.ctx.conn)
                    .get_department(*department_id)?
                    .ok_or_else(|| ServiceError::not_found("department", department_id))?;
            }
            PermissionSubject::Role(Role::SuperAdmin) => {
                return Err(ServiceError::validation(
                    "super admins already hold every right",
                ))
            }
            PermissionSubject::Role(_) => {}
        }
        Ok(())
    }

    fn log_access(
        &self,
        actor: &Actor,
        document: &Document,
        access_kind: DocumentAccessKind,
    ) -> ServiceResult<()> {
        self.repo().log_access(&DocumentAccess {
            document_id: document.id,
            user_id: actor.user_id,
            access_kind,
            accessed_at: self.ctx.now(),
        })?;
        Ok(())
    }

    fn discard_blob(&self, relative_path: &str) {
        if let Err(err) = self.store.remove(relative_path) {
            warn!(
                "event=blob_cleanup module=service status=error path={} error={}",
                relative_path, err
            );
        }
    }
}

fn subject_matches(subject: &PermissionSubject, actor: &Actor) -> bool {
    match subject {
        PermissionSubject::User(user_id) => *user_id == actor.user_id,
        PermissionSubject::Role(role) => *role == actor.role,
        PermissionSubject::Department(department_id) => {
            actor.department_id == Some(*department_id)
        }
    }
}

/// Best-effort MIME type from the file extension.
pub fn mime_for_name(file_name: &str) -> &'static str {
    match file_extension(file_name).as_deref() {
        Some("PDF") => "application/pdf",
        Some("JPG" | "JPEG") => "image/jpeg",
        Some("PNG") => "image/png",
        Some("TIF" | "TIFF") => "image/tiff",
        Some("TXT") => "text/plain",
        Some("CSV") => "text/csv",
        Some("DOC") => "application/msword",
        Some("DOCX") => {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        }
        Some("XLS") => "application/vnd.ms-excel",
        Some("XLSX") => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        Some("DWG") => "image/vnd.dwg",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::{mime_for_name, subject_matches};
    use crate::auth::Actor;
    use crate::model::directory::Role;
    use crate::model::document::PermissionSubject;
    use uuid::Uuid;

    #[test]
    fn mime_guess_is_case_insensitive() {
        assert_eq!(mime_for_name("deed.PDF"), "application/pdf");
        assert_eq!(mime_for_name("photo.jpeg"), "image/jpeg");
        assert_eq!(mime_for_name("README"), "application/octet-stream");
    }

    #[test]
    fn grant_subjects_match_actor_identity() {
        let department = Uuid::new_v4();
        let actor = Actor::new(Uuid::new_v4(), Role::Analyst, Some(department));

        assert!(subject_matches(&PermissionSubject::User(actor.user_id), &actor));
        assert!(subject_matches(&PermissionSubject::Role(Role::Analyst), &actor));
        assert!(subject_matches(
            &PermissionSubject::Department(department),
            &actor
        ));
        assert!(!subject_matches(
            &PermissionSubject::Role(Role::Supervisor),
            &actor
        ));
        assert!(!subject_matches(
            &PermissionSubject::User(Uuid::new_v4()),
            &actor
        ));
    }
}
