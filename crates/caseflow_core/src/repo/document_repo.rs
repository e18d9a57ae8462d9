//! Document repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist document metadata, version chains and document types.
//! - Persist per-document permission grants, access log and reviews.
//!
//! # Invariants
//! - Every version row points at the chain root through `parent_id`.
//! - Superseding a version and inserting its successor happen atomically.
//! - At most one grant exists per `(document, subject)`; re-granting replaces it.

use crate::model::case::CaseId;
use crate::model::document::{
    parse_allowed_formats, Document, DocumentAccess, DocumentAccessKind, DocumentId,
    DocumentPermission, DocumentReview, DocumentRights, DocumentStatus, DocumentType,
    PermissionSubject, ReviewOutcome,
};
use crate::repo::{
    bool_to_int, parse_enum, parse_flag, parse_optional_uuid, parse_uuid, RepoError, RepoResult,
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

const DOCUMENT_SELECT_SQL: &str = "SELECT
    id,
    case_id,
    document_type_id,
    title,
    original_name,
    storage_path,
    mime_type,
    size_bytes,
    sha256,
    version,
    parent_id,
    status,
    uploaded_by,
    is_deleted,
    created_at,
    updated_at
FROM documents";

const PERMISSION_SELECT_SQL: &str = "SELECT
    id,
    document_id,
    subject_kind,
    subject_value,
    can_view,
    can_edit,
    can_download,
    can_share,
    can_delete,
    granted_by,
    expires_at,
    created_at
FROM document_permissions";

/// Repository interface for document operations.
pub trait DocumentRepository {
    fn insert_document_type(&self, document_type: &DocumentType) -> RepoResult<()>;
    fn get_document_type(&self, id: Uuid) -> RepoResult<Option<DocumentType>>;
    fn find_document_type_by_code(&self, code: &str) -> RepoResult<Option<DocumentType>>;
    fn list_document_types(&self) -> RepoResult<Vec<DocumentType>>;

    fn insert_document(&self, document: &Document) -> RepoResult<()>;
    /// Marks `previous` superseded and inserts `next` in one transaction.
    fn insert_version(&self, previous: &Document, next: &Document) -> RepoResult<()>;
    /// Soft-deletes one version. When it was the chain head, the newest
    /// remaining predecessor becomes active again and its id is returned.
    fn soft_delete_version(
        &self,
        document: &Document,
        deleted_at: i64,
    ) -> RepoResult<Option<DocumentId>>;
    fn get_document(&self, id: DocumentId) -> RepoResult<Option<Document>>;
    /// Current (non-superseded, non-deleted) versions attached to a case.
    fn list_case_documents(&self, case_id: CaseId) -> RepoResult<Vec<Document>>;
    /// All versions of the chain rooted at `root_id`, oldest first.
    fn list_versions(&self, root_id: DocumentId) -> RepoResult<Vec<Document>>;

    /// Grants are keyed by the chain root so every version shares them.
    fn upsert_permission(&self, permission: &DocumentPermission) -> RepoResult<()>;
    fn delete_permission(
        &self,
        document_id: DocumentId,
        subject: &PermissionSubject,
    ) -> RepoResult<bool>;
    fn list_permissions(&self, document_id: DocumentId) -> RepoResult<Vec<DocumentPermission>>;

    fn log_access(&self, access: &DocumentAccess) -> RepoResult<()>;
    fn list_access(&self, document_id: DocumentId, limit: u32) -> RepoResult<Vec<DocumentAccess>>;

    fn insert_review(&self, review: &DocumentReview, status: DocumentStatus) -> RepoResult<()>;
    fn list_reviews(&self, document_id: DocumentId) -> RepoResult<Vec<DocumentReview>>;
}

/// SQLite-backed document repository.
pub struct SqliteDocumentRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteDocumentRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl DocumentRepository for SqliteDocumentRepository<'_> {
    fn insert_document_type(&self, document_type: &DocumentType) -> RepoResult<()> {
        let formats = document_type.allowed_formats.join(",");
        let max_size = document_type
            .max_size_bytes
            .map(|value| i64::try_from(value).unwrap_or(i64::MAX));
        self.conn.execute(
            "INSERT INTO document_types (id, code, name, is_required, allowed_formats, max_size_bytes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                document_type.id.to_string(),
                document_type.code.as_str(),
                document_type.name.as_str(),
                bool_to_int(document_type.is_required),
                if formats.is_empty() { None } else { Some(formats) },
                max_size,
            ],
        )?;
        Ok(())
    }

    fn get_document_type(&self, id: Uuid) -> RepoResult<Option<DocumentType>> {
        self.conn
            .query_row(
                "SELECT id, code, name, is_required, allowed_formats, max_size_bytes
                 FROM document_types WHERE id = ?1;",
                [id.to_string()],
                |row| Ok(parse_document_type_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn find_document_type_by_code(&self, code: &str) -> RepoResult<Option<DocumentType>> {
        self.conn
            .query_row(
                "SELECT id, code, name, is_required, allowed_formats, max_size_bytes
                 FROM document_types WHERE code = ?1 COLLATE NOCASE;",
                [code.trim()],
                |row| Ok(parse_document_type_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn list_document_types(&self) -> RepoResult<Vec<DocumentType>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, code, name, is_required, allowed_formats, max_size_bytes
             FROM document_types ORDER BY code ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut types = Vec::new();
        while let Some(row) = rows.next()? {
            types.push(parse_document_type_row(row)?);
        }
        Ok(types)
    }

    fn insert_document(&self, document: &Document) -> RepoResult<()> {
        insert_document_row(self.conn, document)
    }

    fn insert_version(&self, previous: &Document, next: &Document) -> RepoResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        let changed = tx.execute(
            "UPDATE documents SET status = ?2, updated_at = ?3 WHERE id = ?1 AND is_deleted = 0;",
            params![
                previous.id.to_string(),
                DocumentStatus::Superseded.as_str(),
                next.created_at,
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("document", previous.id));
        }
        insert_document_row(&tx, next)?;
        tx.commit()?;
        Ok(())
    }

    fn soft_delete_version(
        &self,
        document: &Document,
        deleted_at: i64,
    ) -> RepoResult<Option<DocumentId>> {
        let tx = self.conn.unchecked_transaction()?;
        let changed = tx.execute(
            "UPDATE documents SET is_deleted = 1, updated_at = ?2
             WHERE id = ?1 AND is_deleted = 0;",
            params![document.id.to_string(), deleted_at],
        )?;
        if changed == 0 {
            return Err(RepoError::not_found("document", document.id));
        }

        let mut restored = None;
        if document.status != DocumentStatus::Superseded {
            let predecessor: Option<String> = tx
                .query_row(
                    "SELECT id FROM documents
                     WHERE (id = ?1 OR parent_id = ?1)
                       AND is_deleted = 0
                       AND version < ?2
                     ORDER BY version DESC
                     LIMIT 1;",
                    params![document.root_id().to_string(), document.version],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(id) = predecessor {
                tx.execute(
                    "UPDATE documents SET status = ?2, updated_at = ?3 WHERE id = ?1;",
                    params![id, DocumentStatus::Active.as_str(), deleted_at],
                )?;
                restored = Some(parse_uuid(&id, "documents.id")?);
            }
        }
        tx.commit()?;
        Ok(restored)
    }

    fn get_document(&self, id: DocumentId) -> RepoResult<Option<Document>> {
        self.conn
            .query_row(
                &format!("{DOCUMENT_SELECT_SQL} WHERE id = ?1;"),
                [id.to_string()],
                |row| Ok(parse_document_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn list_case_documents(&self, case_id: CaseId) -> RepoResult<Vec<Document>> {
        let mut stmt = self.conn.prepare(&format!(
            "{DOCUMENT_SELECT_SQL}
             WHERE case_id = ?1
               AND is_deleted = 0
               AND status <> ?2
             ORDER BY created_at DESC, id ASC;"
        ))?;
        let mut rows = stmt.query(params![
            case_id.to_string(),
            DocumentStatus::Superseded.as_str()
        ])?;
        let mut documents = Vec::new();
        while let Some(row) = rows.next()? {
            documents.push(parse_document_row(row)?);
        }
        Ok(documents)
    }

    fn list_versions(&self, root_id: DocumentId) -> RepoResult<Vec<Document>> {
        let mut stmt = self.conn.prepare(&format!(
            "{DOCUMENT_SELECT_SQL}
             WHERE id = ?1 OR parent_id = ?1
             ORDER BY version ASC;"
        ))?;
        let mut rows = stmt.query([root_id.to_string()])?;
        let mut documents = Vec::new();
        while let Some(row) = rows.next()? {
            documents.push(parse_document_row(row)?);
        }
        Ok(documents)
    }

    fn upsert_permission(&self, permission: &DocumentPermission) -> RepoResult<()> {
        let rights = permission.rights;
        self.conn.execute(
            "INSERT INTO document_permissions (
                id,
                document_id,
                subject_kind,
                subject_value,
                can_view,
                can_edit,
                can_download,
                can_share,
                can_delete,
                granted_by,
                expires_at,
                created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(document_id, subject_kind, subject_value) DO UPDATE SET
                can_view = excluded.can_view,
                can_edit = excluded.can_edit,
                can_download = excluded.can_download,
                can_share = excluded.can_share,
                can_delete = excluded.can_delete,
                granted_by = excluded.granted_by,
                expires_at = excluded.expires_at,
                created_at = excluded.created_at;",
            params![
                permission.id.to_string(),
                permission.document_id.to_string(),
                permission.subject.kind_str(),
                permission.subject.value_string(),
                bool_to_int(rights.view),
                bool_to_int(rights.edit),
                bool_to_int(rights.download),
                bool_to_int(rights.share),
                bool_to_int(rights.delete),
                permission.granted_by.to_string(),
                permission.expires_at,
                permission.created_at,
            ],
        )?;
        Ok(())
    }

    fn delete_permission(
        &self,
        document_id: DocumentId,
        subject: &PermissionSubject,
    ) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "DELETE FROM document_permissions
             WHERE document_id = ?1 AND subject_kind = ?2 AND subject_value = ?3;",
            params![
                document_id.to_string(),
                subject.kind_str(),
                subject.value_string()
            ],
        )?;
        Ok(changed > 0)
    }

    fn list_permissions(&self, document_id: DocumentId) -> RepoResult<Vec<DocumentPermission>> {
        let mut stmt = self.conn.prepare(&format!(
            "{PERMISSION_SELECT_SQL}
             WHERE document_id = ?1
             ORDER BY subject_kind ASC, subject_value ASC;"
        ))?;
        let mut rows = stmt.query([document_id.to_string()])?;
        let mut permissions = Vec::new();
        while let Some(row) = rows.next()? {
            permissions.push(parse_permission_row(row)?);
        }
        Ok(permissions)
    }

    fn log_access(&self, access: &DocumentAccess) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO document_access_log (document_id, user_id, access_kind, accessed_at)
             VALUES (?1, ?2, ?3, ?4);",
            params![
                access.document_id.to_string(),
                access.user_id.to_string(),
                access.access_kind.as_str(),
                access.accessed_at,
            ],
        )?;
        Ok(())
    }

    fn list_access(&self, document_id: DocumentId, limit: u32) -> RepoResult<Vec<DocumentAccess>> {
        let mut stmt = self.conn.prepare(
            "SELECT document_id, user_id, access_kind, accessed_at
             FROM document_access_log
             WHERE document_id = ?1
             ORDER BY accessed_at DESC, id DESC
             LIMIT ?2;",
        )?;
        let mut rows = stmt.query(params![document_id.to_string(), i64::from(limit)])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            let document_text: String = row.get("document_id")?;
            let user_text: String = row.get("user_id")?;
            let kind_text: String = row.get("access_kind")?;
            entries.push(DocumentAccess {
                document_id: parse_uuid(&document_text, "document_access_log.document_id")?,
                user_id: parse_uuid(&user_text, "document_access_log.user_id")?,
                access_kind: parse_enum(
                    &kind_text,
                    "document_access_log.access_kind",
                    DocumentAccessKind::parse,
                )?,
                accessed_at: row.get("accessed_at")?,
            });
        }
        Ok(entries)
    }

    fn insert_review(&self, review: &DocumentReview, status: DocumentStatus) -> RepoResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO document_reviews (id, document_id, reviewer_id, outcome, comments, reviewed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                review.id.to_string(),
                review.document_id.to_string(),
                review.reviewer_id.to_string(),
                review.outcome.as_str(),
                review.comments.as_deref(),
                review.reviewed_at,
            ],
        )?;
        tx.execute(
            "UPDATE documents SET status = ?2, updated_at = ?3 WHERE id = ?1;",
            params![
                review.document_id.to_string(),
                status.as_str(),
                review.reviewed_at
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn list_reviews(&self, document_id: DocumentId) -> RepoResult<Vec<DocumentReview>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, document_id, reviewer_id, outcome, comments, reviewed_at
             FROM document_reviews
             WHERE document_id = ?1
             ORDER BY reviewed_at ASC, id ASC;",
        )?;
        let mut rows = stmt.query([document_id.to_string()])?;
        let mut reviews = Vec::new();
        while let Some(row) = rows.next()? {
            let id_text: String = row.get("id")?;
            let document_text: String = row.get("document_id")?;
            let reviewer_text: String = row.get("reviewer_id")?;
            let outcome_text: String = row.get("outcome")?;
            reviews.push(DocumentReview {
                id: parse_uuid(&id_text, "document_reviews.id")?,
                document_id: parse_uuid(&document_text, "document_reviews.document_id")?,
                reviewer_id: parse_uuid(&reviewer_text, "document_reviews.reviewer_id")?,
                outcome: parse_enum(&outcome_text, "document_reviews.outcome", ReviewOutcome::parse)?,
                comments: row.get("comments")?,
                reviewed_at: row.get("reviewed_at")?,
            });
        }
        Ok(reviews)
    }
}

fn insert_document_row(conn: &Connection, document: &Document) -> RepoResult<()> {
    let size = i64::try_from(document.size_bytes).map_err(|_| {
        RepoError::InvalidData(format!("document size out of range: {}", document.size_bytes))
    })?;
    conn.execute(
        "INSERT INTO documents (
            id,
            case_id,
            document_type_id,
            title,
            original_name,
            storage_path,
            mime_type,
            size_bytes,
            sha256,
            version,
            parent_id,
            status,
            uploaded_by,
            is_deleted,
            created_at,
            updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16);",
        params![
            document.id.to_string(),
            document.case_id.to_string(),
            document.document_type_id.map(|id| id.to_string()),
            document.title.as_str(),
            document.original_name.as_str(),
            document.storage_path.as_str(),
            document.mime_type.as_str(),
            size,
            document.sha256.as_str(),
            i64::from(document.version),
            document.parent_id.map(|id| id.to_string()),
            document.status.as_str(),
            document.uploaded_by.to_string(),
            bool_to_int(document.is_deleted),
            document.created_at,
            document.updated_at,
        ],
    )?;
    Ok(())
}

fn parse_document_row(row: &Row<'_>) -> RepoResult<Document> {
    let id_text: String = row.get("id")?;
    let case_text: String = row.get("case_id")?;
    let uploader_text: String = row.get("uploaded_by")?;
    let status_text: String = row.get("status")?;
    let size: i64 = row.get("size_bytes")?;
    let version: i64 = row.get("version")?;

    Ok(Document {
        id: parse_uuid(&id_text, "documents.id")?,
        case_id: parse_uuid(&case_text, "documents.case_id")?,
        document_type_id: parse_optional_uuid(
            row.get("document_type_id")?,
            "documents.document_type_id",
        )?,
        title: row.get("title")?,
        original_name: row.get("original_name")?,
        storage_path: row.get("storage_path")?,
        mime_type: row.get("mime_type")?,
        size_bytes: u64::try_from(size).map_err(|_| {
            RepoError::InvalidData(format!("invalid size `{size}` in documents.size_bytes"))
        })?,
        sha256: row.get("sha256")?,
        version: u32::try_from(version).map_err(|_| {
            RepoError::InvalidData(format!("invalid version `{version}` in documents.version"))
        })?,
        parent_id: parse_optional_uuid(row.get("parent_id")?, "documents.parent_id")?,
        status: parse_enum(&status_text, "documents.status", DocumentStatus::parse)?,
        uploaded_by: parse_uuid(&uploader_text, "documents.uploaded_by")?,
        is_deleted: parse_flag(row.get("is_deleted")?, "documents.is_deleted")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn parse_document_type_row(row: &Row<'_>) -> RepoResult<DocumentType> {
    let id_text: String = row.get("id")?;
    let formats: Option<String> = row.get("allowed_formats")?;
    let max_size: Option<i64> = row.get("max_size_bytes")?;
    Ok(DocumentType {
        id: parse_uuid(&id_text, "document_types.id")?,
        code: row.get("code")?,
        name: row.get("name")?,
        is_required: parse_flag(row.get("is_required")?, "document_types.is_required")?,
        allowed_formats: formats
            .as_deref()
            .map(parse_allowed_formats)
            .unwrap_or_default(),
        max_size_bytes: max_size
            .map(|value| {
                u64::try_from(value).map_err(|_| {
                    RepoError::InvalidData(format!(
                        "invalid size `{value}` in document_types.max_size_bytes"
                    ))
                })
            })
            .transpose()?,
    })
}

fn parse_permission_row(row: &Row<'_>) -> RepoResult<DocumentPermission> {
    let id_text: String = row.get("id")?;
    let document_text: String = row.get("document_id")?;
    let kind: String = row.get("subject_kind")?;
    let value: String = row.get("subject_value")?;
    let granted_by_text: String = row.get("granted_by")?;

    let subject = PermissionSubject::parse(&kind, &value).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid subject `{kind}:{value}` in document_permissions"
        ))
    })?;

    Ok(DocumentPermission {
        id: parse_uuid(&id_text, "document_permissions.id")?,
        document_id: parse_uuid(&document_text, "document_permissions.document_id")?,
        subject,
        rights: DocumentRights {
            view: parse_flag(row.get("can_view")?, "document_permissions.can_view")?,
            edit: parse_flag(row.get("can_edit")?, "document_permissions.can_edit")?,
            download: parse_flag(row.get("can_download")?, "document_permissions.can_download")?,
            share: parse_flag(row.get("can_share")?, "document_permissions.can_share")?,
            delete: parse_flag(row.get("can_delete")?, "document_permissions.can_delete")?,
        },
        granted_by: parse_uuid(&granted_by_text, "document_permissions.granted_by")?,
        expires_at: row.get("expires_at")?,
        created_at: row.get("created_at")?,
    })
}
