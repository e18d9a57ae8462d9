mod common;

use caseflow_core::model::document::{
    Document, DocumentRight, DocumentRights, DocumentStatus, PermissionSubject, ReviewOutcome,
};
use caseflow_core::model::notification::NotificationKind;
use caseflow_core::repo::notification_repo::{InboxQuery, SqliteNotificationRepository};
use caseflow_core::service::document_service::NewDocumentType;
use caseflow_core::{
    Actor, Case, DocumentService, LocalBlobStore, NotificationService, Role, ServiceContext,
    ServiceError, StorageError, UploadRequest,
};
use common::{Fixture, HOUR_MS, NOW_MS};
use tempfile::TempDir;

fn two_hours_later() -> i64 {
    NOW_MS + 2 * HOUR_MS
}

struct DocFixture {
    fx: Fixture,
    _dir: TempDir,
    store: LocalBlobStore,
    case: Case,
    analyst: Actor,
}

impl DocFixture {
    fn new() -> Self {
        let fx = Fixture::new();
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path().join("blobs"));
        let legal = fx.department("LEGAL", None);
        let (_, analyst) = fx.user("ana@caseflow.test", Role::Analyst, Some(legal.id));
        let case = fx.case(&analyst, "Riverside parcel");
        Self {
            fx,
            _dir: dir,
            store,
            case,
            analyst,
        }
    }

    fn service(&self) -> DocumentService<'_, LocalBlobStore> {
        DocumentService::new(self.fx.ctx(), &self.store)
    }

    fn upload(&self, actor: &Actor, name: &str, bytes: &[u8]) -> Document {
        self.service()
            .upload(actor, self.case.id, pdf(name, bytes))
            .unwrap()
    }
}

fn pdf(name: &str, bytes: &[u8]) -> UploadRequest {
    UploadRequest {
        original_name: name.to_string(),
        bytes: bytes.to_vec(),
        ..UploadRequest::default()
    }
}

fn inbox_kinds(fx: &Fixture, actor: &Actor) -> Vec<NotificationKind> {
    NotificationService::new(SqliteNotificationRepository::new(&fx.conn))
        .list_inbox(actor, &InboxQuery::default(), NOW_MS)
        .unwrap()
        .items
        .into_iter()
        .map(|notification| notification.kind)
        .collect()
}

#[test]
fn upload_then_download_returns_verified_bytes() {
    let df = DocFixture::new();
    let document = df.upload(&df.analyst, "deed.pdf", b"%PDF-1.7 deed");

    assert_eq!(document.version, 1);
    assert_eq!(document.title, "deed.pdf");
    assert_eq!(document.mime_type, "application/pdf");
    assert_eq!(document.size_bytes, 13);
    assert_eq!(document.status, DocumentStatus::Active);
    assert!(df.store.root().join(&document.storage_path).exists());

    let downloaded = df.service().download(&df.analyst, document.id).unwrap();
    assert_eq!(downloaded.bytes, b"%PDF-1.7 deed");

    let log = df
        .service()
        .access_log(&df.fx.admin, document.id, None)
        .unwrap();
    assert_eq!(log.len(), 1);
}

#[test]
fn empty_and_oversized_uploads_are_rejected() {
    let mut df = DocFixture::new();
    let err = df
        .service()
        .upload(&df.analyst, df.case.id, pdf("empty.pdf", b""))
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));

    df.fx.config.max_upload_bytes = 4;
    let err = df
        .service()
        .upload(&df.analyst, df.case.id, pdf("big.pdf", b"12345"))
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
}

#[test]
fn document_type_limits_format_and_size() {
    let df = DocFixture::new();
    let deed_type = df
        .service()
        .create_document_type(
            &df.fx.admin,
            NewDocumentType {
                code: "deed".to_string(),
                name: "Property deed".to_string(),
                is_required: true,
                allowed_formats: vec![".pdf".to_string()],
                max_size_bytes: Some(10),
            },
        )
        .unwrap();
    assert_eq!(deed_type.code, "DEED");
    assert_eq!(deed_type.allowed_formats, vec!["PDF".to_string()]);

    let typed = |name: &str, bytes: &[u8]| UploadRequest {
        document_type_id: Some(deed_type.id),
        ..pdf(name, bytes)
    };
    let service = df.service();
    assert!(matches!(
        service
            .upload(&df.analyst, df.case.id, typed("photo.jpg", b"jpeg"))
            .unwrap_err(),
        ServiceError::Validation(_)
    ));
    assert!(matches!(
        service
            .upload(&df.analyst, df.case.id, typed("deed.pdf", b"eleven bytes"))
            .unwrap_err(),
        ServiceError::Validation(_)
    ));
    assert!(service
        .upload(&df.analyst, df.case.id, typed("deed.PDF", b"small"))
        .is_ok());
}

#[test]
fn new_version_supersedes_the_previous_one() {
    let df = DocFixture::new();
    let first = df.upload(&df.analyst, "plan.pdf", b"v1");
    let service = df.service();

    let second = service
        .new_version(&df.analyst, first.id, pdf("plan-rev.pdf", b"v2"))
        .unwrap();
    assert_eq!(second.version, 2);
    assert_eq!(second.parent_id, Some(first.id));
    assert_eq!(second.title, "plan.pdf");

    let current = service
        .list_case_documents(&df.analyst, df.case.id)
        .unwrap();
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].id, second.id);

    let err = service
        .new_version(&df.analyst, first.id, pdf("plan-old.pdf", b"v3"))
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));

    let versions = service.versions(&df.analyst, second.id).unwrap();
    let numbers: Vec<u32> = versions.iter().map(|doc| doc.version).collect();
    assert_eq!(numbers, vec![1, 2]);
    assert_eq!(versions[0].status, DocumentStatus::Superseded);
}

#[test]
fn department_readers_view_but_cannot_edit() {
    let df = DocFixture::new();
    let document = df.upload(&df.analyst, "deed.pdf", b"deed");
    let legal_id = df.case.department_id;
    let (_, observer) = df
        .fx
        .user("obs@caseflow.test", Role::Observer, Some(legal_id));
    let service = df.service();

    let rights = service.effective_rights(&observer, document.id).unwrap();
    assert!(rights.allows(DocumentRight::View));
    assert!(rights.allows(DocumentRight::Download));
    assert!(!rights.allows(DocumentRight::Edit));

    let err = service
        .new_version(&observer, document.id, pdf("deed2.pdf", b"x"))
        .unwrap_err();
    assert_eq!(err.status_code(), 403);
    assert_eq!(
        service.delete_document(&observer, document.id).unwrap_err().status_code(),
        403
    );
}

#[test]
fn grants_open_documents_across_departments_until_they_expire() {
    let df = DocFixture::new();
    let document = df.upload(&df.analyst, "deed.pdf", b"deed");
    let finance = df.fx.department("FINANCE", None);
    let (finance_user, outsider) = df
        .fx
        .user("fin@caseflow.test", Role::Analyst, Some(finance.id));
    let service = df.service();

    assert!(matches!(
        service.get_document(&outsider, document.id).unwrap_err(),
        ServiceError::NotFound { .. }
    ));

    let err = service
        .grant_permission(
            &df.analyst,
            document.id,
            PermissionSubject::User(finance_user.id),
            DocumentRights::view_only(),
            Some(NOW_MS - 1),
        )
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));

    let grant = service
        .grant_permission(
            &df.analyst,
            document.id,
            PermissionSubject::User(finance_user.id),
            DocumentRights {
                download: true,
                ..DocumentRights::default()
            },
            Some(NOW_MS + HOUR_MS),
        )
        .unwrap();
    assert!(grant.rights.view);
    assert_eq!(
        service.download(&outsider, document.id).unwrap().bytes,
        b"deed"
    );
    assert_eq!(inbox_kinds(&df.fx, &outsider), vec![NotificationKind::DocumentShared]);

    let later = ServiceContext::new(&df.fx.conn, &df.fx.config).with_clock(two_hours_later);
    let expired = DocumentService::new(later, &df.store)
        .effective_rights(&outsider, document.id)
        .unwrap();
    assert!(expired.is_empty());
}

#[test]
fn grants_carry_over_to_new_versions() {
    let df = DocFixture::new();
    let first = df.upload(&df.analyst, "deed.pdf", b"v1");
    let finance = df.fx.department("FINANCE", None);
    let (finance_user, outsider) = df
        .fx
        .user("fin@caseflow.test", Role::Analyst, Some(finance.id));
    let service = df.service();
    let subject = PermissionSubject::User(finance_user.id);
    service
        .grant_permission(
            &df.analyst,
            first.id,
            subject,
            DocumentRights {
                download: true,
                ..DocumentRights::default()
            },
            None,
        )
        .unwrap();

    let second = service
        .new_version(&df.analyst, first.id, pdf("deed-rev.pdf", b"v2"))
        .unwrap();
    assert_eq!(service.download(&outsider, second.id).unwrap().bytes, b"v2");
    assert_eq!(service.permissions(&df.analyst, second.id).unwrap().len(), 1);

    service
        .revoke_permission(&df.analyst, second.id, subject)
        .unwrap();
    assert!(service.get_document(&outsider, first.id).is_err());
    assert!(service.get_document(&outsider, second.id).is_err());
}

#[test]
fn deleting_the_newest_version_reactivates_the_previous_one() {
    let df = DocFixture::new();
    let first = df.upload(&df.analyst, "plan.pdf", b"v1");
    let service = df.service();
    let second = service
        .new_version(&df.analyst, first.id, pdf("plan-rev.pdf", b"v2"))
        .unwrap();

    service.delete_document(&df.analyst, second.id).unwrap();

    let current = service
        .list_case_documents(&df.analyst, df.case.id)
        .unwrap();
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].id, first.id);
    assert_eq!(current[0].status, DocumentStatus::Active);

    let third = service
        .new_version(&df.analyst, first.id, pdf("plan-final.pdf", b"v3"))
        .unwrap();
    assert_eq!(third.version, 3);
    let numbers: Vec<u32> = service
        .versions(&df.analyst, third.id)
        .unwrap()
        .iter()
        .map(|doc| doc.version)
        .collect();
    assert_eq!(numbers, vec![1, 3]);
}

#[test]
fn deleting_an_older_version_leaves_the_head_alone() {
    let df = DocFixture::new();
    let first = df.upload(&df.analyst, "plan.pdf", b"v1");
    let service = df.service();
    let second = service
        .new_version(&df.analyst, first.id, pdf("plan-rev.pdf", b"v2"))
        .unwrap();

    service.delete_document(&df.analyst, first.id).unwrap();

    let current = service
        .list_case_documents(&df.analyst, df.case.id)
        .unwrap();
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].id, second.id);
}

#[test]
fn revoking_a_grant_removes_access() {
    let df = DocFixture::new();
    let document = df.upload(&df.analyst, "deed.pdf", b"deed");
    let finance = df.fx.department("FINANCE", None);
    let service = df.service();
    let subject = PermissionSubject::Department(finance.id);
    let (_, outsider) = df
        .fx
        .user("fin@caseflow.test", Role::Observer, Some(finance.id));

    service
        .grant_permission(&df.analyst, document.id, subject, DocumentRights::view_only(), None)
        .unwrap();
    assert!(service.get_document(&outsider, document.id).is_ok());
    assert_eq!(service.permissions(&df.analyst, document.id).unwrap().len(), 1);

    service
        .revoke_permission(&df.analyst, document.id, subject)
        .unwrap();
    assert!(service.get_document(&outsider, document.id).is_err());
    assert!(matches!(
        service
            .revoke_permission(&df.analyst, document.id, subject)
            .unwrap_err(),
        ServiceError::NotFound { .. }
    ));
}

#[test]
fn reviews_require_permission_and_comments() {
    let df = DocFixture::new();
    let document = df.upload(&df.analyst, "appraisal.pdf", b"appraisal");
    let (_, supervisor) = df.fx.user(
        "sup@caseflow.test",
        Role::Supervisor,
        Some(df.case.department_id),
    );
    let service = df.service();

    let err = service
        .review_document(&df.analyst, document.id, ReviewOutcome::Approved, None)
        .unwrap_err();
    assert_eq!(err.status_code(), 403);

    let err = service
        .review_document(&supervisor, document.id, ReviewOutcome::Rejected, None)
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));

    let review = service
        .review_document(
            &supervisor,
            document.id,
            ReviewOutcome::Rejected,
            Some("Missing cadastral reference".to_string()),
        )
        .unwrap();
    assert_eq!(review.outcome, ReviewOutcome::Rejected);
    assert_eq!(
        service.get_document(&df.analyst, document.id).unwrap().status,
        DocumentStatus::Rejected
    );
    assert_eq!(service.reviews(&df.analyst, document.id).unwrap().len(), 1);
    assert!(inbox_kinds(&df.fx, &df.analyst).contains(&NotificationKind::DocumentReviewed));
}

#[test]
fn tampered_blob_fails_integrity_check() {
    let df = DocFixture::new();
    let document = df.upload(&df.analyst, "deed.pdf", b"original");
    std::fs::write(df.store.root().join(&document.storage_path), b"tampered").unwrap();

    let err = df.service().download(&df.analyst, document.id).unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Storage(StorageError::Integrity { .. })
    ));
    assert_eq!(err.status_code(), 500);
}

#[test]
fn soft_delete_hides_document_but_keeps_blob() {
    let df = DocFixture::new();
    let document = df.upload(&df.analyst, "deed.pdf", b"deed");
    let service = df.service();

    service.delete_document(&df.analyst, document.id).unwrap();

    assert!(matches!(
        service.get_document(&df.analyst, document.id).unwrap_err(),
        ServiceError::NotFound { .. }
    ));
    assert!(service
        .list_case_documents(&df.analyst, df.case.id)
        .unwrap()
        .is_empty());
    assert!(df.store.root().join(&document.storage_path).exists());
}
