mod common;

use caseflow_core::service::department_service::DepartmentUpdate;
use caseflow_core::service::user_service::{UserFilter, UserUpdate};
use caseflow_core::{
    AuthService, DepartmentService, NewDepartment, Permission, Role, ServiceError, UserService,
};
use common::{new_user, Fixture, PASSWORD};
use std::collections::BTreeSet;

#[test]
fn department_tree_nests_children_under_parents() {
    let fx = Fixture::new();
    let legal = fx.department("legal", None);
    let north = fx.department("legal-north", Some(legal.id));
    let finance = fx.department("finance", None);

    assert_eq!(legal.code, "LEGAL");
    let tree = DepartmentService::new(fx.ctx()).tree(false).unwrap();
    let codes: Vec<&str> = tree.iter().map(|node| node.department.code.as_str()).collect();
    assert_eq!(codes, vec!["FINANCE", "LEGAL"]);
    let legal_node = tree.iter().find(|node| node.department.id == legal.id).unwrap();
    assert_eq!(legal_node.children.len(), 1);
    assert_eq!(legal_node.children[0].department.id, north.id);
    assert!(tree
        .iter()
        .find(|node| node.department.id == finance.id)
        .unwrap()
        .children
        .is_empty());
}

#[test]
fn duplicate_department_code_conflicts() {
    let fx = Fixture::new();
    fx.department("LEGAL", None);

    let err = DepartmentService::new(fx.ctx())
        .create_department(
            &fx.admin,
            NewDepartment {
                code: "legal".to_string(),
                name: "Legal again".to_string(),
                ..NewDepartment::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));
}

#[test]
fn invalid_department_code_is_rejected() {
    let fx = Fixture::new();
    let err = DepartmentService::new(fx.ctx())
        .create_department(
            &fx.admin,
            NewDepartment {
                code: "legal affairs".to_string(),
                name: "Legal".to_string(),
                ..NewDepartment::default()
            },
        )
        .unwrap_err();
    assert_eq!(err.status_code(), 400);
}

#[test]
fn moving_department_under_its_descendant_conflicts() {
    let fx = Fixture::new();
    let root = fx.department("ROOT", None);
    let child = fx.department("CHILD", Some(root.id));
    let grandchild = fx.department("GRANDCHILD", Some(child.id));
    let service = DepartmentService::new(fx.ctx());

    let err = service
        .move_department(&fx.admin, root.id, Some(grandchild.id))
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));

    let err = service
        .move_department(&fx.admin, root.id, Some(root.id))
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));

    let moved = service.move_department(&fx.admin, grandchild.id, None).unwrap();
    assert_eq!(moved.parent_id, None);
}

#[test]
fn department_with_members_or_children_cannot_be_deactivated() {
    let fx = Fixture::new();
    let parent = fx.department("PARENT", None);
    let child = fx.department("CHILD", Some(parent.id));
    let (member, _) = fx.user("member@caseflow.test", Role::Analyst, Some(child.id));
    let service = DepartmentService::new(fx.ctx());

    let err = service.deactivate_department(&fx.admin, parent.id).unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));
    let err = service.deactivate_department(&fx.admin, child.id).unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));

    UserService::new(fx.ctx())
        .deactivate_user(&fx.admin, member.id)
        .unwrap();
    service.deactivate_department(&fx.admin, child.id).unwrap();
    service.deactivate_department(&fx.admin, parent.id).unwrap();

    assert!(service.tree(false).unwrap().is_empty());
    assert_eq!(service.tree(true).unwrap().len(), 1);
}

#[test]
fn only_department_managers_edit_departments() {
    let fx = Fixture::new();
    let legal = fx.department("LEGAL", None);
    let (_, dept_admin) = fx.user("boss@caseflow.test", Role::DepartmentAdmin, Some(legal.id));

    let err = DepartmentService::new(fx.ctx())
        .update_department(
            &dept_admin,
            legal.id,
            DepartmentUpdate {
                name: Some("Renamed".to_string()),
                ..DepartmentUpdate::default()
            },
        )
        .unwrap_err();
    assert_eq!(err.status_code(), 403);

    let updated = DepartmentService::new(fx.ctx())
        .update_department(
            &fx.admin,
            legal.id,
            DepartmentUpdate {
                name: Some("Legal Affairs".to_string()),
                description: Some(Some("Handles decrees".to_string())),
                ..DepartmentUpdate::default()
            },
        )
        .unwrap();
    assert_eq!(updated.name, "Legal Affairs");
    assert_eq!(updated.description.as_deref(), Some("Handles decrees"));
}

#[test]
fn duplicate_email_conflicts_case_insensitively() {
    let fx = Fixture::new();
    let legal = fx.department("LEGAL", None);
    fx.user("ana@caseflow.test", Role::Analyst, Some(legal.id));

    let err = UserService::new(fx.ctx())
        .create_user(
            &fx.admin,
            new_user("ANA@CaseFlow.test", Role::Observer, Some(legal.id)),
        )
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));
}

#[test]
fn weak_password_is_rejected() {
    let fx = Fixture::new();
    let mut input = new_user("weak@caseflow.test", Role::Analyst, None);
    input.password = "short".to_string();

    let err = UserService::new(fx.ctx())
        .create_user(&fx.admin, input)
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
}

#[test]
fn department_admin_manages_only_their_subtree() {
    let fx = Fixture::new();
    let legal = fx.department("LEGAL", None);
    let north = fx.department("LEGAL-NORTH", Some(legal.id));
    let finance = fx.department("FINANCE", None);
    let (_, dept_admin) = fx.user("boss@caseflow.test", Role::DepartmentAdmin, Some(legal.id));
    let service = UserService::new(fx.ctx());

    let in_subtree = service
        .create_user(
            &dept_admin,
            new_user("clerk@caseflow.test", Role::Analyst, Some(north.id)),
        )
        .unwrap();
    assert_eq!(in_subtree.department_id, Some(north.id));

    let err = service
        .create_user(
            &dept_admin,
            new_user("outsider@caseflow.test", Role::Analyst, Some(finance.id)),
        )
        .unwrap_err();
    assert_eq!(err.status_code(), 403);

    let err = service
        .create_user(
            &dept_admin,
            new_user("root2@caseflow.test", Role::SuperAdmin, Some(legal.id)),
        )
        .unwrap_err();
    assert_eq!(err.status_code(), 403);

    let listed = service
        .list_users(&dept_admin, UserFilter::default())
        .unwrap();
    assert!(listed
        .items
        .iter()
        .all(|user| user.department_id == Some(legal.id) || user.department_id == Some(north.id)));
    assert_eq!(listed.total, 2);
}

#[test]
fn users_cannot_change_their_own_role() {
    let fx = Fixture::new();
    let legal = fx.department("LEGAL", None);
    let (user, actor) = fx.user("self@caseflow.test", Role::DepartmentAdmin, Some(legal.id));

    let err = UserService::new(fx.ctx())
        .update_user(
            &actor,
            user.id,
            UserUpdate {
                role: Some(Role::SuperAdmin),
                ..UserUpdate::default()
            },
        )
        .unwrap_err();
    assert_eq!(err.status_code(), 403);

    let renamed = UserService::new(fx.ctx())
        .update_user(
            &actor,
            user.id,
            UserUpdate {
                first_name: Some("Renamed".to_string()),
                ..UserUpdate::default()
            },
        )
        .unwrap();
    assert_eq!(renamed.first_name, "Renamed");
}

#[test]
fn login_authenticate_and_logout() {
    let fx = Fixture::new();
    let legal = fx.department("LEGAL", None);
    let (user, _) = fx.user("ana@caseflow.test", Role::Analyst, Some(legal.id));
    let auth = AuthService::new(fx.ctx());

    let outcome = auth.login(" Ana@CaseFlow.test ", PASSWORD).unwrap();
    assert_eq!(outcome.user.id, user.id);
    assert!(outcome.expires_at > common::NOW_MS);

    let actor = auth.authenticate(&outcome.token).unwrap();
    assert_eq!(actor.user_id, user.id);
    assert_eq!(actor.role, Role::Analyst);

    auth.logout(&outcome.token).unwrap();
    let err = auth.authenticate(&outcome.token).unwrap_err();
    assert_eq!(err.status_code(), 401);
}

#[test]
fn wrong_password_and_inactive_accounts_cannot_log_in() {
    let fx = Fixture::new();
    let (user, _) = fx.user("ana@caseflow.test", Role::Observer, None);
    let auth = AuthService::new(fx.ctx());

    let err = auth.login("ana@caseflow.test", "wrong-pass-1").unwrap_err();
    assert_eq!(err.status_code(), 401);

    let outcome = auth.login("ana@caseflow.test", PASSWORD).unwrap();
    UserService::new(fx.ctx())
        .deactivate_user(&fx.admin, user.id)
        .unwrap();

    assert_eq!(auth.authenticate(&outcome.token).unwrap_err().status_code(), 401);
    assert_eq!(
        auth.login("ana@caseflow.test", PASSWORD).unwrap_err().status_code(),
        401
    );
}

#[test]
fn unknown_and_inactive_accounts_fail_with_the_same_error() {
    let fx = Fixture::new();
    let (user, _) = fx.user("ana@caseflow.test", Role::Observer, None);
    let auth = AuthService::new(fx.ctx());
    UserService::new(fx.ctx())
        .deactivate_user(&fx.admin, user.id)
        .unwrap();

    let unknown = auth.login("nobody@caseflow.test", PASSWORD).unwrap_err();
    let inactive = auth.login("ana@caseflow.test", PASSWORD).unwrap_err();
    let malformed = auth.login("not-an-email", PASSWORD).unwrap_err();
    for err in [&unknown, &inactive, &malformed] {
        assert_eq!(err.status_code(), 401);
    }
    assert_eq!(unknown.to_string(), inactive.to_string());
}

#[test]
fn change_password_revokes_existing_sessions() {
    let fx = Fixture::new();
    fx.user("ana@caseflow.test", Role::Analyst, None);
    let auth = AuthService::new(fx.ctx());
    let outcome = auth.login("ana@caseflow.test", PASSWORD).unwrap();
    let actor = auth.authenticate(&outcome.token).unwrap();

    let err = auth
        .change_password(&actor, "not-my-pass-1", "new-secret-77")
        .unwrap_err();
    assert_eq!(err.status_code(), 403);

    auth.change_password(&actor, PASSWORD, "new-secret-77")
        .unwrap();
    assert!(auth.authenticate(&outcome.token).is_err());
    assert!(auth.login("ana@caseflow.test", PASSWORD).is_err());
    assert!(auth.login("ana@caseflow.test", "new-secret-77").is_ok());
}

#[test]
fn extra_permissions_flow_into_authenticated_actor() {
    let fx = Fixture::new();
    let legal = fx.department("LEGAL", None);
    let (user, observer) = fx.user("watcher@caseflow.test", Role::Observer, Some(legal.id));
    assert!(!observer.can(Permission::ReportView));

    UserService::new(fx.ctx())
        .set_extra_permissions(&fx.admin, user.id, BTreeSet::from([Permission::ReportView]))
        .unwrap();

    let auth = AuthService::new(fx.ctx());
    let outcome = auth.login("watcher@caseflow.test", PASSWORD).unwrap();
    let actor = auth.authenticate(&outcome.token).unwrap();
    assert!(actor.can(Permission::ReportView));
    assert!(!actor.can(Permission::CaseCreate));
}
