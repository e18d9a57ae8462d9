//! Department use-case service.
//!
//! # Responsibility
//! - Create, rename, move and deactivate departments.
//! - Present the department hierarchy as a tree and list members.
//!
//! # Invariants
//! - Codes are unique ignoring case and stored uppercase.
//! - Moving a department never creates a parent cycle.
//! - A department with active children or active members cannot be deactivated.

use crate::auth::scope::subtree;
use crate::auth::{Actor, Permission};
use crate::model::activity::EntityType;
use crate::model::directory::{
    normalize_department_code, Department, DepartmentId, DepartmentNode, User,
};
use crate::repo::department_repo::{DepartmentRepository, SqliteDepartmentRepository};
use crate::repo::user_repo::{SqliteUserRepository, UserListQuery, UserRepository};
use crate::repo::PageRequest;
use crate::repo::MAX_PAGE_LIMIT;
use crate::service::{
    finish, non_blank, record_activity, require, required, scope_for, ServiceContext,
    ServiceError, ServiceResult,
};
use serde_json::json;
use std::collections::{BTreeMap, HashSet};
use std::time::Instant;
use uuid::Uuid;

const INVALID_CODE: &str = "`code` must be 1-32 letters, digits, `-` or `_`";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewDepartment {
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<DepartmentId>,
}

/// Partial update; `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DepartmentUpdate {
    pub code: Option<String>,
    pub name: Option<String>,
    /// `Some(None)` clears the description.
    pub description: Option<Option<String>>,
}

pub struct DepartmentService<'a> {
    ctx: ServiceContext<'a>,
}

impl<'a> DepartmentService<'a> {
    pub fn new(ctx: ServiceContext<'a>) -> Self {
        Self { ctx }
    }

    fn repo(&self) -> SqliteDepartmentRepository<'a> {
        SqliteDepartmentRepository::new(self.ctx.conn)
    }

    pub fn create_department(
        &self,
        actor: &Actor,
        input: NewDepartment,
    ) -> ServiceResult<Department> {
        let started = Instant::now();
        finish("department_create", started, self.create_inner(actor, input))
    }

    fn create_inner(&self, actor: &Actor, input: NewDepartment) -> ServiceResult<Department> {
        require(actor, Permission::DepartmentManage)?;
        let code = normalize_department_code(&input.code)
            .ok_or_else(|| ServiceError::validation(INVALID_CODE))?;
        let name = required(&input.name, "name")?;
        let repo = self.repo();
        if repo.find_by_code(&code)?.is_some() {
            return Err(ServiceError::Conflict(format!(
                "department code `{code}` already exists"
            )));
        }
        if let Some(parent_id) = input.parent_id {
            self.require_active_parent(parent_id)?;
        }

        let now = self.ctx.now();
        let department = Department {
            id: Uuid::new_v4(),
            code,
            name,
            description: non_blank(input.description),
            parent_id: input.parent_id,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        repo.insert_department(&department)?;
        record_activity(
            &self.ctx,
            Some(actor.user_id),
            "department.created",
            (EntityType::Department, department.id),
            None,
            Some(json!({ "code": department.code })),
        )?;
        self.get_department(department.id)
    }

    pub fn get_department(&self, id: DepartmentId) -> ServiceResult<Department> {
        self.repo()
            .get_department(id)?
            .ok_or_else(|| ServiceError::not_found("department", id))
    }

    pub fn update_department(
        &self,
        actor: &Actor,
        id: DepartmentId,
        update: DepartmentUpdate,
    ) -> ServiceResult<Department> {
        let started = Instant::now();
        finish("department_update", started, self.update_inner(actor, id, update))
    }

    fn update_inner(
        &self,
        actor: &Actor,
        id: DepartmentId,
        update: DepartmentUpdate,
    ) -> ServiceResult<Department> {
        require(actor, Permission::DepartmentManage)?;
        let repo = self.repo();
        let mut department = self.get_department(id)?;

        if let Some(code) = update.code {
            let code = normalize_department_code(&code)
                .ok_or_else(|| ServiceError::validation(INVALID_CODE))?;
            if let Some(existing) = repo.find_by_code(&code)? {
                if existing.id != id {
                    return Err(ServiceError::Conflict(format!(
                        "department code `{code}` already exists"
                    )));
                }
            }
            department.code = code;
        }
        if let Some(name) = update.name {
            department.name = required(&name, "name")?;
        }
        if let Some(description) = update.description {
            department.description = non_blank(description);
        }

        repo.update_department(&department)?;
        record_activity(
            &self.ctx,
            Some(actor.user_id),
            "department.updated",
            (EntityType::Department, id),
            None,
            None,
        )?;
        self.get_department(id)
    }

    /// Re-parents `id`; `None` makes it top-level.
    pub fn move_department(
        &self,
        actor: &Actor,
        id: DepartmentId,
        new_parent: Option<DepartmentId>,
    ) -> ServiceResult<Department> {
        let started = Instant::now();
        finish("department_move", started, self.move_inner(actor, id, new_parent))
    }

    fn move_inner(
        &self,
        actor: &Actor,
        id: DepartmentId,
        new_parent: Option<DepartmentId>,
    ) -> ServiceResult<Department> {
        require(actor, Permission::DepartmentManage)?;
        let repo = self.repo();
        let mut department = self.get_department(id)?;

        if let Some(parent_id) = new_parent {
            self.require_active_parent(parent_id)?;
            let all = repo.list_departments(true)?;
            if subtree(id, &all).contains(&parent_id) {
                return Err(ServiceError::Conflict(format!(
                    "moving department {} under {parent_id} would create a cycle",
                    department.code
                )));
            }
        }

        department.parent_id = new_parent;
        repo.update_department(&department)?;
        record_activity(
            &self.ctx,
            Some(actor.user_id),
            "department.moved",
            (EntityType::Department, id),
            None,
            Some(json!({ "parent_id": new_parent })),
        )?;
        self.get_department(id)
    }

    pub fn deactivate_department(&self, actor: &Actor, id: DepartmentId) -> ServiceResult<()> {
        let started = Instant::now();
        finish("department_deactivate", started, self.deactivate_inner(actor, id))
    }

    fn deactivate_inner(&self, actor: &Actor, id: DepartmentId) -> ServiceResult<()> {
        require(actor, Permission::DepartmentManage)?;
        let repo = self.repo();
        let mut department = self.get_department(id)?;
        if !department.is_active {
            return Ok(());
        }
        if repo.count_children(id)? > 0 {
            return Err(ServiceError::Conflict(format!(
                "department {} still has active sub-departments",
                department.code
            )));
        }
        if !repo.list_member_ids(id, true)?.is_empty() {
            return Err(ServiceError::Conflict(format!(
                "department {} still has active members",
                department.code
            )));
        }

        department.is_active = false;
        repo.update_department(&department)?;
        record_activity(
            &self.ctx,
            Some(actor.user_id),
            "department.deactivated",
            (EntityType::Department, id),
            None,
            None,
        )
    }

    /// Department forest ordered by code at every level.
    pub fn tree(&self, include_inactive: bool) -> ServiceResult<Vec<DepartmentNode>> {
        Ok(build_tree(self.repo().list_departments(include_inactive)?))
    }

    /// Active members of `id`; the department must be within the caller's scope.
    pub fn members(&self, actor: &Actor, id: DepartmentId) -> ServiceResult<Vec<User>> {
        self.get_department(id)?;
        if !scope_for(&self.ctx, actor)?.contains(id) {
            return Err(ServiceError::forbidden(
                "department is outside the caller's scope",
            ));
        }
        let page = SqliteUserRepository::new(self.ctx.conn).list_users(&UserListQuery {
            department_ids: Some(vec![id]),
            page: PageRequest::new(Some(MAX_PAGE_LIMIT), 0),
            ..UserListQuery::default()
        })?;
        Ok(page.items)
    }

    fn require_active_parent(&self, parent_id: DepartmentId) -> ServiceResult<()> {
        match self.repo().get_department(parent_id)? {
            Some(parent) if parent.is_active => Ok(()),
            Some(_) => Err(ServiceError::validation(format!(
                "parent department {parent_id} is inactive"
            ))),
            None => Err(ServiceError::not_found("department", parent_id)),
        }
    }
}

/// Nests `departments` under their parents. Orphans and cycle members are
/// surfaced as roots so nothing is dropped.
pub fn build_tree(departments: Vec<Department>) -> Vec<DepartmentNode> {
    let ids: HashSet<DepartmentId> = departments.iter().map(|d| d.id).collect();
    let mut children: BTreeMap<DepartmentId, Vec<Department>> = BTreeMap::new();
    let mut roots = Vec::new();
    for department in departments {
        match department.parent_id {
            Some(parent_id) if ids.contains(&parent_id) && parent_id != department.id => {
                children.entry(parent_id).or_default().push(department)
            }
            _ => roots.push(department),
        }
    }

    let mut placed = HashSet::new();
    let mut nodes: Vec<DepartmentNode> = roots
        .into_iter()
        .map(|root| attach(root, &mut children, &mut placed))
        .collect();

    // Remaining entries only exist when stored parent links form a cycle.
    let leftovers: Vec<Department> = children.into_values().flatten().collect();
    for department in leftovers {
        if !placed.contains(&department.id) {
            let mut empty = BTreeMap::new();
            nodes.push(attach(department, &mut empty, &mut placed));
        }
    }

    nodes.sort_by(|a, b| a.department.code.cmp(&b.department.code));
    nodes
}

fn attach(
    department: Department,
    children: &mut BTreeMap<DepartmentId, Vec<Department>>,
    placed: &mut HashSet<DepartmentId>,
) -> DepartmentNode {
    placed.insert(department.id);
    let mut kids = Vec::new();
    for child in children.remove(&department.id).unwrap_or_default() {
        if !placed.contains(&child.id) {
            kids.push(attach(child, children, placed));
        }
    }
    kids.sort_by(|a, b| a.department.code.cmp(&b.department.code));
    DepartmentNode {
        department,
        children: kids,
    }
}

#[cfg(test)]
mod tests {
    use super::build_tree;
    use crate::model::directory::Department;
    use uuid::Uuid;

    fn department(code: &str, parent_id: Option<Uuid>) -> Department {
        Department {
            id: Uuid::new_v4(),
            code: code.to_string(),
            name: code.to_string(),
            description: None,
            parent_id,
            is_active: true,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn tree_nests_children_sorted_by_code() {
        let root = department("LEGAL", None);
        let b = department("LEGAL-B", Some(root.id));
        let a = department("LEGAL-A", Some(root.id));
        let other = department("APPRAISAL", None);

        let tree = build_tree(vec![b.clone(), root.clone(), other.clone(), a.clone()]);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].department.code, "APPRAISAL");
        let legal = &tree[1];
        let codes: Vec<&str> = legal
            .children
            .iter()
            .map(|node| node.department.code.as_str())
            .collect();
        assert_eq!(codes, vec!["LEGAL-A", "LEGAL-B"]);
    }

    #[test]
    fn grandchildren_nest_under_their_own_parent() {
        let root = department("LEGAL", None);
        let north = department("LEGAL-NORTH", Some(root.id));
        let desk = department("LEGAL-NORTH-DESK", Some(north.id));

        let tree = build_tree(vec![desk.clone(), north.clone(), root.clone()]);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].children.len(), 1);
        let north_node = &tree[0].children[0];
        assert_eq!(north_node.department.id, north.id);
        assert_eq!(north_node.children.len(), 1);
        assert_eq!(north_node.children[0].department.id, desk.id);
    }

    #[test]
    fn orphans_and_cycles_are_not_dropped() {
        let orphan = department("ORPHAN", Some(Uuid::new_v4()));
        let mut x = department("X", None);
        let y = department("Y", Some(x.id));
        x.parent_id = Some(y.id);

        let tree = build_tree(vec![orphan, x, y]);
        let total: usize = tree.iter().map(|node| 1 + node.children.len()).sum();
        assert_eq!(total, 3);
    }
}
