//! Department visibility scoping for actors.
//!
//! # Invariants
//! - Subtree expansion terminates even if stored parent links contain a cycle.
//! - Inactive departments are still included; deactivation does not hide
//!   historical cases.

use crate::auth::Actor;
use crate::model::directory::{Department, DepartmentId};
use std::collections::{BTreeSet, HashMap, VecDeque};

/// Set of departments whose records an actor may see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepartmentScope {
    /// No department restriction.
    All,
    /// Only these departments. May be empty for users without a department.
    Only(BTreeSet<DepartmentId>),
}

impl DepartmentScope {
    pub fn contains(&self, department_id: DepartmentId) -> bool {
        match self {
            Self::All => true,
            Self::Only(ids) => ids.contains(&department_id),
        }
    }

    /// Department ids for SQL filters; `None` means unrestricted.
    pub fn ids(&self) -> Option<Vec<DepartmentId>> {
        match self {
            Self::All => None,
            Self::Only(ids) => Some(ids.iter().copied().collect()),
        }
    }
}

/// Computes the scope for `actor` given the full department list.
pub fn department_scope(actor: &Actor, departments: &[Department]) -> DepartmentScope {
    if actor.is_super_admin() {
        return DepartmentScope::All;
    }

    let Some(home) = actor.department_id else {
        return DepartmentScope::Only(BTreeSet::new());
    };

    if actor.role.scopes_department_subtree() {
        DepartmentScope::Only(subtree(home, departments))
    } else {
        DepartmentScope::Only(BTreeSet::from([home]))
    }
}

/// Returns `root` plus all of its transitive children.
pub fn subtree(root: DepartmentId, departments: &[Department]) -> BTreeSet<DepartmentId> {
    let mut children: HashMap<DepartmentId, Vec<DepartmentId>> = HashMap::new();
    for department in departments {
        if let Some(parent_id) = department.parent_id {
            children.entry(parent_id).or_default().push(department.id);
        }
    }

    let mut visited = BTreeSet::new();
    let mut queue = VecDeque::from([root]);
    while let Some(current) = queue.pop_front() {
        if !visited.insert(current) {
            continue;
        }
        if let Some(next) = children.get(&current) {
            queue.extend(next.iter().copied());
        }
    }
    visited
}

#[cfg(test)]
mod tests {
    use super::{department_scope, subtree, DepartmentScope};
    use crate::auth::Actor;
    use crate::model::directory::{Department, Role};
    use std::collections::BTreeSet;
    use uuid::Uuid;

    fn department(parent_id: Option<Uuid>) -> Department {
        Department {
            id: Uuid::new_v4(),
            code: "D".to_string(),
            name: "Dept".to_string(),
            description: None,
            parent_id,
            is_active: true,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn subtree_includes_transitive_children_only() {
        let root = department(None);
        let child = department(Some(root.id));
        let grandchild = department(Some(child.id));
        let sibling = department(None);
        let all = vec![
            root.clone(),
            child.clone(),
            grandchild.clone(),
            sibling.clone(),
        ];

        let ids = subtree(root.id, &all);
        assert_eq!(ids, BTreeSet::from([root.id, child.id, grandchild.id]));
        assert!(!ids.contains(&sibling.id));
    }

    #[test]
    fn subtree_terminates_on_corrupt_cycle() {
        let mut a = department(None);
        let b = department(Some(a.id));
        a.parent_id = Some(b.id);
        let ids = subtree(a.id, &[a.clone(), b.clone()]);
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn scope_depends_on_role() {
        let root = department(None);
        let child = department(Some(root.id));
        let all = vec![root.clone(), child.clone()];

        let admin = Actor::new(Uuid::new_v4(), Role::SuperAdmin, None);
        assert_eq!(department_scope(&admin, &all), DepartmentScope::All);

        let supervisor = Actor::new(Uuid::new_v4(), Role::Supervisor, Some(root.id));
        assert!(department_scope(&supervisor, &all).contains(child.id));

        let analyst = Actor::new(Uuid::new_v4(), Role::Analyst, Some(root.id));
        let scope = department_scope(&analyst, &all);
        assert!(scope.contains(root.id));
        assert!(!scope.contains(child.id));

        let homeless = Actor::new(Uuid::new_v4(), Role::Analyst, None);
        assert_eq!(
            department_scope(&homeless, &all),
            DepartmentScope::Only(BTreeSet::new())
        );
    }
}
