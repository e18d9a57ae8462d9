//! Department and user directory model.
//!
//! # Responsibility
//! - Define organizational units and the users that belong to them.
//! - Define the fixed role vocabulary used by authorization.
//!
//! # Invariants
//! - Department `code` is unique (case-insensitive) and stored uppercase.
//! - Department parent links form a forest; cycles are rejected by services.
//! - User `email` is unique (case-insensitive) and stored lowercase.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

static DEPARTMENT_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z0-9][A-Z0-9_-]{0,31}$").expect("valid department code regex"));
static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex")
});

pub type DepartmentId = Uuid;
pub type UserId = Uuid;

/// Organizational unit with optional parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub id: DepartmentId,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    /// `None` means top-level department.
    pub parent_id: Option<DepartmentId>,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Department with its nested children, ordered by code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DepartmentNode {
    #[serde(flatten)]
    pub department: Department,
    pub children: Vec<DepartmentNode>,
}

/// User role. Ordered from most to least privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Unrestricted access across all departments.
    SuperAdmin,
    /// Administers one department subtree, including its users.
    DepartmentAdmin,
    /// Oversees cases in one department subtree.
    Supervisor,
    /// Works cases in their own department.
    Analyst,
    /// Read-only access to their own department.
    Observer,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SuperAdmin => "super_admin",
            Self::DepartmentAdmin => "department_admin",
            Self::Supervisor => "supervisor",
            Self::Analyst => "analyst",
            Self::Observer => "observer",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "super_admin" => Some(Self::SuperAdmin),
            "department_admin" => Some(Self::DepartmentAdmin),
            "supervisor" => Some(Self::Supervisor),
            "analyst" => Some(Self::Analyst),
            "observer" => Some(Self::Observer),
            _ => None,
        }
    }

    /// Whether this role sees descendant departments, not only its own.
    pub fn scopes_department_subtree(self) -> bool {
        matches!(self, Self::DepartmentAdmin | Self::Supervisor)
    }
}

/// Directory user. Credentials are never part of this read model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub department_id: Option<DepartmentId>,
    pub is_active: bool,
    pub last_login_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Normalizes a department code: trimmed, uppercase, at most 32 characters
/// of `A-Z`, `0-9`, `-` and `_`.
pub fn normalize_department_code(code: &str) -> Option<String> {
    let normalized = code.trim().to_ascii_uppercase();
    DEPARTMENT_CODE_RE
        .is_match(&normalized)
        .then_some(normalized)
}

/// Normalizes an email: trimmed, lowercase, exactly one `@` with a dotted
/// domain and no whitespace.
pub fn normalize_email(email: &str) -> Option<String> {
    let normalized = email.trim().to_lowercase();
    EMAIL_RE.is_match(&normalized).then_some(normalized)
}

#[cfg(test)]
mod tests {
    use super::{normalize_department_code, normalize_email, Role};

    #[test]
    fn role_roundtrips_through_storage_value() {
        for role in [
            Role::SuperAdmin,
            Role::DepartmentAdmin,
            Role::Supervisor,
            Role::Analyst,
            Role::Observer,
        ] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("root"), None);
    }

    #[test]
    fn email_normalization_lowercases_and_rejects_malformed_values() {
        assert_eq!(
            normalize_email(" Ana@MOPC.gob.do ").as_deref(),
            Some("ana@mopc.gob.do")
        );
        assert_eq!(normalize_email("no-at-sign"), None);
        assert_eq!(normalize_email("a@b@c.d"), None);
        assert_eq!(normalize_email("@mopc.gob.do"), None);
        assert_eq!(normalize_email("ana maria@mopc.gob.do"), None);
        assert_eq!(normalize_email("ana@localhost"), None);
    }

    #[test]
    fn department_code_is_uppercased() {
        assert_eq!(normalize_department_code(" legal ").as_deref(), Some("LEGAL"));
        assert_eq!(normalize_department_code("  "), None);
        assert_eq!(normalize_department_code("dept-01_b").as_deref(), Some("DEPT-01_B"));
        assert_eq!(normalize_department_code("legal affairs"), None);
        assert_eq!(normalize_department_code(&"x".repeat(33)), None);
    }
}
