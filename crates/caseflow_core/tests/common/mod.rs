#![allow(dead_code)]

use caseflow_core::{
    open_db_in_memory, Actor, Case, CaseService, CoreConfig, Department, DepartmentService,
    NewCase, NewDepartment, NewUser, Role, ServiceContext, User, UserService,
};
use rusqlite::Connection;
use std::collections::BTreeSet;
use uuid::Uuid;

/// 2024-06-10T10:00:00Z.
pub const NOW_MS: i64 = 1_718_013_600_000;
pub const HOUR_MS: i64 = 3_600_000;
pub const PASSWORD: &str = "correct-horse-42";

pub fn fixed_now() -> i64 {
    NOW_MS
}

pub struct Fixture {
    pub conn: Connection,
    pub config: CoreConfig,
    pub admin: Actor,
}

impl Fixture {
    pub fn new() -> Self {
        let conn = open_db_in_memory().unwrap();
        let config = CoreConfig::default();
        let admin_user = {
            let ctx = ServiceContext::new(&conn, &config).with_clock(fixed_now);
            UserService::new(ctx)
                .provision_super_admin(new_user("root@caseflow.test", Role::SuperAdmin, None))
                .unwrap()
        };
        let admin = actor(&admin_user);
        Self {
            conn,
            config,
            admin,
        }
    }

    pub fn ctx(&self) -> ServiceContext<'_> {
        ServiceContext::new(&self.conn, &self.config).with_clock(fixed_now)
    }

    pub fn department(&self, code: &str, parent_id: Option<Uuid>) -> Department {
        DepartmentService::new(self.ctx())
            .create_department(
                &self.admin,
                NewDepartment {
                    code: code.to_string(),
                    name: format!("{code} office"),
                    description: None,
                    parent_id,
                },
            )
            .unwrap()
    }

    pub fn user(&self, email: &str, role: Role, department_id: Option<Uuid>) -> (User, Actor) {
        let user = UserService::new(self.ctx())
            .create_user(&self.admin, new_user(email, role, department_id))
            .unwrap();
        let actor = actor(&user);
        (user, actor)
    }

    pub fn case(&self, creator: &Actor, title: &str) -> Case {
        CaseService::new(self.ctx())
            .create_case(creator, new_case(title))
            .unwrap()
    }
}

pub fn actor(user: &User) -> Actor {
    Actor::from_user(user, BTreeSet::new())
}

pub fn new_user(email: &str, role: Role, department_id: Option<Uuid>) -> NewUser {
    NewUser {
        email: email.to_string(),
        password: PASSWORD.to_string(),
        first_name: "Test".to_string(),
        last_name: email.split('@').next().unwrap_or("user").to_string(),
        role,
        department_id,
    }
}

pub fn new_case(title: &str) -> NewCase {
    NewCase {
        title: title.to_string(),
        property_address: "Av. Independencia 101".to_string(),
        owner_name: "Parcel owner".to_string(),
        land_area: Some(1250.0),
        estimated_value: Some(3_500_000.0),
        ..NewCase::default()
    }
}
