//! Read access to the activity log.

use crate::auth::{Actor, Permission};
use crate::model::activity::{ActivityEntry, EntityType};
use crate::model::case::CaseId;
use crate::repo::activity_repo::{ActivityRepository, SqliteActivityRepository};
use crate::repo::Page;
use crate::service::{load_visible_case, require, ServiceContext, ServiceResult};
use uuid::Uuid;

pub struct ActivityService<'a> {
    ctx: ServiceContext<'a>,
}

impl<'a> ActivityService<'a> {
    pub fn new(ctx: ServiceContext<'a>) -> Self {
        Self { ctx }
    }

    /// Entries about one entity, newest first. Requires `ReportView`.
    pub fn list_for_entity(
        &self,
        actor: &Actor,
        entity_type: EntityType,
        entity_id: Uuid,
        limit: Option<u32>,
        offset: u32,
    ) -> ServiceResult<Page<ActivityEntry>> {
        require(actor, Permission::ReportView)?;
        Ok(SqliteActivityRepository::new(self.ctx.conn).list_for_entity(
            entity_type,
            entity_id,
            &self.ctx.config.page(limit, offset),
        )?)
    }

    /// Entries linked to a case the caller can see, newest first.
    pub fn list_for_case(
        &self,
        actor: &Actor,
        case_id: CaseId,
        limit: Option<u32>,
        offset: u32,
    ) -> ServiceResult<Page<ActivityEntry>> {
        require(actor, Permission::CaseRead)?;
        let case = load_visible_case(&self.ctx, actor, case_id)?;
        Ok(SqliteActivityRepository::new(self.ctx.conn)
            .list_for_case(case.id, &self.ctx.config.page(limit, offset))?)
    }
}
