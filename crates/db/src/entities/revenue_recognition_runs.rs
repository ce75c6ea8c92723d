//! `SeaORM` Entity for revenue_recognition_runs table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "revenue_recognition_runs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub legal_entity_id: Uuid,
    pub schedule_id: Uuid,
    pub status: String,
    pub journal_entry_id: Option<Uuid>,
    pub reversal_of_run_id: Option<Uuid>,
    pub reversed_by_run_id: Option<Uuid>,
    pub posted_at: Option<DateTimeWithTimeZone>,
    pub settled_at: Option<DateTimeWithTimeZone>,
    pub reversed_at: Option<DateTimeWithTimeZone>,
    pub idempotency_scope: Option<String>,
    pub idempotency_key: Option<String>,
    pub request_hash: Option<String>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::revenue_recognition_run_lines::Entity")]
    RunLines,
}

impl Related<super::revenue_recognition_run_lines::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RunLines.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
