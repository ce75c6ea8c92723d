//! `SeaORM` Entity for revenue_recognition_schedules table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "revenue_recognition_schedules")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub legal_entity_id: Uuid,
    pub contract_line_id: Option<Uuid>,
    pub family: String,
    pub bucket: String,
    pub maturity_date: Date,
    pub amount_txn: Decimal,
    pub amount_base: Decimal,
    pub currency: String,
    pub fx_rate: Decimal,
    pub reclass_required: bool,
    pub source_row_uid: String,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
