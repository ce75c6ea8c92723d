//! `SeaORM` Entity for contract_lines table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "contract_lines")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub legal_entity_id: Uuid,
    pub family: String,
    pub method: String,
    pub start_date: Date,
    pub end_date: Date,
    pub amount: Decimal,
    pub currency: String,
    pub fx_rate: Decimal,
    pub fx_provenance: String,
    pub fx_rate_date: Date,
    pub description: Option<String>,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
