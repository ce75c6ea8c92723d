//! `SeaORM` Entity for open_items table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "open_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub legal_entity_id: Uuid,
    pub counterparty_id: Uuid,
    pub direction: String,
    pub document_no: String,
    pub currency: String,
    pub control_account_id: Uuid,
    pub document_date: Date,
    pub due_date: Date,
    pub original_amount: Decimal,
    pub residual_amount: Decimal,
    pub original_base: Decimal,
    pub residual_base: Decimal,
    pub fx_rate: Decimal,
    pub fx_provenance: String,
    pub fx_rate_date: Date,
    pub status: String,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
