//! `SeaORM` Entity for unapplied_cash table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "unapplied_cash")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub legal_entity_id: Uuid,
    pub counterparty_id: Uuid,
    pub direction: String,
    pub currency: String,
    pub account_id: Uuid,
    pub original_amount: Decimal,
    pub residual_amount: Decimal,
    pub residual_base: Decimal,
    pub fx_rate: Decimal,
    pub fx_provenance: String,
    pub fx_rate_date: Date,
    pub source_batch_id: Uuid,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
