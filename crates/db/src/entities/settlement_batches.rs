//! `SeaORM` Entity for settlement_batches table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "settlement_batches")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub legal_entity_id: Uuid,
    pub register_id: Option<Uuid>,
    pub unapplied_source_id: Option<Uuid>,
    pub counterparty_id: Uuid,
    pub direction: String,
    pub currency: String,
    pub amount: Decimal,
    pub applied_amount: Decimal,
    pub unapplied_amount: Decimal,
    pub fx_total: Decimal,
    pub fx_rate: Decimal,
    pub fx_provenance: String,
    pub fx_rate_date: Date,
    pub settlement_date: Date,
    pub journal_entry_id: Option<Uuid>,
    pub status: String,
    pub idempotency_scope: String,
    pub idempotency_key: String,
    pub request_hash: String,
    pub bank_statement_line_id: Option<Uuid>,
    pub cash_transaction_id: Option<Uuid>,
    pub created_by: Uuid,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::settlement_allocations::Entity")]
    SettlementAllocations,
}

impl Related<super::settlement_allocations::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SettlementAllocations.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
