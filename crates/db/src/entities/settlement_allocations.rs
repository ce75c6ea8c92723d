//! `SeaORM` Entity for settlement_allocations table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "settlement_allocations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub batch_id: Uuid,
    pub open_item_id: Uuid,
    pub amount: Decimal,
    pub original_base: Decimal,
    pub settlement_base: Decimal,
    pub fx_difference: Decimal,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::settlement_batches::Entity",
        from = "Column::BatchId",
        to = "super::settlement_batches::Column::Id"
    )]
    SettlementBatches,
}

impl Related<super::settlement_batches::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SettlementBatches.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
