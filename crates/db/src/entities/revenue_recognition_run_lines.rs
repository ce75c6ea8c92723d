//! `SeaORM` Entity for revenue_recognition_run_lines table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "revenue_recognition_run_lines")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub run_id: Uuid,
    pub line_no: i32,
    pub purpose_code: String,
    pub account_id: Uuid,
    pub kind: String,
    pub amount_txn: Decimal,
    pub amount_base: Decimal,
    pub status: String,
    pub reversal_of_run_line_id: Option<Uuid>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::revenue_recognition_runs::Entity",
        from = "Column::RunId",
        to = "super::revenue_recognition_runs::Column::Id"
    )]
    Runs,
}

impl Related<super::revenue_recognition_runs::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Runs.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
