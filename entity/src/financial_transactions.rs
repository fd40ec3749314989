use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Append-only payment audit row.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "financial_transactions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub user_id: i32,
    pub order_id: i32,
    pub cart_id: Option<i32>,
    pub amount_cents: i64,
    pub currency: String,
    pub status: String,
    pub payment_method: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    pub metadata: Option<Json>,
    pub processed_at: TimeDateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::orders::Entity",
        from = "Column::OrderId",
        to = "super::orders::Column::Id",
        on_update = "NoAction",
        on_delete = "Restrict"
    )]
    Orders,
}

impl Related<super::orders::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Orders.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
