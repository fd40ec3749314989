use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A bookable training slot. `user_id` is the client; it is not a foreign key
/// because booking flows own this table.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "session_records")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub user_id: Option<i32>,
    pub trainer_id: Option<i32>,
    pub session_date: TimeDateTimeWithTimeZone,
    pub status: String,
    pub is_blocked: bool,
    pub session_deducted: bool,
    pub deduction_date: Option<TimeDateTimeWithTimeZone>,
    #[sea_orm(column_type = "Text", nullable)]
    pub notes: Option<String>,
    pub created_at: TimeDateTimeWithTimeZone,
    pub updated_at: TimeDateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
