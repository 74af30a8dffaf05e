//! Booking entity: one customer occupying one seat in one scheduled
//! session, funded by exactly one credit drawn from `batch_id`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::sea_orm_active_enums::BookingStatus;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "bookings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub session_id: Uuid,
    pub customer_id: Uuid,
    pub seat_number: i32,
    /// Which batch funded this booking; the refund trail on cancellation.
    pub batch_id: Uuid,
    pub status: BookingStatus,
    pub created_at: TimeDateTimeWithTimeZone,
    #[sea_orm(nullable)]
    pub cancelled_at: Option<TimeDateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::credit_batches::Entity",
        from = "Column::BatchId",
        to = "super::credit_batches::Column::Id"
    )]
    CreditBatch,
}

impl Related<super::credit_batches::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CreditBatch.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
