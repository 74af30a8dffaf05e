//! Credit batch entity: one purchased (or granted) block of class
//! credits with its own expiration and remaining balance.
//!
//! `available_credits + used_credits == quantity` holds at all times;
//! the database enforces it with a CHECK constraint.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::sea_orm_active_enums::{BatchOrigin, BatchStatus};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "credit_batches")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub customer_id: Uuid,
    pub category_id: Uuid,
    /// Payment-side reference of the originating transaction; unique,
    /// so webhook redeliveries cannot mint a second batch.
    #[sea_orm(unique)]
    pub source_transaction_id: String,
    pub origin: BatchOrigin,
    pub quantity: i32,
    pub available_credits: i32,
    pub used_credits: i32,
    pub status: BatchStatus,
    pub expires_at: TimeDateTimeWithTimeZone,
    pub created_at: TimeDateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::bookings::Entity")]
    Bookings,
}

impl Related<super::bookings::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Bookings.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
