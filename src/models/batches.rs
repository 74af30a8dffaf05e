use entity::sea_orm_active_enums::BatchStatus;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Narrowing options for batch listings. `live_only` keeps batches that
/// can still fund bookings (valid and unexpired by date).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFilter {
    pub category_id: Option<Uuid>,
    pub status: Option<BatchStatus>,
    #[serde(default)]
    pub live_only: bool,
}

/// Spendable credits for one product category.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryBalance {
    pub category_id: Uuid,
    pub available: i64,
}
