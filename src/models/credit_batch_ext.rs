/// Extension methods for the credit_batches entity
///
/// Eligibility must match the SQL predicates used by the allocation and
/// balance queries; these helpers exist for code that already holds a
/// loaded row.
use entity::credit_batches;
use entity::sea_orm_active_enums::BatchStatus;

pub trait CreditBatchExt {
    /// Whether this batch can fund a consumption at `now`:
    /// valid, unexpired, and holding credits.
    fn is_consumable(&self, now: time::OffsetDateTime) -> bool;

    /// Whether any credit of this batch was ever consumed.
    fn has_usage(&self) -> bool;
}

impl CreditBatchExt for credit_batches::Model {
    fn is_consumable(&self, now: time::OffsetDateTime) -> bool {
        self.status == BatchStatus::Valid && self.expires_at >= now && self.available_credits > 0
    }

    fn has_usage(&self) -> bool {
        self.used_credits > 0
    }
}
