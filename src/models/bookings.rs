use entity::bookings;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A confirmed, active booking as returned to the request layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRecord {
    pub id: Uuid,
    pub session_id: Uuid,
    pub customer_id: Uuid,
    pub seat_number: i32,
    /// The batch the booking's credit was drawn from.
    pub batch_id: Uuid,
    pub created_at: time::OffsetDateTime,
}

impl From<bookings::Model> for BookingRecord {
    fn from(model: bookings::Model) -> Self {
        Self {
            id: model.id,
            session_id: model.session_id,
            customer_id: model.customer_id,
            seat_number: model.seat_number,
            batch_id: model.batch_id,
            created_at: model.created_at,
        }
    }
}

/// Result of a successful cancellation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancellationOutcome {
    pub booking_id: Uuid,
    /// Batch the credit was restored to.
    pub batch_id: Uuid,
    /// False when the restored unit landed on a batch that can no longer
    /// fund bookings (expired or written off in the meantime).
    pub refund_spendable: bool,
}
