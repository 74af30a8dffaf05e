use crate::error::{is_unique_violation, CoreError, Result};
use entity::sea_orm_active_enums::SeatStatus;
use sea_orm::{entity::*, query::*, DatabaseConnection, DatabaseTransaction, TransactionTrait};
use tracing::{info, instrument};
use uuid::Uuid;

/// Equipment-slot assignment per scheduled session. Seat rows are
/// created lazily on first assignment and flip between `available`
/// and `in_use` afterwards.
pub struct SeatService {
    db: DatabaseConnection,
}

impl SeatService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Assign a seat inside a caller-owned transaction, locking the
    /// seat row. Re-assigning a seat the same customer already holds is
    /// a no-op; a seat held by anyone else fails with `SeatConflict`.
    pub async fn assign_in_txn(
        txn: &DatabaseTransaction,
        session_id: Uuid,
        seat_number: i32,
        customer_id: Uuid,
    ) -> Result<()> {
        let seat = entity::seat_resources::Entity::find()
            .filter(entity::seat_resources::Column::SessionId.eq(session_id))
            .filter(entity::seat_resources::Column::SeatNumber.eq(seat_number))
            .lock_exclusive()
            .one(txn)
            .await?;

        let now = time::OffsetDateTime::now_utc();

        match seat {
            None => {
                let new_seat = entity::seat_resources::ActiveModel {
                    id: Set(Uuid::now_v7()),
                    session_id: Set(session_id),
                    seat_number: Set(seat_number),
                    status: Set(SeatStatus::InUse),
                    customer_id: Set(Some(customer_id)),
                    updated_at: Set(now),
                };
                // Two first-time assignments race on the insert; the
                // unique (session, seat) index picks the loser.
                match new_seat.insert(txn).await {
                    Ok(_) => Ok(()),
                    Err(e) if is_unique_violation(&e) => Err(CoreError::SeatConflict {
                        session_id,
                        seat_number,
                    }),
                    Err(e) => Err(e.into()),
                }
            }
            Some(seat) if seat.status == SeatStatus::Available => {
                let mut active: entity::seat_resources::ActiveModel = seat.into();
                active.status = Set(SeatStatus::InUse);
                active.customer_id = Set(Some(customer_id));
                active.updated_at = Set(now);
                active.update(txn).await?;
                Ok(())
            }
            Some(seat) if seat.customer_id == Some(customer_id) => Ok(()),
            Some(_) => Err(CoreError::SeatConflict {
                session_id,
                seat_number,
            }),
        }
    }

    /// Release a seat inside a caller-owned transaction. Missing rows
    /// are a no-op: a seat never assigned is already available.
    pub async fn release_in_txn(
        txn: &DatabaseTransaction,
        session_id: Uuid,
        seat_number: i32,
    ) -> Result<()> {
        let seat = entity::seat_resources::Entity::find()
            .filter(entity::seat_resources::Column::SessionId.eq(session_id))
            .filter(entity::seat_resources::Column::SeatNumber.eq(seat_number))
            .lock_exclusive()
            .one(txn)
            .await?;

        if let Some(seat) = seat {
            let mut active: entity::seat_resources::ActiveModel = seat.into();
            active.status = Set(SeatStatus::Available);
            active.customer_id = Set(None);
            active.updated_at = Set(time::OffsetDateTime::now_utc());
            active.update(txn).await?;
        }

        Ok(())
    }

    /// Standalone assignment (admin/tooling path).
    #[instrument(skip(self))]
    pub async fn assign(&self, session_id: Uuid, seat_number: i32, customer_id: Uuid) -> Result<()> {
        let txn = self.db.begin().await?;

        match Self::assign_in_txn(&txn, session_id, seat_number, customer_id).await {
            Ok(()) => {
                txn.commit().await?;
                info!(
                    "Assigned seat {} in session {} to customer {}",
                    seat_number, session_id, customer_id
                );
                Ok(())
            }
            Err(err) => {
                txn.rollback().await?;
                Err(err)
            }
        }
    }

    /// Standalone release (admin/tooling path).
    #[instrument(skip(self))]
    pub async fn release(&self, session_id: Uuid, seat_number: i32) -> Result<()> {
        let txn = self.db.begin().await?;
        Self::release_in_txn(&txn, session_id, seat_number).await?;
        txn.commit().await?;
        Ok(())
    }

    /// Current seat row, if any.
    pub async fn seat(
        &self,
        session_id: Uuid,
        seat_number: i32,
    ) -> Result<Option<entity::seat_resources::Model>> {
        let seat = entity::seat_resources::Entity::find()
            .filter(entity::seat_resources::Column::SessionId.eq(session_id))
            .filter(entity::seat_resources::Column::SeatNumber.eq(seat_number))
            .one(&self.db)
            .await?;
        Ok(seat)
    }
}
