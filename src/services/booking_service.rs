use crate::{
    config::BookingConfig,
    error::{is_lock_contention, is_unique_violation, CoreError, Result},
    models::{
        bookings::{BookingRecord, CancellationOutcome},
        sessions::{SessionDirectory, SessionInfo},
    },
    services::{AllocationService, SeatService, WaitlistService},
};
use entity::sea_orm_active_enums::{BatchStatus, BookingStatus};
use sea_orm::{
    entity::*, query::*, DatabaseConnection, DatabaseTransaction, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Orchestrates a booking attempt across the ledger, the seat registry
/// and the waiting queue: one transaction per attempt, committed whole
/// or aborted whole. Lock acquisition order is credit batch, then seat,
/// then the booking re-check, the same on every path.
pub struct BookingService {
    db: DatabaseConnection,
    sessions: Arc<dyn SessionDirectory>,
    config: BookingConfig,
}

impl BookingService {
    pub fn new(
        db: DatabaseConnection,
        sessions: Arc<dyn SessionDirectory>,
        config: &BookingConfig,
    ) -> Self {
        Self {
            db,
            sessions,
            config: config.clone(),
        }
    }

    /// Book a seat directly: draw one credit FEFO from the session's
    /// category, take the seat, create the booking, all in one transaction.
    #[instrument(skip(self))]
    pub async fn book_direct(
        &self,
        session_id: Uuid,
        customer_id: Uuid,
        seat_number: i32,
    ) -> Result<BookingRecord> {
        let session = self.resolve_session(session_id).await?;

        if self.booking_for(session_id, customer_id).await?.is_some() {
            return Err(CoreError::AlreadyBooked { session_id });
        }

        self.attempt_with_retry(&session, customer_id, seat_number, false)
            .await
    }

    /// Convert the customer's waiting entry into a booking. Identical to
    /// `book_direct`, plus the entry must exist (`NotQueued`) and its
    /// removal commits in the same transaction as the debit, the seat
    /// and the booking row.
    #[instrument(skip(self))]
    pub async fn promote_from_queue(
        &self,
        session_id: Uuid,
        customer_id: Uuid,
        seat_number: i32,
    ) -> Result<BookingRecord> {
        let session = self.resolve_session(session_id).await?;

        if self.booking_for(session_id, customer_id).await?.is_some() {
            return Err(CoreError::AlreadyBooked { session_id });
        }

        let queued = entity::waiting_entries::Entity::find()
            .filter(entity::waiting_entries::Column::SessionId.eq(session_id))
            .filter(entity::waiting_entries::Column::CustomerId.eq(customer_id))
            .one(&self.db)
            .await?;
        if queued.is_none() {
            return Err(CoreError::NotQueued { session_id });
        }

        self.attempt_with_retry(&session, customer_id, seat_number, true)
            .await
    }

    /// Cancel an active booking before the session's cutoff: the booking
    /// flips to cancelled, the seat frees up, and the debited credit is
    /// restored to the batch it came from.
    #[instrument(skip(self))]
    pub async fn cancel_booking(
        &self,
        booking_id: Uuid,
        now: time::OffsetDateTime,
    ) -> Result<CancellationOutcome> {
        let booking = entity::bookings::Entity::find_by_id(booking_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("booking {booking_id}")))?;

        if booking.status != BookingStatus::Active {
            return Err(CoreError::NotFound(format!("active booking {booking_id}")));
        }

        let session = self.resolve_session(booking.session_id).await?;
        let cutoff = session.starts_at - session.cancellation_window;
        if now >= cutoff {
            return Err(CoreError::CancellationWindowClosed { cutoff });
        }

        let txn = self.db.begin().await?;

        match self.apply_cancellation(&txn, &booking, now).await {
            Ok(outcome) => {
                txn.commit().await?;
                info!(
                    "Cancelled booking {} for customer {}, credit restored to batch {}",
                    booking_id, booking.customer_id, outcome.batch_id
                );
                Ok(outcome)
            }
            Err(err) => {
                txn.rollback().await?;
                Err(err)
            }
        }
    }

    /// The customer's active booking for a session, if any.
    pub async fn booking_for(
        &self,
        session_id: Uuid,
        customer_id: Uuid,
    ) -> Result<Option<entity::bookings::Model>> {
        let booking = entity::bookings::Entity::find()
            .filter(entity::bookings::Column::SessionId.eq(session_id))
            .filter(entity::bookings::Column::CustomerId.eq(customer_id))
            .filter(entity::bookings::Column::Status.eq(BookingStatus::Active))
            .one(&self.db)
            .await?;
        Ok(booking)
    }

    async fn resolve_session(&self, session_id: Uuid) -> Result<SessionInfo> {
        self.sessions
            .session_info(session_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("session {session_id}")))
    }

    /// Lock-contention failures (deadlock, serialization) are transient,
    /// unlike every business error; retry the whole transaction a bounded
    /// number of times, then surface the generic conflict.
    async fn attempt_with_retry(
        &self,
        session: &SessionInfo,
        customer_id: Uuid,
        seat_number: i32,
        promotion: bool,
    ) -> Result<BookingRecord> {
        let mut attempts = 0;
        loop {
            match self
                .attempt_booking(session, customer_id, seat_number, promotion)
                .await
            {
                Err(CoreError::Database(e)) if is_lock_contention(&e) => {
                    attempts += 1;
                    if attempts >= self.config.lock_retry_attempts {
                        return Err(CoreError::Concurrency);
                    }
                }
                other => return other,
            }
        }
    }

    async fn attempt_booking(
        &self,
        session: &SessionInfo,
        customer_id: Uuid,
        seat_number: i32,
        promotion: bool,
    ) -> Result<BookingRecord> {
        let session_id = session.session_id;
        let now = time::OffsetDateTime::now_utc();
        let txn = self.db.begin().await?;

        let result = self
            .booking_steps(&txn, session, customer_id, seat_number, promotion, now)
            .await;

        match result {
            Ok(record) => {
                txn.commit().await?;
                info!(
                    "Booked seat {} in session {} for customer {} (batch {})",
                    seat_number, session_id, customer_id, record.batch_id
                );
                Ok(record)
            }
            Err(err) => {
                txn.rollback().await?;
                Err(err)
            }
        }
    }

    async fn booking_steps(
        &self,
        txn: &DatabaseTransaction,
        session: &SessionInfo,
        customer_id: Uuid,
        seat_number: i32,
        promotion: bool,
        now: time::OffsetDateTime,
    ) -> Result<BookingRecord> {
        let session_id = session.session_id;

        // 1. Draw one credit FEFO from the session's category (locks the
        //    candidate batches).
        let breakdown =
            AllocationService::consume_in_txn(txn, customer_id, session.category_id, 1, now)
                .await?;
        let batch_id = breakdown
            .draws
            .first()
            .map(|draw| draw.batch_id)
            .ok_or_else(|| CoreError::Internal(anyhow::anyhow!("empty draw for quantity 1")))?;

        // 2. Take the seat (locks the seat row).
        SeatService::assign_in_txn(txn, session_id, seat_number, customer_id).await?;

        // 3. Re-check no active booking slipped in concurrently.
        let existing = entity::bookings::Entity::find()
            .filter(entity::bookings::Column::SessionId.eq(session_id))
            .filter(entity::bookings::Column::CustomerId.eq(customer_id))
            .filter(entity::bookings::Column::Status.eq(BookingStatus::Active))
            .lock_exclusive()
            .one(txn)
            .await?;
        if existing.is_some() {
            return Err(CoreError::AlreadyBooked { session_id });
        }

        // 4. Promotion consumes the waiting entry in this transaction.
        if promotion {
            let entry = entity::waiting_entries::Entity::find()
                .filter(entity::waiting_entries::Column::SessionId.eq(session_id))
                .filter(entity::waiting_entries::Column::CustomerId.eq(customer_id))
                .one(txn)
                .await?
                .ok_or(CoreError::NotQueued { session_id })?;
            WaitlistService::dequeue_in_txn(txn, entry.id).await?;
        }

        // 5. Create the booking. The partial unique indexes catch the
        //    insert race the re-check cannot see.
        let new_booking = entity::bookings::ActiveModel {
            id: Set(Uuid::now_v7()),
            session_id: Set(session_id),
            customer_id: Set(customer_id),
            seat_number: Set(seat_number),
            batch_id: Set(batch_id),
            status: Set(BookingStatus::Active),
            created_at: Set(now),
            cancelled_at: Set(None),
        };

        let inserted = match new_booking.insert(txn).await {
            Ok(model) => model,
            Err(e) if is_unique_violation(&e) => {
                let constraint = e.to_string();
                return Err(if constraint.contains("idx_bookings_active_session_seat") {
                    CoreError::SeatConflict {
                        session_id,
                        seat_number,
                    }
                } else {
                    CoreError::AlreadyBooked { session_id }
                });
            }
            Err(e) => return Err(e.into()),
        };

        Ok(BookingRecord::from(inserted))
    }

    /// Locks batch, then seat, then the booking row (the global order),
    /// re-validates the booking under lock, and only then mutates.
    async fn apply_cancellation(
        &self,
        txn: &DatabaseTransaction,
        booking: &entity::bookings::Model,
        now: time::OffsetDateTime,
    ) -> Result<CancellationOutcome> {
        let batch = entity::credit_batches::Entity::find_by_id(booking.batch_id)
            .lock_exclusive()
            .one(txn)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("batch {}", booking.batch_id)))?;

        // Seat row lock (mutated below via release).
        entity::seat_resources::Entity::find()
            .filter(entity::seat_resources::Column::SessionId.eq(booking.session_id))
            .filter(entity::seat_resources::Column::SeatNumber.eq(booking.seat_number))
            .lock_exclusive()
            .one(txn)
            .await?;

        let locked_booking = entity::bookings::Entity::find_by_id(booking.id)
            .lock_exclusive()
            .one(txn)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("booking {}", booking.id)))?;
        if locked_booking.status != BookingStatus::Active {
            // Lost a race with another cancellation.
            return Err(CoreError::NotFound(format!("active booking {}", booking.id)));
        }

        let mut active_booking: entity::bookings::ActiveModel = locked_booking.into();
        active_booking.status = Set(BookingStatus::Cancelled);
        active_booking.cancelled_at = Set(Some(now));
        active_booking.update(txn).await?;

        SeatService::release_in_txn(txn, booking.session_id, booking.seat_number).await?;

        // Restore the debited unit to the source batch. A batch funding
        // an active booking always carries the usage being reversed.
        if batch.used_credits < 1 {
            return Err(CoreError::Internal(anyhow::anyhow!(
                "batch {} has no usage to restore",
                batch.id
            )));
        }

        let batch_id = batch.id;
        let restored_available = batch.available_credits + 1;
        let restored_used = batch.used_credits - 1;
        let restored_status = if batch.status == BatchStatus::Used {
            BatchStatus::Valid
        } else {
            batch.status.clone()
        };
        let refund_spendable =
            restored_status == BatchStatus::Valid && batch.expires_at >= now;

        let mut active_batch: entity::credit_batches::ActiveModel = batch.into();
        active_batch.available_credits = Set(restored_available);
        active_batch.used_credits = Set(restored_used);
        active_batch.status = Set(restored_status);
        active_batch.update(txn).await?;

        Ok(CancellationOutcome {
            booking_id: booking.id,
            batch_id,
            refund_spendable,
        })
    }
}
