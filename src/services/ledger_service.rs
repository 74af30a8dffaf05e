use crate::{
    error::{CoreError, Result},
    models::batches::BatchFilter,
};
use entity::sea_orm_active_enums::{BatchOrigin, BatchStatus};
use sea_orm::{
    entity::*,
    query::*,
    sea_query::{Alias, Expr, OnConflict},
    ActiveEnum, DatabaseConnection, DbErr, TransactionTrait,
};
use std::collections::HashMap;
use tracing::{info, instrument};
use uuid::Uuid;

/// Storage and lifecycle of credit batches: purchase, balance queries,
/// cancellation of unused batches, write-offs, and the expiry sweep.
/// Consumption lives in `AllocationService`.
pub struct LedgerService {
    db: DatabaseConnection,
}

impl LedgerService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Record a credit purchase as one new batch.
    ///
    /// Idempotent on `source_transaction_id`: payment webhooks redeliver,
    /// so the insert is ON CONFLICT DO NOTHING followed by a read-back;
    /// a reference claimed by an earlier batch fails with
    /// `DuplicateTransaction` instead of minting credits twice.
    #[instrument(skip(self))]
    pub async fn purchase(
        &self,
        customer_id: Uuid,
        category_id: Uuid,
        quantity: i32,
        source_transaction_id: &str,
        origin: BatchOrigin,
        validity_days: i64,
    ) -> Result<Uuid> {
        if quantity <= 0 {
            return Err(CoreError::InvalidQuantity(quantity));
        }
        if validity_days <= 0 {
            return Err(CoreError::InvalidQuantity(validity_days as i32));
        }

        let txn = self.db.begin().await?;

        let now = time::OffsetDateTime::now_utc();
        let batch_id = Uuid::now_v7();

        let new_batch = entity::credit_batches::ActiveModel {
            id: Set(batch_id),
            customer_id: Set(customer_id),
            category_id: Set(category_id),
            source_transaction_id: Set(source_transaction_id.to_string()),
            origin: Set(origin),
            quantity: Set(quantity),
            available_credits: Set(quantity),
            used_credits: Set(0),
            status: Set(BatchStatus::Valid),
            expires_at: Set(now + time::Duration::days(validity_days)),
            created_at: Set(now),
        };

        // Insert atomically; if the transaction reference already exists,
        // do nothing instead of erroring.
        let insert_result = entity::credit_batches::Entity::insert(new_batch)
            .on_conflict(
                OnConflict::column(entity::credit_batches::Column::SourceTransactionId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec(&txn)
            .await;

        match insert_result {
            Ok(_) | Err(DbErr::RecordNotInserted) => {}
            Err(e) => return Err(e.into()),
        }

        // Check whether this purchase was inserted or already existed
        let persisted = entity::credit_batches::Entity::find()
            .filter(
                entity::credit_batches::Column::SourceTransactionId.eq(source_transaction_id),
            )
            .one(&txn)
            .await?
            .ok_or_else(|| {
                CoreError::Internal(anyhow::anyhow!(
                    "failed to read batch after insert for transaction {}",
                    source_transaction_id
                ))
            })?;

        if persisted.id != batch_id {
            // Another transaction already claimed this reference
            txn.rollback().await?;
            return Err(CoreError::DuplicateTransaction(
                source_transaction_id.to_string(),
            ));
        }

        txn.commit().await?;

        info!(
            "Recorded credit purchase: customer={}, transaction={}, quantity={}, expires={}",
            customer_id, source_transaction_id, quantity, persisted.expires_at
        );

        Ok(batch_id)
    }

    /// Spendable credits per product category: sums `available_credits`
    /// over valid, unexpired batches.
    #[instrument(skip(self))]
    pub async fn balance_by_category(&self, customer_id: Uuid) -> Result<HashMap<Uuid, i64>> {
        let now = time::OffsetDateTime::now_utc();

        let rows: Vec<(Uuid, Option<i64>)> = entity::credit_batches::Entity::find()
            .select_only()
            .column(entity::credit_batches::Column::CategoryId)
            .column_as(
                entity::credit_batches::Column::AvailableCredits.sum(),
                "available",
            )
            .filter(entity::credit_batches::Column::CustomerId.eq(customer_id))
            .filter(entity::credit_batches::Column::Status.eq(BatchStatus::Valid))
            .filter(entity::credit_batches::Column::ExpiresAt.gte(now))
            .group_by(entity::credit_batches::Column::CategoryId)
            .into_tuple()
            .all(&self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(category, available)| (category, available.unwrap_or(0)))
            .collect())
    }

    /// Read-only batch listing, ordered by status, then expiration, then id.
    #[instrument(skip(self, filter))]
    pub async fn list_batches(
        &self,
        customer_id: Uuid,
        filter: BatchFilter,
    ) -> Result<Vec<entity::credit_batches::Model>> {
        let mut query = entity::credit_batches::Entity::find()
            .filter(entity::credit_batches::Column::CustomerId.eq(customer_id));

        if let Some(category_id) = filter.category_id {
            query = query.filter(entity::credit_batches::Column::CategoryId.eq(category_id));
        }
        if let Some(status) = filter.status {
            query = query.filter(entity::credit_batches::Column::Status.eq(status));
        }
        if filter.live_only {
            let now = time::OffsetDateTime::now_utc();
            query = query
                .filter(entity::credit_batches::Column::Status.eq(BatchStatus::Valid))
                .filter(entity::credit_batches::Column::ExpiresAt.gte(now));
        }

        let batches = query
            .order_by_asc(entity::credit_batches::Column::Status)
            .order_by_asc(entity::credit_batches::Column::ExpiresAt)
            .order_by_asc(entity::credit_batches::Column::Id)
            .all(&self.db)
            .await?;

        Ok(batches)
    }

    /// Withdraw a batch no credit of which was ever consumed. The row is
    /// kept with `status = cancelled` so the payment reference stays
    /// auditable; every balance and allocation query excludes it.
    #[instrument(skip(self))]
    pub async fn cancel_if_unused(&self, customer_id: Uuid, batch_id: Uuid) -> Result<()> {
        let txn = self.db.begin().await?;

        let batch = entity::credit_batches::Entity::find_by_id(batch_id)
            .filter(entity::credit_batches::Column::CustomerId.eq(customer_id))
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("batch {batch_id}")))?;

        if batch.used_credits > 0 {
            txn.rollback().await?;
            return Err(CoreError::BatchHasUsage {
                used: batch.used_credits,
            });
        }

        let mut active: entity::credit_batches::ActiveModel = batch.into();
        active.status = Set(BatchStatus::Cancelled);
        active.update(&txn).await?;

        txn.commit().await?;

        info!("Cancelled unused batch {} for customer {}", batch_id, customer_id);
        Ok(())
    }

    /// Write off whatever is left in a batch: the remainder moves to
    /// `used_credits` (keeping the conservation constraint) and the batch
    /// closes as `used`. Returns the amount written off; 0 when the batch
    /// was already empty.
    #[instrument(skip(self))]
    pub async fn refund_remaining(&self, customer_id: Uuid, batch_id: Uuid) -> Result<i32> {
        let txn = self.db.begin().await?;

        let batch = entity::credit_batches::Entity::find_by_id(batch_id)
            .filter(entity::credit_batches::Column::CustomerId.eq(customer_id))
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("batch {batch_id}")))?;

        let amount = batch.available_credits;
        if amount == 0 {
            txn.rollback().await?;
            return Ok(0);
        }

        let used = batch.used_credits;
        let mut active: entity::credit_batches::ActiveModel = batch.into();
        active.available_credits = Set(0);
        active.used_credits = Set(used + amount);
        active.status = Set(BatchStatus::Used);
        active.update(&txn).await?;

        txn.commit().await?;

        info!(
            "Wrote off {} remaining credits from batch {} for customer {}",
            amount, batch_id, customer_id
        );
        Ok(amount)
    }

    /// Flip every valid batch past its expiration to `expired`, leaving
    /// `available_credits` untouched for audit. One bulk update, safe to
    /// re-run; consumption already excludes these batches by date, so a
    /// late sweep cannot corrupt balances.
    #[instrument(skip(self))]
    pub async fn sweep_expired(&self, now: time::OffsetDateTime) -> Result<u64> {
        let result = entity::credit_batches::Entity::update_many()
            .col_expr(
                entity::credit_batches::Column::Status,
                Expr::val(BatchStatus::Expired.to_value()).as_enum(Alias::new("batch_status")),
            )
            .filter(entity::credit_batches::Column::Status.eq(BatchStatus::Valid))
            .filter(entity::credit_batches::Column::ExpiresAt.lt(now))
            .filter(entity::credit_batches::Column::AvailableCredits.gt(0))
            .exec(&self.db)
            .await?;

        if result.rows_affected > 0 {
            info!("Expired {} credit batches", result.rows_affected);
        }
        Ok(result.rows_affected)
    }
}
