use crate::error::{CoreError, Result};
use entity::sea_orm_active_enums::BatchStatus;
use sea_orm::{
    entity::*, query::*, DatabaseConnection, DatabaseTransaction, Select, TransactionTrait,
};
use tracing::{info, instrument};
use uuid::Uuid;

/// FEFO allocation over the credit ledger: consumption drains the
/// earliest-expiring eligible batch first, with batch id (creation
/// order) as the deterministic tie-break.
pub struct AllocationService {
    db: DatabaseConnection,
}

/// One batch debit within a consumption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchDraw {
    pub batch_id: Uuid,
    pub amount: i32,
}

/// Which batches a consumption drew from, front-first.
#[derive(Debug, Clone)]
pub struct ConsumptionBreakdown {
    pub total: i32,
    pub draws: Vec<BatchDraw>,
}

/// The eligibility predicate shared by every read and write path:
/// owned by the customer, right category, still `valid`, unexpired by
/// date (independent of whether the sweep has run), holding credits.
/// Ordered front-first for FEFO.
fn eligible_batches(
    customer_id: Uuid,
    category_id: Uuid,
    now: time::OffsetDateTime,
) -> Select<entity::credit_batches::Entity> {
    entity::credit_batches::Entity::find()
        .filter(entity::credit_batches::Column::CustomerId.eq(customer_id))
        .filter(entity::credit_batches::Column::CategoryId.eq(category_id))
        .filter(entity::credit_batches::Column::Status.eq(BatchStatus::Valid))
        .filter(entity::credit_batches::Column::ExpiresAt.gte(now))
        .filter(entity::credit_batches::Column::AvailableCredits.gt(0))
        .order_by_asc(entity::credit_batches::Column::ExpiresAt)
        .order_by_asc(entity::credit_batches::Column::Id)
}

/// Greedy front-first draw plan over `(batch_id, available)` candidates
/// already in FEFO order. `None` when the candidates cannot cover
/// `quantity`; the caller must then leave every batch untouched.
fn plan_draws(candidates: &[(Uuid, i32)], quantity: i32) -> Option<Vec<BatchDraw>> {
    let mut remaining = quantity;
    let mut draws = Vec::new();

    for &(batch_id, available) in candidates {
        if remaining == 0 {
            break;
        }
        let amount = remaining.min(available);
        draws.push(BatchDraw { batch_id, amount });
        remaining -= amount;
    }

    if remaining > 0 {
        None
    } else {
        Some(draws)
    }
}

impl AllocationService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Consume `quantity` credits FEFO inside a caller-owned transaction.
    ///
    /// Locks the whole candidate set (SELECT ... FOR UPDATE) so two
    /// consumptions against the same batches serialize, then debits
    /// front-first, flipping a batch to `used` exactly when it reaches
    /// zero. Insufficient total leaves every batch unmutated: the error
    /// returns before any update, and the caller aborts the transaction.
    pub async fn consume_in_txn(
        txn: &DatabaseTransaction,
        customer_id: Uuid,
        category_id: Uuid,
        quantity: i32,
        now: time::OffsetDateTime,
    ) -> Result<ConsumptionBreakdown> {
        if quantity <= 0 {
            return Err(CoreError::InvalidQuantity(quantity));
        }

        let candidates = eligible_batches(customer_id, category_id, now)
            .lock_exclusive()
            .all(txn)
            .await?;

        let plan: Vec<(Uuid, i32)> = candidates
            .iter()
            .map(|b| (b.id, b.available_credits))
            .collect();

        let draws = match plan_draws(&plan, quantity) {
            Some(draws) => draws,
            None => {
                let available = plan.iter().map(|(_, a)| a).sum();
                return Err(CoreError::InsufficientCredits {
                    needed: quantity,
                    available,
                });
            }
        };

        for (batch, draw) in candidates.into_iter().zip(draws.iter()) {
            let new_available = batch.available_credits - draw.amount;
            let new_used = batch.used_credits + draw.amount;

            let mut active: entity::credit_batches::ActiveModel = batch.into();
            active.available_credits = Set(new_available);
            active.used_credits = Set(new_used);
            if new_available == 0 {
                active.status = Set(BatchStatus::Used);
            }
            active.update(txn).await?;
        }

        Ok(ConsumptionBreakdown {
            total: quantity,
            draws,
        })
    }

    /// Consume `quantity` credits FEFO in a transaction of its own.
    #[instrument(skip(self))]
    pub async fn consume(
        &self,
        customer_id: Uuid,
        category_id: Uuid,
        quantity: i32,
    ) -> Result<ConsumptionBreakdown> {
        let now = time::OffsetDateTime::now_utc();
        let txn = self.db.begin().await?;

        match Self::consume_in_txn(&txn, customer_id, category_id, quantity, now).await {
            Ok(breakdown) => {
                txn.commit().await?;
                info!(
                    "Consumed {} credits for customer {} across {} batches",
                    quantity,
                    customer_id,
                    breakdown.draws.len()
                );
                Ok(breakdown)
            }
            Err(err) => {
                txn.rollback().await?;
                Err(err)
            }
        }
    }

    /// Pure read: can `quantity` credits be covered right now? Uses the
    /// same eligibility predicate as `consume`, without locks.
    #[instrument(skip(self))]
    pub async fn check_availability(
        &self,
        customer_id: Uuid,
        category_id: Uuid,
        quantity: i32,
    ) -> Result<bool> {
        if quantity <= 0 {
            return Err(CoreError::InvalidQuantity(quantity));
        }

        let now = time::OffsetDateTime::now_utc();
        let total: Option<i64> = eligible_batches(customer_id, category_id, now)
            .select_only()
            .column_as(
                entity::credit_batches::Column::AvailableCredits.sum(),
                "available",
            )
            .into_tuple()
            .one(&self.db)
            .await?
            .flatten();

        Ok(total.unwrap_or(0) >= quantity as i64)
    }

    /// Reverse a specific past consumption. Unsupported: a consumption
    /// may have drained several batches and no per-consumption trail is
    /// stored, so the debited batches cannot be reconstructed. Booking
    /// cancellation is the one supported reversal: each booking records
    /// the single batch it debited.
    #[instrument(skip(self))]
    pub async fn revert(
        &self,
        _customer_id: Uuid,
        _category_id: Uuid,
        _quantity: i32,
        _ref_id: Uuid,
    ) -> Result<()> {
        Err(CoreError::ReversalRequiresLedger)
    }
}
