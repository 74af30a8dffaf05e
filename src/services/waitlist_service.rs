use crate::error::{is_unique_violation, CoreError, Result};
use sea_orm::{entity::*, query::*, DatabaseConnection, DatabaseTransaction, TransactionTrait};
use tracing::{info, instrument};
use uuid::Uuid;

/// Ordered, gap-free waiting queue per session. Positions are 1-based
/// and contiguous; removal renumbers the tail inside the same
/// transaction, so no reader ever observes a gapped queue.
pub struct WaitlistService {
    db: DatabaseConnection,
}

// Two enqueues racing on an empty queue have no rows to lock and only
// collide on the unique (session, position) index.
const ENQUEUE_RETRIES: u32 = 3;

impl WaitlistService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Append the customer at the back of the session's queue and
    /// return the assigned position.
    #[instrument(skip(self))]
    pub async fn enqueue(&self, session_id: Uuid, customer_id: Uuid) -> Result<i32> {
        let mut attempts = 0;
        loop {
            match self.try_enqueue(session_id, customer_id).await {
                Err(CoreError::Database(e)) if is_unique_violation(&e) => {
                    // (session, customer) collisions surface as AlreadyQueued
                    // inside try_enqueue; reaching here means a position race.
                    attempts += 1;
                    if attempts >= ENQUEUE_RETRIES {
                        return Err(CoreError::Concurrency);
                    }
                }
                other => return other,
            }
        }
    }

    async fn try_enqueue(&self, session_id: Uuid, customer_id: Uuid) -> Result<i32> {
        let txn = self.db.begin().await?;

        // Lock the session's entries; competing appends serialize here.
        let entries = entity::waiting_entries::Entity::find()
            .filter(entity::waiting_entries::Column::SessionId.eq(session_id))
            .order_by_asc(entity::waiting_entries::Column::Position)
            .lock_exclusive()
            .all(&txn)
            .await?;

        if entries.iter().any(|e| e.customer_id == customer_id) {
            txn.rollback().await?;
            return Err(CoreError::AlreadyQueued { session_id });
        }

        let position = entries.last().map(|e| e.position).unwrap_or(0) + 1;

        let new_entry = entity::waiting_entries::ActiveModel {
            id: Set(Uuid::now_v7()),
            session_id: Set(session_id),
            customer_id: Set(customer_id),
            position: Set(position),
            created_at: Set(time::OffsetDateTime::now_utc()),
        };
        new_entry.insert(&txn).await?;

        txn.commit().await?;

        info!(
            "Queued customer {} for session {} at position {}",
            customer_id, session_id, position
        );
        Ok(position)
    }

    /// Remove an entry and close the gap inside a caller-owned
    /// transaction: every higher entry shifts down one position.
    ///
    /// The tail is locked and renumbered in ascending order: each move
    /// lands on the position just vacated, which keeps the unique
    /// (session, position) index satisfied at every step.
    pub async fn dequeue_in_txn(txn: &DatabaseTransaction, entry_id: Uuid) -> Result<()> {
        let entry = entity::waiting_entries::Entity::find_by_id(entry_id)
            .lock_exclusive()
            .one(txn)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("waiting entry {entry_id}")))?;

        let session_id = entry.session_id;
        let removed_position = entry.position;

        entity::waiting_entries::Entity::delete_by_id(entry_id)
            .exec(txn)
            .await?;

        let tail = entity::waiting_entries::Entity::find()
            .filter(entity::waiting_entries::Column::SessionId.eq(session_id))
            .filter(entity::waiting_entries::Column::Position.gt(removed_position))
            .order_by_asc(entity::waiting_entries::Column::Position)
            .lock_exclusive()
            .all(txn)
            .await?;

        for behind in tail {
            let position = behind.position;
            let mut active: entity::waiting_entries::ActiveModel = behind.into();
            active.position = Set(position - 1);
            active.update(txn).await?;
        }

        Ok(())
    }

    /// Remove an entry in a transaction of its own.
    #[instrument(skip(self))]
    pub async fn dequeue(&self, entry_id: Uuid) -> Result<()> {
        let txn = self.db.begin().await?;

        match Self::dequeue_in_txn(&txn, entry_id).await {
            Ok(()) => {
                txn.commit().await?;
                info!("Dequeued waiting entry {}", entry_id);
                Ok(())
            }
            Err(err) => {
                txn.rollback().await?;
                Err(err)
            }
        }
    }

    /// Explicit withdrawal: drop the customer's entry for a session.
    #[instrument(skip(self))]
    pub async fn withdraw(&self, session_id: Uuid, customer_id: Uuid) -> Result<()> {
        let entry = self.entry_for(session_id, customer_id).await?;

        match entry {
            Some(entry) => self.dequeue(entry.id).await,
            None => Err(CoreError::NotQueued { session_id }),
        }
    }

    /// Front of the queue (position 1), if anyone is waiting.
    pub async fn peek_front(
        &self,
        session_id: Uuid,
    ) -> Result<Option<entity::waiting_entries::Model>> {
        let entry = entity::waiting_entries::Entity::find()
            .filter(entity::waiting_entries::Column::SessionId.eq(session_id))
            .order_by_asc(entity::waiting_entries::Column::Position)
            .one(&self.db)
            .await?;
        Ok(entry)
    }

    /// Full queue for a session, front-first.
    pub async fn entries(&self, session_id: Uuid) -> Result<Vec<entity::waiting_entries::Model>> {
        let entries = entity::waiting_entries::Entity::find()
            .filter(entity::waiting_entries::Column::SessionId.eq(session_id))
            .order_by_asc(entity::waiting_entries::Column::Position)
            .all(&self.db)
            .await?;
        Ok(entries)
    }

    /// The customer's entry for a session, if queued.
    pub async fn entry_for(
        &self,
        session_id: Uuid,
        customer_id: Uuid,
    ) -> Result<Option<entity::waiting_entries::Model>> {
        let entry = entity::waiting_entries::Entity::find()
            .filter(entity::waiting_entries::Column::SessionId.eq(session_id))
            .filter(entity::waiting_entries::Column::CustomerId.eq(customer_id))
            .one(&self.db)
            .await?;
        Ok(entry)
    }
}
