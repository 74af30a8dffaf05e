use sea_orm::DbErr;

/// Engine-level error taxonomy. Every business failure is a distinct
/// variant with a stable machine-readable code, so calling layers can
/// branch on `code()` instead of parsing display strings.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(i32),

    #[error("Insufficient credits: needed {needed}, available {available}")]
    InsufficientCredits { needed: i32, available: i32 },

    #[error("Batch has usage: {used} credits already consumed")]
    BatchHasUsage { used: i32 },

    #[error("Seat {seat_number} is already taken for session {session_id}")]
    SeatConflict {
        session_id: uuid::Uuid,
        seat_number: i32,
    },

    #[error("Customer already has an active booking for session {session_id}")]
    AlreadyBooked { session_id: uuid::Uuid },

    #[error("Customer is already queued for session {session_id}")]
    AlreadyQueued { session_id: uuid::Uuid },

    #[error("Customer is not queued for session {session_id}")]
    NotQueued { session_id: uuid::Uuid },

    #[error("Cancellation window closed at {cutoff}")]
    CancellationWindowClosed { cutoff: time::OffsetDateTime },

    #[error("Reversal requires a per-consumption ledger trail")]
    ReversalRequiresLedger,

    #[error("Transaction {0} already recorded")]
    DuplicateTransaction(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Concurrent update conflict, retries exhausted")]
    Concurrency,

    #[error("Internal error")]
    Internal(#[from] anyhow::Error),
}

impl CoreError {
    /// Stable identifier for each failure kind.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Database(_) => "DATABASE_ERROR",
            CoreError::InvalidQuantity(_) => "INVALID_QUANTITY",
            CoreError::InsufficientCredits { .. } => "INSUFFICIENT_CREDITS",
            CoreError::BatchHasUsage { .. } => "BATCH_HAS_USAGE",
            CoreError::SeatConflict { .. } => "SEAT_CONFLICT",
            CoreError::AlreadyBooked { .. } => "ALREADY_BOOKED",
            CoreError::AlreadyQueued { .. } => "ALREADY_QUEUED",
            CoreError::NotQueued { .. } => "NOT_QUEUED",
            CoreError::CancellationWindowClosed { .. } => "CANCELLATION_WINDOW_CLOSED",
            CoreError::ReversalRequiresLedger => "REVERSAL_REQUIRES_LEDGER",
            CoreError::DuplicateTransaction(_) => "DUPLICATE_TRANSACTION",
            CoreError::NotFound(_) => "NOT_FOUND",
            CoreError::Concurrency => "CONCURRENCY",
            CoreError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Detect a unique-constraint violation (PostgreSQL SQLSTATE 23505).
/// The SQLSTATE is matched first; message substrings cover drivers that
/// do not surface the code.
pub fn is_unique_violation(err: &DbErr) -> bool {
    if let Some(code) = sql_state(err) {
        return code == "23505";
    }
    let msg = err.to_string().to_lowercase();
    msg.contains("unique") || msg.contains("duplicate")
}

/// Detect lock contention the transaction layer may retry: serialization
/// failure (40001), deadlock (40P01), lock-not-available (55P03).
pub fn is_lock_contention(err: &DbErr) -> bool {
    if let Some(code) = sql_state(err) {
        return matches!(code.as_str(), "40001" | "40P01" | "55P03");
    }
    let msg = err.to_string().to_lowercase();
    msg.contains("deadlock") || msg.contains("could not serialize") || msg.contains("lock timeout")
}

fn sql_state(err: &DbErr) -> Option<String> {
    match err {
        DbErr::Exec(sea_orm::RuntimeErr::SqlxError(e))
        | DbErr::Query(sea_orm::RuntimeErr::SqlxError(e)) => e
            .as_database_error()
            .and_then(|dbe| dbe.code())
            .map(|c| c.to_string()),
        _ => None,
    }
}

// Helper type for results
pub type Result<T> = std::result::Result<T, CoreError>;
