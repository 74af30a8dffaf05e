use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;

/// What the engine needs to know about a scheduled session. Supplied by
/// the class-schedule system, which owns session CRUD and policy.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub session_id: Uuid,
    /// Product category whose credits pay for this session.
    pub category_id: Uuid,
    pub starts_at: time::OffsetDateTime,
    /// Cancellation stays open until `starts_at - cancellation_window`.
    pub cancellation_window: time::Duration,
}

/// Lookup seam to the external session registry.
#[async_trait]
pub trait SessionDirectory: Send + Sync {
    async fn session_info(&self, session_id: Uuid) -> Result<Option<SessionInfo>>;
}
