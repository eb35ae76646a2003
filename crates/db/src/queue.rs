//! The durable work queue between the Task Dispatcher and the Worker Pool.
//!
//! Delivery is at-least-once: a popped message is leased, not removed. It is
//! removed by [`TaskQueue::ack`] and becomes visible again if the lease runs
//! out first. Consumers must therefore tolerate duplicates.

use std::collections::HashSet;
use std::time::Duration;

use archdiffer_core::comparison::JobMessage;
use archdiffer_core::types::DbId;
use async_trait::async_trait;

use crate::repositories::QueueRepo;
use crate::DbPool;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Queue unavailable: {0}")]
    Unavailable(String),

    #[error("Queue database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// A leased message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Handle for [`TaskQueue::ack`].
    pub delivery_id: DbId,
    pub message: JobMessage,
    /// 1 on first delivery, incremented on every redelivery.
    pub attempt: u32,
}

#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Append `message`. Returns once it is durably stored.
    async fn push(&self, message: &JobMessage) -> Result<(), QueueError>;

    /// Lease the next visible message for `lease`, or `None` when empty.
    async fn pop(&self, lease: Duration) -> Result<Option<Delivery>, QueueError>;

    /// Remove a delivered message for good.
    async fn ack(&self, delivery_id: DbId) -> Result<(), QueueError>;

    /// Which of `comparison_ids` still have a message stored, leased or not.
    async fn queued(&self, comparison_ids: &[DbId]) -> Result<HashSet<DbId>, QueueError>;
}

/// [`TaskQueue`] over the `comparison_queue` table.
#[derive(Clone)]
pub struct PgTaskQueue {
    pool: DbPool,
}

impl PgTaskQueue {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskQueue for PgTaskQueue {
    async fn push(&self, message: &JobMessage) -> Result<(), QueueError> {
        let id = QueueRepo::push(&self.pool, message).await?;
        tracing::debug!(queue_id = id, comparison_id = message.comparison_id, "Message enqueued");
        Ok(())
    }

    async fn pop(&self, lease: Duration) -> Result<Option<Delivery>, QueueError> {
        let Some(row) = QueueRepo::lease(&self.pool, lease.as_secs_f64()).await? else {
            return Ok(None);
        };
        Ok(Some(Delivery {
            delivery_id: row.id,
            message: row.payload.0,
            attempt: u32::try_from(row.attempts).unwrap_or(u32::MAX),
        }))
    }

    async fn ack(&self, delivery_id: DbId) -> Result<(), QueueError> {
        if !QueueRepo::ack(&self.pool, delivery_id).await? {
            tracing::debug!(queue_id = delivery_id, "Ack for a message that is already gone");
        }
        Ok(())
    }

    async fn queued(&self, comparison_ids: &[DbId]) -> Result<HashSet<DbId>, QueueError> {
        if comparison_ids.is_empty() {
            return Ok(HashSet::new());
        }
        let ids = QueueRepo::queued_among(&self.pool, comparison_ids).await?;
        Ok(ids.into_iter().collect())
    }
}
