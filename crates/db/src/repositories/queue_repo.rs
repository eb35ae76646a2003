//! Repository for the `comparison_queue` dispatch table.

use archdiffer_core::comparison::JobMessage;
use archdiffer_core::types::DbId;
use sqlx::types::Json;
use sqlx::PgPool;

/// A leased queue row.
#[derive(Debug, sqlx::FromRow)]
pub struct QueueRow {
    pub id: DbId,
    pub payload: Json<JobMessage>,
    pub attempts: i32,
}

pub struct QueueRepo;

impl QueueRepo {
    /// Append a message. Visible to `lease` immediately.
    pub async fn push(pool: &PgPool, message: &JobMessage) -> Result<DbId, sqlx::Error> {
        sqlx::query_scalar::<_, DbId>(
            "INSERT INTO comparison_queue (comparison_id, payload) VALUES ($1, $2) RETURNING id",
        )
        .bind(message.comparison_id)
        .bind(Json(message))
        .fetch_one(pool)
        .await
    }

    /// Lease the oldest visible message for `lease_secs`.
    ///
    /// Uses `FOR UPDATE SKIP LOCKED` so concurrent consumers never lease
    /// the same row at once. The row becomes visible again when the lease
    /// runs out unless it is acknowledged first.
    pub async fn lease(pool: &PgPool, lease_secs: f64) -> Result<Option<QueueRow>, sqlx::Error> {
        sqlx::query_as::<_, QueueRow>(
            "UPDATE comparison_queue \
             SET available_at = NOW() + make_interval(secs => $1), attempts = attempts + 1 \
             WHERE id = ( \
                 SELECT id FROM comparison_queue \
                 WHERE available_at <= NOW() \
                 ORDER BY id \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING id, payload, attempts",
        )
        .bind(lease_secs)
        .fetch_optional(pool)
        .await
    }

    /// Delete an acknowledged message. Returns `false` if it was already gone.
    pub async fn ack(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let deleted = sqlx::query("DELETE FROM comparison_queue WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(deleted.rows_affected() > 0)
    }

    /// The subset of `comparison_ids` with at least one stored message,
    /// leased or not.
    pub async fn queued_among(
        pool: &PgPool,
        comparison_ids: &[DbId],
    ) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar::<_, DbId>(
            "SELECT DISTINCT comparison_id FROM comparison_queue WHERE comparison_id = ANY($1)",
        )
        .bind(comparison_ids)
        .fetch_all(pool)
        .await
    }

    /// Number of messages currently stored, leased or not.
    pub async fn depth(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM comparison_queue")
            .fetch_one(pool)
            .await
    }
}
