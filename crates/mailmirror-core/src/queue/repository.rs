//! Durable mutation queue storage.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use super::model::{MutationIntent, QueuedIntent};
use crate::label::UserId;
use crate::Result;

/// The queueing contract the conversation service depends on.
///
/// Delivery downstream of the queue is at-least-once; consumers must
/// tolerate duplicate delivery of the same intent.
#[async_trait]
pub trait MutationQueuePort: Send + Sync {
    /// Persist an intent, returning its queue position. Called before the
    /// local mutation is applied.
    async fn enqueue(&self, user_id: &UserId, intent: &MutationIntent) -> Result<i64>;

    /// Intents not yet confirmed, oldest first.
    async fn pending(&self, user_id: &UserId) -> Result<Vec<QueuedIntent>>;

    /// Drop a confirmed intent from the queue.
    async fn complete(&self, id: i64) -> Result<()>;
}

/// SQLite-backed FIFO queue of serialized mutation intents.
pub struct SqliteMutationQueue {
    pool: SqlitePool,
}

impl SqliteMutationQueue {
    /// Open (or create) the queue at the given database path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema
    /// creation fails.
    pub async fn new(database_path: &str) -> Result<Self> {
        let url = format!("sqlite:{database_path}?mode=rwc");
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(&url)
            .await?;

        let queue = Self { pool };
        queue.initialize().await?;
        Ok(queue)
    }

    /// Create an in-memory queue for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema
    /// creation fails.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let queue = Self { pool };
        queue.initialize().await?;
        Ok(queue)
    }

    /// Initialize database schema.
    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS mutation_queue (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                payload TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_mutation_queue_user
            ON mutation_queue(user_id, id)
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl MutationQueuePort for SqliteMutationQueue {
    async fn enqueue(&self, user_id: &UserId, intent: &MutationIntent) -> Result<i64> {
        let payload = serde_json::to_string(intent)?;

        let result = sqlx::query(
            r"
            INSERT INTO mutation_queue (user_id, kind, payload, created_at)
            VALUES (?, ?, ?, ?)
            ",
        )
        .bind(user_id.as_str())
        .bind(intent.kind())
        .bind(&payload)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn pending(&self, user_id: &UserId) -> Result<Vec<QueuedIntent>> {
        let rows = sqlx::query(
            r"
            SELECT id, payload FROM mutation_queue
            WHERE user_id = ?
            ORDER BY id ASC
            ",
        )
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut intents = Vec::with_capacity(rows.len());
        for row in &rows {
            let payload: String = row.get("payload");
            intents.push(QueuedIntent {
                id: row.get("id"),
                intent: serde_json::from_str(&payload)?,
            });
        }

        Ok(intents)
    }

    async fn complete(&self, id: i64) -> Result<()> {
        sqlx::query(r"DELETE FROM mutation_queue WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::label::{ConversationId, Location};

    fn read_intent(ids: &[&str]) -> MutationIntent {
        MutationIntent::Read {
            conversation_ids: ids.iter().copied().map(ConversationId::new).collect(),
            label_id: Location::Inbox.label_id(),
        }
    }

    #[tokio::test]
    async fn enqueue_then_pending_round_trips_fifo() {
        let queue = SqliteMutationQueue::in_memory().await.unwrap();
        let user = UserId::new("u1");

        queue.enqueue(&user, &read_intent(&["c1"])).await.unwrap();
        queue.enqueue(&user, &read_intent(&["c2"])).await.unwrap();

        let pending = queue.pending(&user).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending[0].id < pending[1].id);
        assert_eq!(pending[0].intent, read_intent(&["c1"]));
        assert_eq!(pending[1].intent, read_intent(&["c2"]));
    }

    #[tokio::test]
    async fn complete_drops_the_intent() {
        let queue = SqliteMutationQueue::in_memory().await.unwrap();
        let user = UserId::new("u1");

        queue.enqueue(&user, &read_intent(&["c1"])).await.unwrap();
        let pending = queue.pending(&user).await.unwrap();
        queue.complete(pending[0].id).await.unwrap();

        assert!(queue.pending(&user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn queues_are_per_user() {
        let queue = SqliteMutationQueue::in_memory().await.unwrap();

        queue
            .enqueue(&UserId::new("u1"), &read_intent(&["c1"]))
            .await
            .unwrap();

        assert!(queue.pending(&UserId::new("u2")).await.unwrap().is_empty());
    }
}
