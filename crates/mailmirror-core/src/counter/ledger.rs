//! Incremental maintenance of per-label unread counters.

use sqlx::{Row, SqliteConnection};

use super::model::ConversationCount;
use crate::entity::EntityStore;
use crate::label::{LabelId, Location, UserId};
use crate::Result;

/// Applies bounded deltas to `ConversationCount.unread`, clamped at zero.
///
/// Adjustments run inside the caller's transaction so counter movement and
/// the entity writes that caused it commit together. Drafts and Sent track
/// message counts, not conversation counts, and are never touched here.
#[derive(Debug, Clone)]
pub struct CounterLedger {
    user_id: UserId,
}

impl CounterLedger {
    /// Create a ledger scoped to one user.
    #[must_use]
    pub const fn new(user_id: UserId) -> Self {
        Self { user_id }
    }

    /// Apply a delta to the unread counter of a label.
    ///
    /// The resulting value is clamped at zero; a label that has never been
    /// counted starts at zero. Drafts and Sent are skipped.
    pub(crate) async fn adjust(
        &self,
        conn: &mut SqliteConnection,
        label_id: &LabelId,
        delta: i64,
    ) -> Result<()> {
        if matches!(
            Location::from_label(label_id),
            Some(Location::Drafts | Location::Sent)
        ) {
            return Ok(());
        }

        sqlx::query(
            r"
            INSERT INTO conversation_counts (user_id, label_id, total, unread)
            VALUES (?1, ?2, 0, MAX(0, ?3))
            ON CONFLICT(user_id, label_id) DO UPDATE SET
                unread = MAX(0, conversation_counts.unread + ?3)
            ",
        )
        .bind(self.user_id.as_str())
        .bind(label_id.as_str())
        .bind(delta)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Read the counters for a label, zeros when never touched.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn count(
        &self,
        store: &EntityStore,
        label_id: &LabelId,
    ) -> Result<ConversationCount> {
        let row = sqlx::query(
            r"
            SELECT total, unread FROM conversation_counts
            WHERE user_id = ? AND label_id = ?
            ",
        )
        .bind(self.user_id.as_str())
        .bind(label_id.as_str())
        .fetch_optional(store.pool())
        .await?;

        Ok(row.map_or_else(
            || ConversationCount {
                user_id: self.user_id.clone(),
                label_id: label_id.clone(),
                total: 0,
                unread: 0,
            },
            |r| ConversationCount {
                user_id: self.user_id.clone(),
                label_id: label_id.clone(),
                total: r.get("total"),
                unread: r.get("unread"),
            },
        ))
    }

    /// Overwrite the counters for a label. Used by the sync/ingestion
    /// layer when the server reports authoritative values.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn seed(
        &self,
        store: &EntityStore,
        label_id: &LabelId,
        total: i64,
        unread: i64,
    ) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO conversation_counts (user_id, label_id, total, unread)
            VALUES (?, ?, ?, MAX(0, ?))
            ON CONFLICT(user_id, label_id) DO UPDATE SET
                total = excluded.total,
                unread = excluded.unread
            ",
        )
        .bind(self.user_id.as_str())
        .bind(label_id.as_str())
        .bind(total)
        .bind(unread)
        .execute(store.pool())
        .await?;

        Ok(())
    }
}
