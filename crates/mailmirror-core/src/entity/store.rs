//! SQLite-backed entity store for the local mirror.
//!
//! All mutation paths go through one write connection; a mutation opens a
//! scoped transaction with [`EntityStore::begin`] and composes the helpers
//! in [`tx`] inside it, so counter adjustments and entity writes for one
//! logical mutation land atomically.

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};

use super::model::{Conversation, ContextLabel, Message};
use crate::label::{ConversationId, LabelId, UserId};
use crate::Result;

/// Transactional store holding conversations, messages, per-label context
/// and counters.
#[derive(Clone)]
pub struct EntityStore {
    pool: SqlitePool,
}

impl EntityStore {
    /// Open (or create) the store at the given database path.
    ///
    /// The pool holds a single connection: local mutations serialize
    /// through one writer.
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

        let store = Self { pool };
        store.initialize().await?;
        Ok(store)
    }

    /// Create an in-memory store for testing.
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

        let store = Self { pool };
        store.initialize().await?;
        Ok(store)
    }

    /// Initialize database schema.
    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS conversations (
                conversation_id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                subject TEXT NOT NULL DEFAULT '',
                num_messages INTEGER NOT NULL DEFAULT 0,
                display_order INTEGER NOT NULL DEFAULT 0,
                is_soft_deleted INTEGER NOT NULL DEFAULT 0
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS context_labels (
                conversation_id TEXT NOT NULL,
                label_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                unread_count INTEGER NOT NULL DEFAULT 0,
                message_count INTEGER NOT NULL DEFAULT 0,
                time TEXT NOT NULL,
                display_order INTEGER NOT NULL DEFAULT 0,
                snooze_time TEXT,
                PRIMARY KEY (conversation_id, label_id)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS messages (
                message_id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                unread INTEGER NOT NULL DEFAULT 0,
                time TEXT NOT NULL,
                snooze_time TEXT
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS message_labels (
                message_id TEXT NOT NULL,
                label_id TEXT NOT NULL,
                PRIMARY KEY (message_id, label_id)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS conversation_counts (
                user_id TEXT NOT NULL,
                label_id TEXT NOT NULL,
                total INTEGER NOT NULL DEFAULT 0,
                unread INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (user_id, label_id)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_context_labels_label
            ON context_labels(label_id)
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id)
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_message_labels_label
            ON message_labels(label_id)
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Begin a scoped write transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be acquired.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    pub(crate) const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert a conversation row. Used by the sync/ingestion layer.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn insert_conversation(&self, conversation: &Conversation) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO conversations
                (conversation_id, user_id, subject, num_messages, display_order, is_soft_deleted)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(conversation_id) DO UPDATE SET
                subject = excluded.subject,
                num_messages = excluded.num_messages,
                display_order = excluded.display_order,
                is_soft_deleted = excluded.is_soft_deleted
            ",
        )
        .bind(conversation.conversation_id.as_str())
        .bind(conversation.user_id.as_str())
        .bind(&conversation.subject)
        .bind(conversation.num_messages)
        .bind(conversation.display_order)
        .bind(conversation.is_soft_deleted)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert a message row along with its label memberships. Used by the
    /// sync/ingestion layer.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn insert_message(&self, message: &Message) -> Result<()> {
        let mut txn = self.begin().await?;
        sqlx::query(
            r"
            INSERT INTO messages
                (message_id, conversation_id, user_id, unread, time, snooze_time)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(message_id) DO UPDATE SET
                unread = excluded.unread,
                time = excluded.time,
                snooze_time = excluded.snooze_time
            ",
        )
        .bind(message.message_id.as_str())
        .bind(message.conversation_id.as_str())
        .bind(message.user_id.as_str())
        .bind(message.unread)
        .bind(message.time.to_rfc3339())
        .bind(message.snooze_time.map(|t| t.to_rfc3339()))
        .execute(&mut *txn)
        .await?;

        for label in &message.labels {
            sqlx::query(
                r"
                INSERT OR IGNORE INTO message_labels (message_id, label_id)
                VALUES (?, ?)
                ",
            )
            .bind(message.message_id.as_str())
            .bind(label.as_str())
            .execute(&mut *txn)
            .await?;
        }

        txn.commit().await?;
        Ok(())
    }

    /// Upsert a context label row. Used by the sync/ingestion layer.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn upsert_context_label(&self, context: &ContextLabel) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        tx::upsert_context_label(&mut *conn, context).await
    }

    /// Look up a conversation by identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn conversation(&self, id: &ConversationId) -> Result<Option<Conversation>> {
        let mut conn = self.pool.acquire().await?;
        tx::conversation(&mut *conn, id).await
    }

    /// All context labels of a conversation.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn context_labels(&self, id: &ConversationId) -> Result<Vec<ContextLabel>> {
        let mut conn = self.pool.acquire().await?;
        tx::context_labels(&mut *conn, id).await
    }

    /// One context label of a conversation, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn context_label(
        &self,
        id: &ConversationId,
        label_id: &LabelId,
    ) -> Result<Option<ContextLabel>> {
        let mut conn = self.pool.acquire().await?;
        tx::context_label(&mut *conn, id, label_id).await
    }

    /// Locally present messages of a conversation, labels included.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn messages(&self, id: &ConversationId) -> Result<Vec<Message>> {
        let mut conn = self.pool.acquire().await?;
        tx::messages(&mut *conn, id).await
    }

    /// Unread counter value for a label, zero when never touched.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn unread_count(&self, user_id: &UserId, label_id: &LabelId) -> Result<i64> {
        use sqlx::Row;

        let row = sqlx::query(
            r"
            SELECT unread FROM conversation_counts
            WHERE user_id = ? AND label_id = ?
            ",
        )
        .bind(user_id.as_str())
        .bind(label_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map_or(0, |r| r.get("unread")))
    }

    /// Tombstone every conversation under a label. Used by the remote
    /// cleanup sweep (e.g. after an empty-trash event); tombstoned rows
    /// stay queryable until the next purge.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn mark_soft_deleted(&self, user_id: &UserId, label_id: &LabelId) -> Result<()> {
        sqlx::query(
            r"
            UPDATE conversations SET is_soft_deleted = 1
            WHERE user_id = ?1 AND conversation_id IN (
                SELECT conversation_id FROM context_labels
                WHERE user_id = ?1 AND label_id = ?2
            )
            ",
        )
        .bind(user_id.as_str())
        .bind(label_id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Batch-delete every tombstoned conversation with its messages,
    /// label memberships and per-label views.
    ///
    /// # Errors
    ///
    /// Returns an error if the database transaction fails.
    pub async fn purge_soft_deleted(&self, user_id: &UserId) -> Result<()> {
        let mut txn = self.begin().await?;

        sqlx::query(
            r"
            DELETE FROM message_labels
            WHERE message_id IN (
                SELECT m.message_id FROM messages m
                JOIN conversations c ON c.conversation_id = m.conversation_id
                WHERE c.user_id = ? AND c.is_soft_deleted = 1
            )
            ",
        )
        .bind(user_id.as_str())
        .execute(&mut *txn)
        .await?;

        sqlx::query(
            r"
            DELETE FROM messages
            WHERE conversation_id IN (
                SELECT conversation_id FROM conversations
                WHERE user_id = ? AND is_soft_deleted = 1
            )
            ",
        )
        .bind(user_id.as_str())
        .execute(&mut *txn)
        .await?;

        sqlx::query(
            r"
            DELETE FROM context_labels
            WHERE conversation_id IN (
                SELECT conversation_id FROM conversations
                WHERE user_id = ? AND is_soft_deleted = 1
            )
            ",
        )
        .bind(user_id.as_str())
        .execute(&mut *txn)
        .await?;

        sqlx::query(r"DELETE FROM conversations WHERE user_id = ? AND is_soft_deleted = 1")
            .bind(user_id.as_str())
            .execute(&mut *txn)
            .await?;

        txn.commit().await?;
        Ok(())
    }
}

/// In-transaction query helpers composed by the mutation engine.
pub(crate) mod tx {
    use chrono::{DateTime, Utc};
    use sqlx::sqlite::SqliteRow;
    use sqlx::{Row, SqliteConnection};

    use crate::entity::model::{Conversation, ContextLabel, Message};
    use crate::label::{ConversationId, LabelId, MessageId, UserId};
    use crate::Result;

    fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }

    fn row_to_conversation(row: &SqliteRow) -> Conversation {
        Conversation {
            conversation_id: ConversationId::new(row.get::<String, _>("conversation_id")),
            user_id: UserId::new(row.get::<String, _>("user_id")),
            subject: row.get("subject"),
            num_messages: row.get("num_messages"),
            display_order: row.get("display_order"),
            is_soft_deleted: row.get("is_soft_deleted"),
        }
    }

    fn row_to_context_label(row: &SqliteRow) -> Option<ContextLabel> {
        let time = parse_time(&row.get::<String, _>("time"))?;
        let snooze_time = row
            .get::<Option<String>, _>("snooze_time")
            .and_then(|raw| parse_time(&raw));

        Some(ContextLabel {
            conversation_id: ConversationId::new(row.get::<String, _>("conversation_id")),
            label_id: LabelId::new(row.get::<String, _>("label_id")),
            user_id: UserId::new(row.get::<String, _>("user_id")),
            unread_count: row.get("unread_count"),
            message_count: row.get("message_count"),
            time,
            display_order: row.get("display_order"),
            snooze_time,
        })
    }

    pub(crate) async fn conversation(
        conn: &mut SqliteConnection,
        id: &ConversationId,
    ) -> Result<Option<Conversation>> {
        let row = sqlx::query(
            r"
            SELECT conversation_id, user_id, subject, num_messages, display_order, is_soft_deleted
            FROM conversations
            WHERE conversation_id = ?
            ",
        )
        .bind(id.as_str())
        .fetch_optional(&mut *conn)
        .await?;

        Ok(row.map(|r| row_to_conversation(&r)))
    }

    pub(crate) async fn context_labels(
        conn: &mut SqliteConnection,
        id: &ConversationId,
    ) -> Result<Vec<ContextLabel>> {
        let rows = sqlx::query(
            r"
            SELECT conversation_id, label_id, user_id, unread_count, message_count,
                   time, display_order, snooze_time
            FROM context_labels
            WHERE conversation_id = ?
            ",
        )
        .bind(id.as_str())
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows.iter().filter_map(row_to_context_label).collect())
    }

    pub(crate) async fn context_label(
        conn: &mut SqliteConnection,
        id: &ConversationId,
        label_id: &LabelId,
    ) -> Result<Option<ContextLabel>> {
        let row = sqlx::query(
            r"
            SELECT conversation_id, label_id, user_id, unread_count, message_count,
                   time, display_order, snooze_time
            FROM context_labels
            WHERE conversation_id = ? AND label_id = ?
            ",
        )
        .bind(id.as_str())
        .bind(label_id.as_str())
        .fetch_optional(&mut *conn)
        .await?;

        Ok(row.as_ref().and_then(row_to_context_label))
    }

    pub(crate) async fn upsert_context_label(
        conn: &mut SqliteConnection,
        context: &ContextLabel,
    ) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO context_labels
                (conversation_id, label_id, user_id, unread_count, message_count,
                 time, display_order, snooze_time)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(conversation_id, label_id) DO UPDATE SET
                unread_count = excluded.unread_count,
                message_count = excluded.message_count,
                time = excluded.time,
                display_order = excluded.display_order,
                snooze_time = excluded.snooze_time
            ",
        )
        .bind(context.conversation_id.as_str())
        .bind(context.label_id.as_str())
        .bind(context.user_id.as_str())
        .bind(context.unread_count)
        .bind(context.message_count)
        .bind(context.time.to_rfc3339())
        .bind(context.display_order)
        .bind(context.snooze_time.map(|t| t.to_rfc3339()))
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub(crate) async fn set_context_unread(
        conn: &mut SqliteConnection,
        id: &ConversationId,
        label_id: &LabelId,
        unread_count: i64,
    ) -> Result<()> {
        sqlx::query(
            r"
            UPDATE context_labels
            SET unread_count = ?
            WHERE conversation_id = ? AND label_id = ?
            ",
        )
        .bind(unread_count.max(0))
        .bind(id.as_str())
        .bind(label_id.as_str())
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub(crate) async fn remove_context_label(
        conn: &mut SqliteConnection,
        id: &ConversationId,
        label_id: &LabelId,
    ) -> Result<()> {
        sqlx::query(
            r"
            DELETE FROM context_labels
            WHERE conversation_id = ? AND label_id = ?
            ",
        )
        .bind(id.as_str())
        .bind(label_id.as_str())
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub(crate) async fn messages(
        conn: &mut SqliteConnection,
        id: &ConversationId,
    ) -> Result<Vec<Message>> {
        let rows = sqlx::query(
            r"
            SELECT message_id, conversation_id, user_id, unread, time, snooze_time
            FROM messages
            WHERE conversation_id = ?
            ORDER BY time ASC
            ",
        )
        .bind(id.as_str())
        .fetch_all(&mut *conn)
        .await?;

        let mut messages: Vec<Message> = rows
            .iter()
            .filter_map(|row| {
                let time = parse_time(&row.get::<String, _>("time"))?;
                let snooze_time = row
                    .get::<Option<String>, _>("snooze_time")
                    .and_then(|raw| parse_time(&raw));

                Some(Message {
                    message_id: MessageId::new(row.get::<String, _>("message_id")),
                    conversation_id: ConversationId::new(row.get::<String, _>("conversation_id")),
                    user_id: UserId::new(row.get::<String, _>("user_id")),
                    unread: row.get("unread"),
                    time,
                    snooze_time,
                    labels: Vec::new(),
                })
            })
            .collect();

        let label_rows = sqlx::query(
            r"
            SELECT ml.message_id, ml.label_id
            FROM message_labels ml
            JOIN messages m ON m.message_id = ml.message_id
            WHERE m.conversation_id = ?
            ",
        )
        .bind(id.as_str())
        .fetch_all(&mut *conn)
        .await?;

        for row in &label_rows {
            let message_id: String = row.get("message_id");
            let label_id: String = row.get("label_id");
            if let Some(message) = messages
                .iter_mut()
                .find(|m| m.message_id.as_str() == message_id)
            {
                message.labels.push(LabelId::new(label_id));
            }
        }

        Ok(messages)
    }

    pub(crate) async fn add_message_label(
        conn: &mut SqliteConnection,
        message_id: &MessageId,
        label_id: &LabelId,
    ) -> Result<()> {
        // INSERT OR IGNORE keeps at-least-once remote delivery idempotent.
        sqlx::query(
            r"
            INSERT OR IGNORE INTO message_labels (message_id, label_id)
            VALUES (?, ?)
            ",
        )
        .bind(message_id.as_str())
        .bind(label_id.as_str())
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub(crate) async fn remove_message_label(
        conn: &mut SqliteConnection,
        message_id: &MessageId,
        label_id: &LabelId,
    ) -> Result<()> {
        sqlx::query(
            r"
            DELETE FROM message_labels
            WHERE message_id = ? AND label_id = ?
            ",
        )
        .bind(message_id.as_str())
        .bind(label_id.as_str())
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub(crate) async fn set_message_unread(
        conn: &mut SqliteConnection,
        message_id: &MessageId,
        unread: bool,
    ) -> Result<()> {
        sqlx::query(
            r"
            UPDATE messages SET unread = ? WHERE message_id = ?
            ",
        )
        .bind(unread)
        .bind(message_id.as_str())
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub(crate) async fn set_snooze_time(
        conn: &mut SqliteConnection,
        id: &ConversationId,
        snooze_time: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let raw = snooze_time.map(|t| t.to_rfc3339());

        sqlx::query(
            r"
            UPDATE context_labels SET snooze_time = ? WHERE conversation_id = ?
            ",
        )
        .bind(raw.clone())
        .bind(id.as_str())
        .execute(&mut *conn)
        .await?;

        sqlx::query(
            r"
            UPDATE messages SET snooze_time = ? WHERE conversation_id = ?
            ",
        )
        .bind(raw)
        .bind(id.as_str())
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Batch-delete a conversation with its messages, label memberships
    /// and per-label views.
    pub(crate) async fn delete_conversation(
        conn: &mut SqliteConnection,
        id: &ConversationId,
    ) -> Result<()> {
        sqlx::query(
            r"
            DELETE FROM message_labels
            WHERE message_id IN (SELECT message_id FROM messages WHERE conversation_id = ?)
            ",
        )
        .bind(id.as_str())
        .execute(&mut *conn)
        .await?;

        sqlx::query(r"DELETE FROM messages WHERE conversation_id = ?")
            .bind(id.as_str())
            .execute(&mut *conn)
            .await?;

        sqlx::query(r"DELETE FROM context_labels WHERE conversation_id = ?")
            .bind(id.as_str())
            .execute(&mut *conn)
            .await?;

        sqlx::query(r"DELETE FROM conversations WHERE conversation_id = ?")
            .bind(id.as_str())
            .execute(&mut *conn)
            .await?;

        Ok(())
    }
}
