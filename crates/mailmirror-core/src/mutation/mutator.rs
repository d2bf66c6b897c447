//! The optimistic local-update engine.
//!
//! Applies a single logical mutation transactionally across a
//! conversation, its locally present messages and the per-label counters.
//! No network I/O happens here; the remote roundtrip is coordinated
//! separately and may confirm (or contradict) the local state later.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::counter::CounterLedger;
use crate::entity::{tx, ContextLabel, Conversation, EntityStore, Message};
use crate::label::{ConversationId, LabelId, Location, MessageId};
use crate::service::NotificationPort;
use crate::session::SessionContext;
use crate::Result;

/// Applies mutations to the local mirror, one atomic transaction per call.
///
/// The unread counting unit is the conversation: a mutation moves any
/// label's counter by at most one per conversation, regardless of how many
/// messages it touches. Message-level unread flags are synchronized as a
/// cosmetic detail.
pub struct LocalConversationMutator {
    store: EntityStore,
    ledger: CounterLedger,
    notifications: Arc<dyn NotificationPort>,
}

impl LocalConversationMutator {
    /// Create a mutator over the given store for one user session.
    #[must_use]
    pub fn new(
        store: EntityStore,
        session: &SessionContext,
        notifications: Arc<dyn NotificationPort>,
    ) -> Self {
        let ledger = CounterLedger::new(session.user_id.clone());
        Self {
            store,
            ledger,
            notifications,
        }
    }

    /// The ledger this mutator adjusts, for read-side queries.
    #[must_use]
    pub const fn ledger(&self) -> &CounterLedger {
        &self.ledger
    }

    /// Mark conversations read or unread under a label.
    ///
    /// Only conversations whose per-label unread state actually changes
    /// are touched; each moves the label's counter by exactly one.
    /// Messages bearing the label have their unread flag synchronized.
    ///
    /// # Errors
    ///
    /// Returns an error if the store transaction fails; nothing partial
    /// is retained.
    pub async fn mark(
        &self,
        conversation_ids: &[ConversationId],
        label_id: &LabelId,
        unread: bool,
    ) -> Result<()> {
        let mut txn = self.store.begin().await?;
        let mut read_messages = Vec::new();

        for id in conversation_ids {
            self.mark_one(&mut *txn, id, label_id, unread, &mut read_messages)
                .await?;
        }

        txn.commit().await?;
        self.cancel_notifications(&read_messages);
        tracing::debug!(
            conversations = conversation_ids.len(),
            label = %label_id,
            unread,
            "applied read-state change"
        );
        Ok(())
    }

    /// Apply a tag label to conversations and their messages.
    ///
    /// # Errors
    ///
    /// Returns an error if the store transaction fails.
    pub async fn apply_label(
        &self,
        conversation_ids: &[ConversationId],
        label_id: &LabelId,
    ) -> Result<()> {
        let mut txn = self.store.begin().await?;

        for id in conversation_ids {
            self.apply_label_one(&mut *txn, id, label_id).await?;
        }

        txn.commit().await?;
        tracing::debug!(conversations = conversation_ids.len(), label = %label_id, "applied label");
        Ok(())
    }

    /// Remove a tag label from conversations and their messages.
    ///
    /// # Errors
    ///
    /// Returns an error if the store transaction fails.
    pub async fn remove_label(
        &self,
        conversation_ids: &[ConversationId],
        label_id: &LabelId,
    ) -> Result<()> {
        let mut txn = self.store.begin().await?;

        for id in conversation_ids {
            self.remove_label_one(&mut *txn, id, label_id).await?;
        }

        txn.commit().await?;
        tracing::debug!(conversations = conversation_ids.len(), label = %label_id, "removed label");
        Ok(())
    }

    /// Reassign conversations from one folder to another.
    ///
    /// # Errors
    ///
    /// Returns an error if the store transaction fails.
    pub async fn move_to_folder(
        &self,
        conversation_ids: &[ConversationId],
        from_label: &LabelId,
        to_label: &LabelId,
    ) -> Result<()> {
        let mut txn = self.store.begin().await?;
        let mut read_messages = Vec::new();

        for id in conversation_ids {
            self.move_one(&mut *txn, id, from_label, to_label, &mut read_messages)
                .await?;
        }

        txn.commit().await?;
        self.cancel_notifications(&read_messages);
        tracing::debug!(
            conversations = conversation_ids.len(),
            from = %from_label,
            to = %to_label,
            "applied folder reassignment"
        );
        Ok(())
    }

    /// Permanently delete conversations, counting them as read first so no
    /// phantom unread count survives.
    ///
    /// # Errors
    ///
    /// Returns an error if the store transaction fails.
    pub async fn delete(
        &self,
        conversation_ids: &[ConversationId],
        label_id: &LabelId,
    ) -> Result<()> {
        let mut txn = self.store.begin().await?;

        for id in conversation_ids {
            if let Some(context) = tx::context_label(&mut *txn, id, label_id).await? {
                if context.is_unread() {
                    self.ledger.adjust(&mut *txn, label_id, -1).await?;
                }
            }
            tx::delete_conversation(&mut *txn, id).await?;
        }

        txn.commit().await?;
        tracing::debug!(conversations = conversation_ids.len(), label = %label_id, "deleted");
        Ok(())
    }

    /// Hide conversations until the given instant.
    ///
    /// Snoozing is a folder move Inbox → Snoozed followed by stamping the
    /// snooze time on the per-label views and messages, in one
    /// transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the store transaction fails.
    pub async fn snooze(
        &self,
        conversation_ids: &[ConversationId],
        until: DateTime<Utc>,
    ) -> Result<()> {
        let inbox = Location::Inbox.label_id();
        let snoozed = Location::Snoozed.label_id();
        let mut txn = self.store.begin().await?;
        let mut read_messages = Vec::new();

        for id in conversation_ids {
            self.move_one(&mut *txn, id, &inbox, &snoozed, &mut read_messages)
                .await?;
            tx::set_snooze_time(&mut *txn, id, Some(until)).await?;
        }

        txn.commit().await?;
        tracing::debug!(conversations = conversation_ids.len(), until = %until, "snoozed");
        Ok(())
    }

    /// Bring snoozed conversations back to the inbox and clear their
    /// snooze time.
    ///
    /// # Errors
    ///
    /// Returns an error if the store transaction fails.
    pub async fn unsnooze(&self, conversation_ids: &[ConversationId]) -> Result<()> {
        let inbox = Location::Inbox.label_id();
        let snoozed = Location::Snoozed.label_id();
        let mut txn = self.store.begin().await?;
        let mut read_messages = Vec::new();

        for id in conversation_ids {
            self.move_one(&mut *txn, id, &snoozed, &inbox, &mut read_messages)
                .await?;
            tx::set_snooze_time(&mut *txn, id, None).await?;
        }

        txn.commit().await?;
        tracing::debug!(conversations = conversation_ids.len(), "unsnoozed");
        Ok(())
    }

    fn cancel_notifications(&self, message_ids: &[MessageId]) {
        if !message_ids.is_empty() {
            self.notifications.cancel_for_messages(message_ids);
        }
    }

    async fn mark_one(
        &self,
        conn: &mut SqliteConnection,
        id: &ConversationId,
        label_id: &LabelId,
        unread: bool,
        read_messages: &mut Vec<MessageId>,
    ) -> Result<()> {
        let Some(context) = tx::context_label(&mut *conn, id, label_id).await? else {
            return Ok(());
        };

        if context.is_unread() == unread {
            return Ok(());
        }

        tx::set_context_unread(&mut *conn, id, label_id, i64::from(unread)).await?;
        self.ledger
            .adjust(&mut *conn, label_id, if unread { 1 } else { -1 })
            .await?;

        let messages = tx::messages(&mut *conn, id).await?;
        for message in messages
            .iter()
            .filter(|m| m.has_label(label_id) && m.unread != unread)
        {
            tx::set_message_unread(&mut *conn, &message.message_id, unread).await?;
            if !unread {
                read_messages.push(message.message_id.clone());
            }
        }

        Ok(())
    }

    async fn apply_label_one(
        &self,
        conn: &mut SqliteConnection,
        id: &ConversationId,
        label_id: &LabelId,
    ) -> Result<()> {
        let Some(conversation) = tx::conversation(&mut *conn, id).await? else {
            return Ok(());
        };
        let messages = tx::messages(&mut *conn, id).await?;

        if tx::context_label(&mut *conn, id, label_id).await?.is_none() {
            let was_unread = self.unread_under(&mut *conn, id, label_id).await?;
            let mut context = new_context_label(&conversation, label_id, &messages);
            if context.unread_count == 0 && was_unread {
                context.unread_count = 1;
            }
            tx::upsert_context_label(&mut *conn, &context).await?;
            if was_unread {
                self.ledger.adjust(&mut *conn, label_id, 1).await?;
            }
        }

        for message in &messages {
            tx::add_message_label(&mut *conn, &message.message_id, label_id).await?;
        }

        Ok(())
    }

    async fn remove_label_one(
        &self,
        conn: &mut SqliteConnection,
        id: &ConversationId,
        label_id: &LabelId,
    ) -> Result<()> {
        if let Some(context) = tx::context_label(&mut *conn, id, label_id).await? {
            tx::remove_context_label(&mut *conn, id, label_id).await?;
            if context.is_unread() {
                self.ledger.adjust(&mut *conn, label_id, -1).await?;
            }
        }

        let messages = tx::messages(&mut *conn, id).await?;
        for message in messages.iter().filter(|m| m.has_label(label_id)) {
            tx::remove_message_label(&mut *conn, &message.message_id, label_id).await?;
        }

        Ok(())
    }

    async fn move_one(
        &self,
        conn: &mut SqliteConnection,
        id: &ConversationId,
        from_label: &LabelId,
        to_label: &LabelId,
        read_messages: &mut Vec<MessageId>,
    ) -> Result<()> {
        let Some(conversation) = tx::conversation(&mut *conn, id).await? else {
            return Ok(());
        };
        let contexts = tx::context_labels(&mut *conn, id).await?;
        let messages = tx::messages(&mut *conn, id).await?;

        let scheduled = Location::Scheduled.label_id();
        if Location::from_label(to_label) == Some(Location::Trash)
            && contexts.iter().any(|c| c.label_id == scheduled)
        {
            return self
                .trash_scheduled(conn, &conversation, &contexts, &messages, read_messages)
                .await;
        }

        let was_unread = conversation_unread(&contexts, &messages);

        // Labels whose counter already moved in this call; each stripped
        // label is decremented at most once.
        let mut accounted: HashSet<LabelId> = HashSet::new();
        let mut stripped: Vec<LabelId> = Vec::new();

        for context in &contexts {
            if context.label_id == *to_label || !should_strip(&context.label_id, from_label) {
                continue;
            }
            if context.is_unread() && accounted.insert(context.label_id.clone()) {
                self.ledger.adjust(&mut *conn, &context.label_id, -1).await?;
            }
            tx::remove_context_label(&mut *conn, id, &context.label_id).await?;
            stripped.push(context.label_id.clone());
        }

        for message in &messages {
            for label in stripped.iter().filter(|l| message.has_label(l)) {
                tx::remove_message_label(&mut *conn, &message.message_id, label).await?;
            }
        }

        if Location::from_label(to_label) == Some(Location::Trash) {
            // Trashing always reads the conversation.
            for context in contexts
                .iter()
                .filter(|c| !stripped.contains(&c.label_id) && c.is_unread())
            {
                if accounted.insert(context.label_id.clone()) {
                    self.ledger.adjust(&mut *conn, &context.label_id, -1).await?;
                }
                tx::set_context_unread(&mut *conn, id, &context.label_id, 0).await?;
            }
            for message in messages.iter().filter(|m| m.unread) {
                tx::set_message_unread(&mut *conn, &message.message_id, false).await?;
                read_messages.push(message.message_id.clone());
            }

            let mut context = new_context_label(&conversation, to_label, &messages);
            context.unread_count = 0;
            tx::upsert_context_label(&mut *conn, &context).await?;
        } else if !contexts.iter().any(|c| c.label_id == *to_label) {
            // A conversation already in the destination keeps its view;
            // duplicate delivery must not count it twice.
            let mut context = new_context_label(&conversation, to_label, &messages);
            if context.unread_count == 0 && was_unread {
                context.unread_count = 1;
            }
            tx::upsert_context_label(&mut *conn, &context).await?;
            if was_unread {
                self.ledger.adjust(&mut *conn, to_label, 1).await?;
            }
        }

        for message in &messages {
            tx::add_message_label(&mut *conn, &message.message_id, to_label).await?;
        }

        Ok(())
    }

    /// Trash a conversation that still carries the Scheduled label.
    ///
    /// Messages queued to send fall back to Drafts; only the rest are
    /// trashed. The conversation must never become fully trashed while a
    /// message is still scheduled.
    async fn trash_scheduled(
        &self,
        conn: &mut SqliteConnection,
        conversation: &Conversation,
        contexts: &[ContextLabel],
        messages: &[Message],
        read_messages: &mut Vec<MessageId>,
    ) -> Result<()> {
        let id = &conversation.conversation_id;
        let scheduled = Location::Scheduled.label_id();
        let drafts = Location::Drafts.label_id();
        let trash = Location::Trash.label_id();

        let mut accounted: HashSet<LabelId> = HashSet::new();
        let mut stripped: Vec<LabelId> = Vec::new();

        for context in contexts {
            let is_scheduled = context.label_id == scheduled;
            let strippable_folder = Location::from_label(&context.label_id)
                .is_some_and(|l| l.is_folder() && !l.is_untouched());
            if !is_scheduled && !strippable_folder {
                continue;
            }
            if context.is_unread() && accounted.insert(context.label_id.clone()) {
                self.ledger.adjust(&mut *conn, &context.label_id, -1).await?;
            }
            tx::remove_context_label(&mut *conn, id, &context.label_id).await?;
            stripped.push(context.label_id.clone());
        }

        for message in messages {
            for label in stripped.iter().filter(|l| message.has_label(l)) {
                tx::remove_message_label(&mut *conn, &message.message_id, label).await?;
            }
        }

        let (scheduled_messages, rest): (Vec<&Message>, Vec<&Message>) =
            messages.iter().partition(|m| m.has_label(&scheduled));

        for message in &scheduled_messages {
            tx::add_message_label(&mut *conn, &message.message_id, &drafts).await?;
        }
        for message in &rest {
            tx::add_message_label(&mut *conn, &message.message_id, &trash).await?;
            if message.unread {
                tx::set_message_unread(&mut *conn, &message.message_id, false).await?;
                read_messages.push(message.message_id.clone());
            }
        }

        if !scheduled_messages.is_empty() {
            let mut context = new_context_label(conversation, &drafts, messages);
            context.message_count = scheduled_messages.len() as i64;
            context.unread_count = scheduled_messages.iter().filter(|m| m.unread).count() as i64;
            tx::upsert_context_label(&mut *conn, &context).await?;
        }
        if !rest.is_empty() {
            let mut context = new_context_label(conversation, &trash, messages);
            context.message_count = rest.len() as i64;
            context.unread_count = 0;
            tx::upsert_context_label(&mut *conn, &context).await?;
        }

        tracing::debug!(conversation = %id, "trashed around scheduled messages");
        Ok(())
    }

    /// Whether the conversation reads as unread under the given label,
    /// falling back to All Mail when per-label state is not locally known.
    async fn unread_under(
        &self,
        conn: &mut SqliteConnection,
        id: &ConversationId,
        label_id: &LabelId,
    ) -> Result<bool> {
        if let Some(context) = tx::context_label(&mut *conn, id, label_id).await? {
            return Ok(context.is_unread());
        }
        if let Some(all_mail) =
            tx::context_label(&mut *conn, id, &Location::AllMail.label_id()).await?
        {
            return Ok(all_mail.is_unread());
        }
        Ok(false)
    }
}

/// Whether a folder reassignment strips this label: the explicit source
/// folder always goes; other folders go unless they are untouched
/// locations.
fn should_strip(label_id: &LabelId, from_label: &LabelId) -> bool {
    if label_id == from_label {
        return true;
    }
    Location::from_label(label_id).is_some_and(|l| l.is_folder() && !l.is_untouched())
}

/// Conversation-level unread state: All Mail's view when present,
/// otherwise any per-label view, otherwise any locally present message.
fn conversation_unread(contexts: &[ContextLabel], messages: &[Message]) -> bool {
    if let Some(all_mail) = contexts
        .iter()
        .find(|c| c.label_id == Location::AllMail.label_id())
    {
        return all_mail.is_unread();
    }
    contexts.iter().any(ContextLabel::is_unread) || messages.iter().any(|m| m.unread)
}

/// A fresh per-label view of a conversation, inheriting the sort key and
/// seeded with the locally known unread message count.
fn new_context_label(
    conversation: &Conversation,
    label_id: &LabelId,
    messages: &[Message],
) -> ContextLabel {
    ContextLabel {
        conversation_id: conversation.conversation_id.clone(),
        label_id: label_id.clone(),
        user_id: conversation.user_id.clone(),
        unread_count: messages.iter().filter(|m| m.unread).count() as i64,
        message_count: conversation.num_messages,
        time: Utc::now(),
        display_order: conversation.display_order,
        snooze_time: None,
    }
}
