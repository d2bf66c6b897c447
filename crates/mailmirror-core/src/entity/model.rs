//! Local mirror entity models.

use chrono::{DateTime, Utc};

use crate::label::{ConversationId, LabelId, MessageId, UserId};

/// An aggregate of messages presented as one mailbox item.
#[derive(Debug, Clone)]
pub struct Conversation {
    /// Conversation identity.
    pub conversation_id: ConversationId,
    /// Owning user.
    pub user_id: UserId,
    /// Subject line of the conversation.
    pub subject: String,
    /// Total number of messages the server reports for this conversation.
    /// The local message set may be smaller (lazy body fetch).
    pub num_messages: i64,
    /// Stable sort key, propagated to per-label views.
    pub display_order: i64,
    /// Terminal tombstone set by the remote cleanup sweep. Distinct from a
    /// user-initiated delete, which removes the row outright.
    pub is_soft_deleted: bool,
}

/// A conversation's state as observed under one specific label.
///
/// A conversation has at most one context label per label it is a member
/// of; the pair `(conversation_id, label_id)` is the identity.
#[derive(Debug, Clone)]
pub struct ContextLabel {
    /// Conversation this view belongs to.
    pub conversation_id: ConversationId,
    /// Label this view is observed under.
    pub label_id: LabelId,
    /// Owning user.
    pub user_id: UserId,
    /// Unread state under this label. Never negative.
    pub unread_count: i64,
    /// Number of the conversation's messages carrying this label.
    pub message_count: i64,
    /// Timestamp of the most recent message under this label.
    pub time: DateTime<Utc>,
    /// Sort key copied from the conversation.
    pub display_order: i64,
    /// When set, the conversation is snoozed until this instant.
    pub snooze_time: Option<DateTime<Utc>>,
}

impl ContextLabel {
    /// True if the conversation is unread as seen under this label.
    #[must_use]
    pub const fn is_unread(&self) -> bool {
        self.unread_count > 0
    }
}

/// A single message. Belongs to exactly one conversation; carries a set of
/// label memberships.
#[derive(Debug, Clone)]
pub struct Message {
    /// Message identity.
    pub message_id: MessageId,
    /// Conversation this message belongs to.
    pub conversation_id: ConversationId,
    /// Owning user.
    pub user_id: UserId,
    /// Whether the message is unread.
    pub unread: bool,
    /// Message timestamp.
    pub time: DateTime<Utc>,
    /// When set, the message is snoozed until this instant.
    pub snooze_time: Option<DateTime<Utc>>,
    /// Label memberships.
    pub labels: Vec<LabelId>,
}

impl Message {
    /// True if the message carries the given label.
    #[must_use]
    pub fn has_label(&self, label_id: &LabelId) -> bool {
        self.labels.contains(label_id)
    }
}
