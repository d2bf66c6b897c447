//! Mutation intent model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::label::{ConversationId, LabelId};

/// A durable description of a pending remote action.
///
/// Intents are created before the local mutation is applied and consumed
/// by the remote dispatch path, possibly in a later process lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutationIntent {
    /// Mark conversations read under a label.
    Read {
        /// Target conversations.
        conversation_ids: Vec<ConversationId>,
        /// Label the action was issued under.
        label_id: LabelId,
    },
    /// Mark conversations unread under a label.
    Unread {
        /// Target conversations.
        conversation_ids: Vec<ConversationId>,
        /// Label the action was issued under.
        label_id: LabelId,
    },
    /// Apply a tag label.
    Label {
        /// Target conversations.
        conversation_ids: Vec<ConversationId>,
        /// Tag to apply.
        label_id: LabelId,
    },
    /// Remove a tag label.
    Unlabel {
        /// Target conversations.
        conversation_ids: Vec<ConversationId>,
        /// Tag to remove.
        label_id: LabelId,
    },
    /// Reassign conversations to another folder.
    Folder {
        /// Target conversations.
        conversation_ids: Vec<ConversationId>,
        /// Folder the conversations are leaving.
        from_label: LabelId,
        /// Destination folder.
        to_label: LabelId,
    },
    /// Permanently delete conversations.
    Delete {
        /// Target conversations.
        conversation_ids: Vec<ConversationId>,
        /// Label the delete was issued under.
        label_id: LabelId,
    },
    /// Hide conversations until a wake-up date.
    Snooze {
        /// Target conversations.
        conversation_ids: Vec<ConversationId>,
        /// Wake-up instant.
        until: DateTime<Utc>,
    },
    /// Bring snoozed conversations back to the inbox.
    Unsnooze {
        /// Target conversations.
        conversation_ids: Vec<ConversationId>,
    },
}

impl MutationIntent {
    /// Short action name for logging and queue bookkeeping.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Read { .. } => "read",
            Self::Unread { .. } => "unread",
            Self::Label { .. } => "label",
            Self::Unlabel { .. } => "unlabel",
            Self::Folder { .. } => "folder",
            Self::Delete { .. } => "delete",
            Self::Snooze { .. } => "snooze",
            Self::Unsnooze { .. } => "unsnooze",
        }
    }

    /// The conversations this intent targets.
    #[must_use]
    pub fn conversation_ids(&self) -> &[ConversationId] {
        match self {
            Self::Read {
                conversation_ids, ..
            }
            | Self::Unread {
                conversation_ids, ..
            }
            | Self::Label {
                conversation_ids, ..
            }
            | Self::Unlabel {
                conversation_ids, ..
            }
            | Self::Folder {
                conversation_ids, ..
            }
            | Self::Delete {
                conversation_ids, ..
            }
            | Self::Snooze {
                conversation_ids, ..
            }
            | Self::Unsnooze { conversation_ids } => conversation_ids,
        }
    }
}

/// An intent as stored in the queue, with its assigned position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedIntent {
    /// Queue position; lower IDs were enqueued first.
    pub id: i64,
    /// The stored intent.
    pub intent: MutationIntent,
}
