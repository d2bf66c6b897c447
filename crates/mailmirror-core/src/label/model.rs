//! Identifier newtypes and system label locations.

use serde::{Deserialize, Serialize};

/// Unique identifier for a user session's data partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    /// Create a new user ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    /// Create a new conversation ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if the ID carries no characters. Empty IDs are produced by
    /// malformed upstream payloads and must never reach the store.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    /// Create a new message ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a label (folder or tag).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LabelId(pub String);

impl LabelId {
    /// Create a new label ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if the ID carries no characters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True if this label is a system folder. Custom labels are always
    /// tags; user-created folders arrive from the server already resolved
    /// into one of the system locations they shadow.
    #[must_use]
    pub fn is_folder(&self) -> bool {
        Location::from_label(self).is_some_and(|l| l.is_folder())
    }
}

impl std::fmt::Display for LabelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Location> for LabelId {
    fn from(location: Location) -> Self {
        location.label_id()
    }
}

/// System mailbox locations with fixed label IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Location {
    /// Incoming mail.
    Inbox,
    /// Unsent drafts.
    Drafts,
    /// Sent mail.
    Sent,
    /// Starred items (tag).
    Starred,
    /// Archived mail.
    Archive,
    /// Junk mail.
    Spam,
    /// Deleted mail.
    Trash,
    /// Every message regardless of folder (tag).
    AllMail,
    /// Messages queued to be sent at a later time.
    Scheduled,
    /// Conversations hidden until their snooze date.
    Snoozed,
}

impl Location {
    /// The stable label ID of this location.
    #[must_use]
    pub fn label_id(self) -> LabelId {
        LabelId::new(self.as_str())
    }

    /// The stable string form of this location's label ID.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inbox => "inbox",
            Self::Drafts => "drafts",
            Self::Sent => "sent",
            Self::Starred => "starred",
            Self::Archive => "archive",
            Self::Spam => "spam",
            Self::Trash => "trash",
            Self::AllMail => "all-mail",
            Self::Scheduled => "scheduled",
            Self::Snoozed => "snoozed",
        }
    }

    /// Resolve a label ID back into a system location, if it is one.
    #[must_use]
    pub fn from_label(label_id: &LabelId) -> Option<Self> {
        match label_id.as_str() {
            "inbox" => Some(Self::Inbox),
            "drafts" => Some(Self::Drafts),
            "sent" => Some(Self::Sent),
            "starred" => Some(Self::Starred),
            "archive" => Some(Self::Archive),
            "spam" => Some(Self::Spam),
            "trash" => Some(Self::Trash),
            "all-mail" => Some(Self::AllMail),
            "scheduled" => Some(Self::Scheduled),
            "snoozed" => Some(Self::Snoozed),
            _ => None,
        }
    }

    /// True if this location is a folder, i.e. mutually exclusive with
    /// other folders on the same conversation.
    #[must_use]
    pub const fn is_folder(self) -> bool {
        match self {
            Self::Inbox
            | Self::Drafts
            | Self::Sent
            | Self::Archive
            | Self::Spam
            | Self::Trash
            | Self::Scheduled
            | Self::Snoozed => true,
            Self::Starred | Self::AllMail => false,
        }
    }

    /// True if a folder reassignment must leave this location alone.
    /// Drafts and Sent reflect authorship, Starred and AllMail are tags,
    /// Archive and Scheduled are only ever left through an explicit move
    /// out of them.
    #[must_use]
    pub const fn is_untouched(self) -> bool {
        matches!(
            self,
            Self::Drafts
                | Self::Sent
                | Self::AllMail
                | Self::Starred
                | Self::Archive
                | Self::Scheduled
        )
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_label_ids_round_trip() {
        let locations = [
            Location::Inbox,
            Location::Drafts,
            Location::Sent,
            Location::Starred,
            Location::Archive,
            Location::Spam,
            Location::Trash,
            Location::AllMail,
            Location::Scheduled,
            Location::Snoozed,
        ];
        for location in locations {
            assert_eq!(Location::from_label(&location.label_id()), Some(location));
        }
    }

    #[test]
    fn custom_labels_are_tags() {
        let label = LabelId::new("project-apollo");
        assert!(Location::from_label(&label).is_none());
        assert!(!label.is_folder());
    }

    #[test]
    fn folder_classification() {
        assert!(Location::Inbox.is_folder());
        assert!(Location::Trash.is_folder());
        assert!(!Location::Starred.is_folder());
        assert!(!Location::AllMail.is_folder());
    }

    #[test]
    fn untouched_set_matches_folder_reassignment_rules() {
        assert!(Location::Drafts.is_untouched());
        assert!(Location::Sent.is_untouched());
        assert!(Location::AllMail.is_untouched());
        assert!(Location::Starred.is_untouched());
        assert!(Location::Archive.is_untouched());
        assert!(Location::Scheduled.is_untouched());
        assert!(!Location::Inbox.is_untouched());
        assert!(!Location::Trash.is_untouched());
        assert!(!Location::Spam.is_untouched());
        assert!(!Location::Snoozed.is_untouched());
    }
}
