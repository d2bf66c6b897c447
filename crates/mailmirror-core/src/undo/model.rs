//! Undo token model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::label::{LabelId, Location};

/// Opaque server-issued capability to reverse a completed remote mutation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UndoToken(pub String);

impl UndoToken {
    /// Create a token from its wire form.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UndoToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What kind of mutation an undo token reverses, derived from the label
/// the mutation touched. Drives the wording of the undo affordance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndoActionType {
    /// The conversations were moved to Trash.
    MovedToTrash,
    /// The conversations were moved to Archive.
    MovedToArchive,
    /// The conversations were moved to Spam.
    MovedToSpam,
    /// A tag label was applied or removed.
    LabelChanged,
}

impl UndoActionType {
    /// Derive the action type from the label a mutation touched.
    #[must_use]
    pub fn from_label(label_id: &LabelId) -> Self {
        match Location::from_label(label_id) {
            Some(Location::Trash) => Self::MovedToTrash,
            Some(Location::Archive) => Self::MovedToArchive,
            Some(Location::Spam) => Self::MovedToSpam,
            _ => Self::LabelChanged,
        }
    }
}

/// A live undo opportunity: the tokens of one logical operation, what they
/// reverse, and when they stop working.
#[derive(Debug, Clone)]
pub struct UndoCapability {
    /// Tokens from every chunk of the operation that succeeded remotely.
    pub tokens: Vec<UndoToken>,
    /// What the tokens reverse.
    pub action_type: UndoActionType,
    /// Server-defined deadline after which the tokens are dead.
    pub expires_at: DateTime<Utc>,
}

impl UndoCapability {
    /// True if the window has closed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}
