//! Identifiers and label classification.
//!
//! Labels come in two flavors: folders, which are mutually exclusive per
//! conversation (a conversation sits in exactly one folder), and tags,
//! which can be combined freely (starred, custom labels).

mod model;

pub use model::{ConversationId, LabelId, Location, MessageId, UserId};
