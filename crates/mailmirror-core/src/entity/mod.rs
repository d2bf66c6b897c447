//! Conversation, message and per-label state entities, and the SQLite
//! store that holds the local mirror.

mod model;
mod store;

pub use model::{Conversation, ContextLabel, Message};
pub use store::EntityStore;

pub(crate) use store::tx;
