//! # mailmirror-core
//!
//! Local conversation-state synchronization core for the `MailMirror`
//! email client.
//!
//! This crate provides:
//! - Optimistic local application of user mutations (read state, labels,
//!   folder moves, delete, snooze) against a `SQLite` mirror
//! - Denormalized per-label unread counters maintained as bounded deltas
//! - A durable mutation queue written ahead of every local apply
//! - Undo token collection for reversible remote mutations
//! - The coordinating conversation service exposed to the UI layer
//!
//! The remote side (wire protocol, retries, chunking) and the UI are not
//! part of this crate; they plug in through narrow ports.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod counter;
pub mod entity;
mod error;
pub mod label;
pub mod mutation;
pub mod queue;
pub mod service;
mod session;
pub mod undo;

pub use counter::{ConversationCount, CounterLedger};
pub use entity::{Conversation, ContextLabel, EntityStore, Message};
pub use error::{Error, Result};
pub use label::{ConversationId, LabelId, Location, MessageId, UserId};
pub use mutation::LocalConversationMutator;
pub use queue::{MutationIntent, MutationQueuePort, QueuedIntent, SqliteMutationQueue};
pub use service::{
    ChunkOutcome, ConversationService, EventSinkPort, NoopNotifications, NotificationPort,
    RemoteError, RemoteMutationExecutor,
};
pub use session::SessionContext;
pub use undo::{UndoActionType, UndoCapability, UndoToken, UndoTokenRegistry};
