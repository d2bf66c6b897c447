//! Narrow ports connecting the core to its collaborators.
//!
//! The remote side, the observer refresh signal and local notification
//! cancellation are all injected interfaces; the core never reaches for
//! ambient globals to find them.

use async_trait::async_trait;
use thiserror::Error;

use crate::label::{ConversationId, MessageId};
use crate::queue::MutationIntent;
use crate::undo::UndoToken;

/// Opaque error reported by the remote executor. The core passes it
/// through without interpreting it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("remote executor error: {0}")]
pub struct RemoteError(pub String);

impl RemoteError {
    /// Wrap a remote-side error message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Outcome of one chunk of a chunked remote mutation: an undo token if the
/// server offered one, or the chunk's error.
pub type ChunkOutcome = Result<Option<UndoToken>, RemoteError>;

/// Asynchronous remote execution of mutation intents.
///
/// Implementations own chunking of large batches; the returned vector
/// carries one outcome per chunk in dispatch order. Retries and backoff
/// also live behind this port.
#[async_trait]
pub trait RemoteMutationExecutor: Send + Sync {
    /// Execute a mutation remotely.
    async fn execute(&self, intent: &MutationIntent) -> Vec<ChunkOutcome>;

    /// Reverse a previously executed mutation with a server-issued token.
    async fn undo(&self, token: &UndoToken) -> Result<(), RemoteError>;
}

/// Refresh signal consumed by read-side observers (e.g. a mailbox list).
///
/// Fired after a local mutation committed, independent of whether the
/// remote action has completed.
pub trait EventSinkPort: Send + Sync {
    /// The given conversations changed locally.
    fn conversations_changed(&self, conversation_ids: &[ConversationId]);
}

/// Cancellation of pending local notifications for messages the user can
/// no longer be expected to care about (read or trashed).
pub trait NotificationPort: Send + Sync {
    /// Cancel any pending notification tied to the given messages.
    fn cancel_for_messages(&self, message_ids: &[MessageId]);
}

/// Notification port for hosts without local notifications.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifications;

impl NotificationPort for NoopNotifications {
    fn cancel_for_messages(&self, _message_ids: &[MessageId]) {}
}
