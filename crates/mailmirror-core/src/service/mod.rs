//! Public operation surface of the synchronization core.

mod conversation;
mod ports;

pub use conversation::ConversationService;
pub use ports::{
    ChunkOutcome, EventSinkPort, NoopNotifications, NotificationPort, RemoteError,
    RemoteMutationExecutor,
};
