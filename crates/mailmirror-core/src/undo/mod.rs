//! Server-issued undo tokens.
//!
//! Certain remote mutations return an opaque token that can reverse the
//! mutation within a server-defined window. The registry correlates the
//! tokens of one logical operation with the kind of undo they offer.

mod model;
mod registry;

pub use model::{UndoActionType, UndoCapability, UndoToken};
pub use registry::UndoTokenRegistry;
