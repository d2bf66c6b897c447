//! Optimistic local application of conversation mutations.

mod mutator;

pub use mutator::LocalConversationMutator;
