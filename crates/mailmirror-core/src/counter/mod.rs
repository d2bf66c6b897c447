//! Denormalized per-label unread/total counters.
//!
//! Counters are maintained as bounded deltas, never recomputed from
//! scratch. Drift under concurrent mutation is expected and reconciled by
//! a periodic full refetch outside this crate.

mod ledger;
mod model;

pub use ledger::CounterLedger;
pub use model::ConversationCount;
