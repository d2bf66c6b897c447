//! Durable mutation intents.
//!
//! Every user mutation is written to the queue before it is applied to the
//! local mirror, so a crash between the two steps loses the mirror update
//! but never the user's intent; pending intents are replayed after
//! restart.

mod model;
mod repository;

pub use model::{MutationIntent, QueuedIntent};
pub use repository::{MutationQueuePort, SqliteMutationQueue};
