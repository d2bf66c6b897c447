//! Collection of undo tokens across chunked remote calls.

use chrono::{Duration, Utc};
use parking_lot::Mutex;

use super::model::{UndoActionType, UndoCapability, UndoToken};
use crate::service::{ChunkOutcome, RemoteError};

/// Correlates tokens returned by a remote action with the undo capability
/// exposed to the caller.
///
/// Tokens from succeeded chunks are always retained, even when a sibling
/// chunk fails: those chunks did mutate server state and stay reversible.
/// The first chunk error is reported alongside.
pub struct UndoTokenRegistry {
    window: Duration,
    capabilities: Mutex<Vec<UndoCapability>>,
}

impl UndoTokenRegistry {
    /// Create a registry whose tokens expire after the given window.
    #[must_use]
    pub const fn new(window: Duration) -> Self {
        Self {
            window,
            capabilities: Mutex::new(Vec::new()),
        }
    }

    /// Register the tokens of one logical operation.
    pub fn register(&self, tokens: Vec<UndoToken>, action_type: UndoActionType) {
        if tokens.is_empty() {
            return;
        }
        self.capabilities.lock().push(UndoCapability {
            tokens,
            action_type,
            expires_at: Utc::now() + self.window,
        });
    }

    /// Fold the chunk outcomes of one operation into the registry.
    ///
    /// Every token from a succeeded chunk is registered as one capability.
    /// Returns the registered tokens, or the first chunk error if any
    /// chunk failed; the tokens stay registered either way.
    pub fn absorb(
        &self,
        outcomes: Vec<ChunkOutcome>,
        action_type: UndoActionType,
    ) -> Result<Vec<UndoToken>, RemoteError> {
        let mut tokens = Vec::new();
        let mut first_error = None;

        for outcome in outcomes {
            match outcome {
                Ok(Some(token)) => tokens.push(token),
                Ok(None) => {}
                Err(error) => {
                    if first_error.is_none() {
                        first_error = Some(error);
                    }
                }
            }
        }

        self.register(tokens.clone(), action_type);

        match first_error {
            Some(error) => Err(error),
            None => Ok(tokens),
        }
    }

    /// The most recent live undo opportunity, if any.
    #[must_use]
    pub fn current(&self) -> Option<UndoCapability> {
        self.capabilities
            .lock()
            .iter()
            .rev()
            .find(|capability| !capability.is_expired())
            .cloned()
    }

    /// Drop expired capabilities.
    pub fn purge_expired(&self) {
        self.capabilities
            .lock()
            .retain(|capability| !capability.is_expired());
    }

    /// Forget a capability once it has been consumed by an undo dispatch.
    pub fn consume(&self, capability: &UndoCapability) {
        self.capabilities
            .lock()
            .retain(|kept| kept.tokens != capability.tokens);
    }
}
