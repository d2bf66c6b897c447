//! Explicit session state threaded through the core.

use crate::label::UserId;

/// Per-user session context.
///
/// Passed by constructor injection to every component that needs to know
/// whose mirror it is operating on; the core holds no ambient user state.
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// The signed-in user owning the local mirror.
    pub user_id: UserId,
}

impl SessionContext {
    /// Create a session context for one user.
    #[must_use]
    pub const fn new(user_id: UserId) -> Self {
        Self { user_id }
    }
}
