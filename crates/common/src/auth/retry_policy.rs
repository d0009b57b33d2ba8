//! Refresh-and-retry policy for authorization failures

use super::errors::InvokeError;

/// How many times a call rejected as unauthorized is retried after a
/// forced session refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthRetryPolicy {
    pub max_auth_retries: u32,
}

impl Default for AuthRetryPolicy {
    fn default() -> Self {
        Self { max_auth_retries: 1 }
    }
}

impl AuthRetryPolicy {
    /// Never retry; authorization failures propagate immediately
    pub const fn no_retry() -> Self {
        Self { max_auth_retries: 0 }
    }

    /// Whether `error` should trigger a refresh, given the retries already
    /// spent on this call
    pub fn should_retry(&self, retries_spent: u32, error: &InvokeError) -> bool {
        error.is_unauthorized() && retries_spent < self.max_auth_retries
    }
}
