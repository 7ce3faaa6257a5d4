//! Cooperative cancellation.

use crate::error::{StoreError, StoreResult};

/// Shared flag polled at cancellation points.
///
/// Cloning yields a handle to the same token, so another thread can cancel a
/// running search. Cancellation is never preemptive: it only takes effect at
/// the next [`CancellationToken::check`]. Wraps the `tokio-util` token, whose
/// `cancel` and `is_cancelled` are synchronous, so no runtime is needed.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(tokio_util::sync::CancellationToken);

impl CancellationToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// A token cancelled together with this one, but cancellable on its own.
    pub fn child_token(&self) -> Self {
        Self(self.0.child_token())
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.cancel();
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }

    /// Fail with [`StoreError::Cancelled`] if cancellation was requested.
    pub fn check(&self) -> StoreResult<()> {
        if self.is_cancelled() {
            Err(StoreError::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl From<tokio_util::sync::CancellationToken> for CancellationToken {
    fn from(token: tokio_util::sync::CancellationToken) -> Self {
        Self(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_is_shared_between_clones() {
        let token = CancellationToken::new();
        let handle = token.clone();
        assert!(token.check().is_ok());

        handle.cancel();
        assert!(token.is_cancelled());
        assert_eq!(token.check(), Err(StoreError::Cancelled));
    }

    #[test]
    fn test_child_follows_parent_only() {
        let parent = CancellationToken::new();
        let child = parent.child_token();
        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());

        let other = parent.child_token();
        parent.cancel();
        assert_eq!(other.check(), Err(StoreError::Cancelled));
    }

    #[test]
    fn test_wraps_runtime_token() {
        let inner = tokio_util::sync::CancellationToken::new();
        let token = CancellationToken::from(inner.clone());
        inner.cancel();
        assert!(token.is_cancelled());
    }
}
