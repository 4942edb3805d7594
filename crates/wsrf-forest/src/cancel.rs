//! Cooperative cancellation shared between the coordinator and tree builders.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::ForestError;

/// A cloneable stop flag.
///
/// Every clone observes the same flag; once cancelled it stays cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Return `true` once [`cancel`](Self::cancel) has been called on any clone.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// What a checkpoint does when it observes cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelPolicy {
    /// Fail immediately with [`ForestError::Cancelled`]. Used when building sequentially.
    Raise,
    /// Report the stop so the caller can unwind without allocating more work.
    /// Used inside pool workers; the tree reports `Cancelled` at its next stage boundary.
    Yield,
}

/// A cancellation checkpoint: a token plus the policy to apply.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Interrupt<'a> {
    token: &'a CancellationToken,
    policy: CancelPolicy,
}

impl<'a> Interrupt<'a> {
    pub(crate) fn new(token: &'a CancellationToken, policy: CancelPolicy) -> Self {
        Self { token, policy }
    }

    /// Return `Ok(true)` when the caller should stop and unwind.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::Cancelled`] under [`CancelPolicy::Raise`].
    pub(crate) fn should_stop(&self) -> Result<bool, ForestError> {
        if !self.token.is_cancelled() {
            return Ok(false);
        }
        match self.policy {
            CancelPolicy::Raise => Err(ForestError::Cancelled),
            CancelPolicy::Yield => Ok(true),
        }
    }

    /// Fail with [`ForestError::Cancelled`] regardless of policy.
    pub(crate) fn ensure_running(&self) -> Result<(), ForestError> {
        if self.token.is_cancelled() {
            return Err(ForestError::Cancelled);
        }
        Ok(())
    }
}
