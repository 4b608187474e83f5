//! Cooperative cancellation shared between the CLI, tools and child processes.
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::error::ToolError;

/// Cloneable cancellation handle.
///
/// Clones share the same flag. A child token created with
/// [`child_with_timeout`](Self::child_with_timeout) fires when its parent is
/// cancelled or when its own deadline elapses, whichever comes first.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
    parent: Option<Arc<Self>>,
}

impl CancellationToken {
    /// Create a fresh, uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of this token and every clone of it.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// `true` once [`cancel`](Self::cancel) was called here or on an ancestor.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || self.parent.as_ref().is_some_and(|p| p.is_cancelled())
    }

    /// `true` once this token's deadline (or an ancestor's) has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
            || self.parent.as_ref().is_some_and(|p| p.is_expired())
    }

    /// `true` when work under this token must stop for any reason.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.is_cancelled() || self.is_expired()
    }

    /// Derive a token that also expires after `timeout`.
    #[must_use]
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Instant::now().checked_add(timeout),
            parent: Some(Arc::new(self.clone())),
        }
    }

    /// Return [`ToolError::Cancelled`] if cancellation was requested.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Cancelled`] when the token has fired.
    pub fn check(&self) -> Result<(), ToolError> {
        if self.is_cancelled() {
            Err(ToolError::Cancelled)
        } else {
            Ok(())
        }
    }
}
