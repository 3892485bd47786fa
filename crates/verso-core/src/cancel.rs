//! Cooperative cancellation for catalog operations.
//!
//! Every public catalog operation accepts a [`CancelToken`]. The token is
//! observed only at suspension points (transaction boundaries and between
//! streaming-cursor batches), never inside visibility predicates. Firing the
//! token before a transaction commits rolls the transaction back; firing it
//! afterwards has no effect.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};

/// A cheap, clonable abort handle.
///
/// All clones share the same flag; cancelling any clone cancels them all.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a new token in the not-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns true if cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns `Err(Error::Cancelled)` if cancellation has been requested.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] once the token has fired.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}
