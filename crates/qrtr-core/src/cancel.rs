//! Cancellation token for cooperative cancellation.
//!
//! §5 requires every asynchronous operation (Bus construction, `wait_for_node`,
//! Client message delivery) to accept a cancellation handle that tears down
//! its subscriptions and timers before completing with `Cancelled`. The Bus
//! runs on a single event-loop thread with no shared-memory concurrency, so
//! unlike a multi-worker scheduler's token this one needs no atomics: a plain
//! `Cell` is enough, and cancelling from within the same callback that checks
//! it is already race-free.

use std::cell::Cell;
use std::rc::Rc;

/// Token for checking and triggering cancellation.
///
/// Tokens can have parents; cancelling a parent is visible to every child
/// that checks afterward. Cloning a token shares its underlying flag.
#[derive(Clone)]
pub struct CancellationToken {
    inner: CancellationInner,
}

#[derive(Clone)]
enum CancellationInner {
    /// Independently heap-allocated token.
    Owned(Rc<OwnedCancellation>),
    /// Never cancels.
    Dummy,
}

struct OwnedCancellation {
    cancelled: Cell<bool>,
    parent: Option<CancellationToken>,
}

impl CancellationToken {
    /// Create a new independent cancellation token.
    pub fn new() -> Self {
        Self {
            inner: CancellationInner::Owned(Rc::new(OwnedCancellation {
                cancelled: Cell::new(false),
                parent: None,
            })),
        }
    }

    /// Create a dummy token that never cancels.
    pub fn dummy() -> Self {
        Self {
            inner: CancellationInner::Dummy,
        }
    }

    /// Create a child token linked to this one.
    ///
    /// If this token is cancelled, checking the child also reports cancelled.
    pub fn child(&self) -> Self {
        Self {
            inner: CancellationInner::Owned(Rc::new(OwnedCancellation {
                cancelled: Cell::new(false),
                parent: Some(self.clone()),
            })),
        }
    }

    /// Check if cancellation was requested, recursing into parents.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        match &self.inner {
            CancellationInner::Owned(rc) => {
                if rc.cancelled.get() {
                    return true;
                }
                match &rc.parent {
                    Some(parent) => parent.is_cancelled(),
                    None => false,
                }
            }
            CancellationInner::Dummy => false,
        }
    }

    /// Request cancellation. Only sets this token's own flag, not its parent's.
    pub fn cancel(&self) {
        match &self.inner {
            CancellationInner::Owned(rc) => rc.cancelled.set(true),
            CancellationInner::Dummy => {}
        }
    }

    /// Check cancellation and return `Err(QrtrError::Cancelled)` if set.
    #[inline]
    pub fn check(&self) -> crate::error::QrtrResult<()> {
        if self.is_cancelled() {
            Err(crate::error::QrtrError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Reset cancellation for token reuse. Does not affect parent or children.
    pub fn reset(&self) {
        match &self.inner {
            CancellationInner::Owned(rc) => rc.cancelled.set(false),
            CancellationInner::Dummy => {}
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
