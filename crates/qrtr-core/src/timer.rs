//! Single-threaded timer plumbing backing the debounce machine and
//! `wait_for_node`'s timeout path.
//!
//! Generalized from this codebase's min-heap timer backend: same
//! handle/entry/backend-trait layering, but no dedicated polling thread —
//! a Bus's own event loop calls [`TimerDriver::poll_expired`] once per
//! iteration, the same way it polls its sockets.

use std::time::{Duration, Instant};

/// Opaque handle to a scheduled timer, unique per [`TimerDriver`] instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

impl TimerHandle {
    pub(crate) fn from_raw(id: u64) -> Self {
        Self(id)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// What a fired timer is for. The Bus dispatches on this to know which
/// state machine to drive without a second lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Per-node debounce: fire `PUBLISH_TIMEOUT_MS` after the last
    /// `NEW_SERVER` for a still-unpublished node.
    Debounce { node_id: u32 },
    /// `wait_for_node`'s timeout side of its dual-completion race.
    WaitTimeout { waiter_id: u64 },
    /// Bus construction's initial-lookup gate: fires when the control socket
    /// has gone quiet for `PUBLISH_TIMEOUT_MS` after at least one packet.
    InitialGateIdle,
    /// Bus construction's initial-lookup gate: fires if no quiet period is
    /// reached before the caller's configured timeout elapses.
    InitialGateDeadline { waited_ms: u32 },
}

/// A scheduled, not-yet-fired timer.
#[derive(Debug, Clone)]
pub struct TimerEntry {
    pub handle: TimerHandle,
    pub deadline: Instant,
    pub kind: TimerKind,
}

impl TimerEntry {
    pub fn is_expired(&self, now: Instant) -> bool {
        self.deadline <= now
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        self.deadline.saturating_duration_since(now)
    }
}

/// Debounce interval mandated for node publication (§4.2).
pub const PUBLISH_TIMEOUT_MS: u64 = 100;

/// The contract a timer backend must satisfy.
///
/// # Implementors
/// - [`crate::timer::HeapTimerDriver`] — in-process `BinaryHeap`-backed
///   driver polled by a single-threaded reactor. The only implementor
///   needed here; `qrtr-runtime` wires it into the event loop rather than
///   shipping its own.
pub trait TimerDriver {
    /// Schedule `kind` to fire `delay` from now. Returns a handle usable
    /// with [`TimerDriver::cancel`].
    fn insert(&self, delay: Duration, kind: TimerKind) -> TimerHandle;

    /// Cancel a previously scheduled timer. Idempotent — cancelling an
    /// already-fired or already-cancelled handle is a no-op.
    fn cancel(&self, handle: TimerHandle);

    /// Drain and return every timer whose deadline is `<= now`.
    fn poll_expired(&self, now: Instant) -> Vec<TimerEntry>;

    /// The deadline of the next timer to fire, if any are pending.
    fn next_deadline(&self) -> Option<Instant>;

    /// Count of timers currently pending (not yet fired or cancelled).
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-process min-heap [`TimerDriver`], single-threaded.
///
/// Generalized from this codebase's heap timer backend: the `Mutex` guarding
/// the heap becomes a plain `RefCell` since every call happens on the Bus's
/// one event-loop thread, and cancellation stays lazy (a cancelled handle is
/// recorded in a set and skipped when popped, rather than removed from the
/// heap in place).
pub struct HeapTimerDriver {
    inner: std::cell::RefCell<HeapInner>,
}

struct HeapInner {
    heap: std::collections::BinaryHeap<HeapEntry>,
    cancelled: std::collections::HashSet<TimerHandle>,
    next_id: u64,
}

#[derive(Debug, Clone)]
struct HeapEntry {
    deadline: Instant,
    handle: TimerHandle,
    kind: TimerKind,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.handle == other.handle
    }
}
impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Reversed: BinaryHeap is a max-heap, we want earliest deadline first.
        other.deadline.cmp(&self.deadline)
    }
}

impl HeapTimerDriver {
    pub fn new() -> Self {
        Self {
            inner: std::cell::RefCell::new(HeapInner {
                heap: std::collections::BinaryHeap::new(),
                cancelled: std::collections::HashSet::new(),
                next_id: 0,
            }),
        }
    }
}

impl Default for HeapTimerDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerDriver for HeapTimerDriver {
    fn insert(&self, delay: Duration, kind: TimerKind) -> TimerHandle {
        let mut inner = self.inner.borrow_mut();
        inner.next_id += 1;
        let handle = TimerHandle::from_raw(inner.next_id);
        let deadline = Instant::now() + delay;
        inner.heap.push(HeapEntry { deadline, handle, kind });
        handle
    }

    fn cancel(&self, handle: TimerHandle) {
        let mut inner = self.inner.borrow_mut();
        inner.cancelled.insert(handle);
        if inner.heap.is_empty() {
            inner.cancelled.clear();
        }
    }

    fn poll_expired(&self, now: Instant) -> Vec<TimerEntry> {
        let mut inner = self.inner.borrow_mut();
        let mut fired = Vec::new();
        while let Some(top) = inner.heap.peek() {
            if top.deadline > now {
                break;
            }
            let entry = inner.heap.pop().unwrap();
            if inner.cancelled.remove(&entry.handle) {
                continue;
            }
            fired.push(TimerEntry {
                handle: entry.handle,
                deadline: entry.deadline,
                kind: entry.kind,
            });
        }
        if inner.heap.is_empty() {
            inner.cancelled.clear();
        }
        fired
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.inner.borrow().heap.peek().map(|e| e.deadline)
    }

    fn len(&self) -> usize {
        let inner = self.inner.borrow();
        inner.heap.len().saturating_sub(inner.cancelled.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_insert_and_poll() {
        let driver = HeapTimerDriver::new();
        let h = driver.insert(Duration::from_millis(0), TimerKind::WaitTimeout { waiter_id: 1 });
        sleep(Duration::from_millis(5));
        let fired = driver.poll_expired(Instant::now());
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].handle, h);
    }

    #[test]
    fn test_ordering_earliest_first() {
        let driver = HeapTimerDriver::new();
        driver.insert(Duration::from_millis(50), TimerKind::Debounce { node_id: 2 });
        driver.insert(Duration::from_millis(0), TimerKind::Debounce { node_id: 1 });
        sleep(Duration::from_millis(5));
        let fired = driver.poll_expired(Instant::now());
        assert_eq!(fired.len(), 1);
        assert!(matches!(fired[0].kind, TimerKind::Debounce { node_id: 1 }));
    }

    #[test]
    fn test_cancel() {
        let driver = HeapTimerDriver::new();
        let h = driver.insert(Duration::from_millis(0), TimerKind::WaitTimeout { waiter_id: 1 });
        driver.cancel(h);
        sleep(Duration::from_millis(5));
        let fired = driver.poll_expired(Instant::now());
        assert!(fired.is_empty());
    }

    #[test]
    fn test_cancel_idempotent() {
        let driver = HeapTimerDriver::new();
        let h = driver.insert(Duration::from_millis(0), TimerKind::WaitTimeout { waiter_id: 1 });
        driver.cancel(h);
        driver.cancel(h);
        sleep(Duration::from_millis(5));
        assert!(driver.poll_expired(Instant::now()).is_empty());
    }

    #[test]
    fn test_next_deadline_reports_earliest() {
        let driver = HeapTimerDriver::new();
        assert!(driver.next_deadline().is_none());
        driver.insert(Duration::from_millis(100), TimerKind::Debounce { node_id: 1 });
        assert!(driver.next_deadline().is_some());
    }

    #[test]
    fn test_len_excludes_cancelled() {
        let driver = HeapTimerDriver::new();
        let h1 = driver.insert(Duration::from_millis(100), TimerKind::Debounce { node_id: 1 });
        driver.insert(Duration::from_millis(100), TimerKind::Debounce { node_id: 2 });
        assert_eq!(driver.len(), 2);
        driver.cancel(h1);
        assert_eq!(driver.len(), 1);
    }

    #[test]
    fn test_cleanup_on_empty() {
        let driver = HeapTimerDriver::new();
        let h = driver.insert(Duration::from_millis(0), TimerKind::WaitTimeout { waiter_id: 1 });
        driver.cancel(h);
        assert!(driver.is_empty());
    }
}
