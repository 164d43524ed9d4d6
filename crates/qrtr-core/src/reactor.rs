//! External-collaborator trait boundaries: the raw syscall surface and the
//! host's event-loop integration.
//!
//! Neither trait pulls in `libc` or `nix` — only `qrtr-runtime` talks to the
//! kernel directly. This mirrors the "program to the interface" split this
//! codebase's zero-dependency trait crates use to separate a capability's
//! contract from any one backend.

use std::time::Duration;

use crate::error::QrtrResult;

/// Opaque identifier for a registered event source, returned by
/// [`EventLoop::register_readable`] and consumed by [`EventLoop::unregister`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(u64);

impl SourceId {
    pub fn from_raw(id: u64) -> Self {
        Self(id)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// The raw QRTR socket surface: `socket`, `sendto`, `recvfrom`, `getsockname`.
///
/// # Implementors
/// - `qrtr-runtime::socket::LinuxQrtrSocket` — libc-backed `AF_QIPCRTR`
///   datagram socket. The only implementor shipped here.
pub trait RawSocket {
    /// Send a datagram to `(node, port)`. Returns the number of bytes sent;
    /// for a datagram socket this is always the whole buffer or an error.
    fn send_to(&self, buf: &[u8], node: u32, port: u32) -> QrtrResult<usize>;

    /// Receive one datagram into `buf`, returning `(len, src_node, src_port)`.
    fn recv_from(&self, buf: &mut [u8]) -> QrtrResult<(usize, u32, u32)>;

    /// This socket's bound local address, via `getsockname`.
    fn local_address(&self) -> QrtrResult<(u32, u32)>;

    /// The raw file descriptor, for registration with an [`EventLoop`].
    fn as_raw_fd(&self) -> i32;
}

/// A way to register readable-fd callbacks on some host reactor and to poll
/// timers as part of the same loop iteration.
///
/// # Implementors
/// - `qrtr-runtime::epoll::EpollEventLoop` — a single-threaded epoll reactor.
///   The only implementor shipped here.
pub trait EventLoop {
    /// Register `fd` for readability notification. `callback` runs on this
    /// loop's thread whenever `fd` becomes readable, until unregistered.
    fn register_readable(&self, fd: i32, callback: Box<dyn FnMut()>) -> SourceId;

    /// Remove a previously registered source. Idempotent.
    fn unregister(&self, id: SourceId);

    /// Run one iteration: block up to `timeout` (or indefinitely if `None`)
    /// for readiness, dispatch any ready callbacks, then return. A Bus calls
    /// this in a loop, polling its [`crate::timer::TimerDriver`] between
    /// iterations rather than handing timer deadlines to the loop itself.
    fn run_once(&self, timeout: Option<Duration>) -> QrtrResult<()>;
}
