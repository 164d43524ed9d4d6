//! Facade crate: re-exports `qrtr-core`'s types and wires them to
//! `qrtr-runtime`'s Linux backend behind one convenience constructor.

pub use qrtr_core::*;
pub use qrtr_runtime::{EpollEventLoop, LinuxQrtrSocket};

use std::rc::Rc;

/// Open a Bus against the default Linux runtime backend (a fresh
/// `AF_QIPCRTR` socket and a dedicated `EpollEventLoop`).
///
/// Equivalent to constructing the runtime pieces yourself and calling
/// [`Bus::new`] — provided for the common case where a caller doesn't need
/// to share an event loop across multiple buses. Returns the constructed
/// `Rc<Bus>` synchronously; `on_ready` is a notification fired once the
/// initial-lookup gate settles (immediately if `config.lookup_timeout_ms`
/// is zero).
pub fn open(
    config: BusConfig,
    cancel: CancellationToken,
    on_ready: impl FnOnce(QrtrResult<()>) + 'static,
) -> QrtrResult<Rc<Bus>> {
    let socket: Rc<dyn RawSocket> = Rc::new(LinuxQrtrSocket::new()?);
    let event_loop: Rc<dyn EventLoop> = Rc::new(EpollEventLoop::new()?);
    let timers: Rc<dyn TimerDriver> = Rc::new(HeapTimerDriver::new());
    Bus::new(config, socket, event_loop, timers, cancel, on_ready)
}
