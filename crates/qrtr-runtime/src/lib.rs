//! Linux backend for `qrtr-core`'s trait boundaries: a libc-backed
//! `AF_QIPCRTR` socket and an epoll-based event loop. Timer scheduling needs
//! no platform code and is provided directly by
//! `qrtr_core::timer::HeapTimerDriver`.

pub mod epoll;
pub mod socket;

pub use epoll::EpollEventLoop;
pub use socket::LinuxQrtrSocket;
