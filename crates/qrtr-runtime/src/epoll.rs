//! Single-threaded epoll-based [`qrtr_core::EventLoop`] implementor.
//!
//! Level-triggered: a registered fd is reported readable every iteration
//! that data remains queued, so callbacks are free to read exactly one
//! datagram per wakeup rather than draining until `EWOULDBLOCK`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::os::unix::io::BorrowedFd;
use std::time::Duration;

use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags, EpollTimeout};

use qrtr_core::error::{QrtrError, QrtrResult};
use qrtr_core::reactor::{EventLoop, SourceId};

struct Registration {
    fd: i32,
    callback: Box<dyn FnMut()>,
}

/// Epoll-backed event loop. Not `Send`/`Sync` — intended for exactly one
/// thread per Bus, matching the single-threaded cooperative model.
pub struct EpollEventLoop {
    epoll: Epoll,
    sources: RefCell<HashMap<u64, Registration>>,
    next_id: RefCell<u64>,
}

impl EpollEventLoop {
    pub fn new() -> QrtrResult<Self> {
        let epoll = Epoll::new(EpollCreateFlags::empty())
            .map_err(|e| QrtrError::SocketCreate(e as i32))?;
        Ok(Self {
            epoll,
            sources: RefCell::new(HashMap::new()),
            next_id: RefCell::new(0),
        })
    }
}

impl Default for EpollEventLoop {
    fn default() -> Self {
        Self::new().expect("epoll_create1 failed")
    }
}

impl EventLoop for EpollEventLoop {
    fn register_readable(&self, fd: i32, callback: Box<dyn FnMut()>) -> SourceId {
        let mut next_id = self.next_id.borrow_mut();
        *next_id += 1;
        let id = *next_id;

        let mut event = EpollEvent::new(EpollFlags::EPOLLIN, id);
        let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
        if let Err(e) = self.epoll.add(borrowed, &mut event) {
            qrtr_core::qerror!("epoll_ctl(ADD) failed for fd {fd}: {e}");
        }

        self.sources.borrow_mut().insert(id, Registration { fd, callback });
        SourceId::from_raw(id)
    }

    fn unregister(&self, id: SourceId) {
        if let Some(reg) = self.sources.borrow_mut().remove(&id.raw()) {
            let borrowed = unsafe { BorrowedFd::borrow_raw(reg.fd) };
            let _ = self.epoll.delete(borrowed);
        }
    }

    fn run_once(&self, timeout: Option<Duration>) -> QrtrResult<()> {
        let mut events = [EpollEvent::empty(); 16];
        let epoll_timeout = match timeout {
            Some(d) => EpollTimeout::try_from(d).unwrap_or(EpollTimeout::NONE),
            None => EpollTimeout::NONE,
        };

        let n = self
            .epoll
            .wait(&mut events, epoll_timeout)
            .map_err(|e| QrtrError::SocketIo(e as i32))?;

        let ready_ids: Vec<u64> = events[..n].iter().map(|e| e.data()).collect();
        for id in ready_ids {
            // Pull the callback out before invoking it: a callback that errors
            // may turn around and call `unregister` (or `register_readable`)
            // on this very loop, which would reentrantly `borrow_mut` the same
            // `RefCell` if we were still holding it here.
            let taken = self
                .sources
                .borrow_mut()
                .get_mut(&id)
                .map(|reg| std::mem::replace(&mut reg.callback, Box::new(|| {})));
            if let Some(mut callback) = taken {
                callback();
                // Put it back only if the source is still registered — the
                // callback may have unregistered itself.
                if let Some(reg) = self.sources.borrow_mut().get_mut(&id) {
                    reg.callback = callback;
                }
            }
        }
        Ok(())
    }
}
