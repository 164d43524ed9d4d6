//! The Bus: control socket owner, packet dispatch, node registry, debounced
//! publish state machine, and `wait_for_node`.
//!
//! Grounded on the historical control-socket/bus implementation's structure
//! and signal surface, reshaped onto [`crate::timer`]/[`crate::cancel`]/
//! [`crate::reactor`] instead of GObject signals and a GLib main loop. The
//! historical constructor is callback-based (`qrtr_bus_new(timeout,
//! cancellable, callback, user_data)`), which this follows directly rather
//! than reaching for an async runtime this codebase's stack does not carry.
//!
//! `Bus::new` always returns the constructed `Rc<Bus>` synchronously — the
//! socket is bound and `NEW_LOOKUP` is already sent by the time it returns.
//! `on_ready` is a separate, purely informational one-shot: it fires when
//! the initial-lookup gate settles (immediately, with `Ok(())`, if no gate
//! is configured; later, from the event loop, with `Ok(())` on quiet-period
//! settle or `Err` on timeout/cancellation, if one is). The caller does not
//! need to wait on it to start calling [`Bus::run_once`] — a bus with a
//! pending gate is already fully able to pump its own control socket.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::cancel::CancellationToken;
use crate::error::{QrtrError, QrtrResult};
use crate::node::Node;
use crate::reactor::{EventLoop, RawSocket, SourceId};
use crate::table::ServiceInfo;
use crate::timer::{TimerDriver, TimerHandle, TimerKind, PUBLISH_TIMEOUT_MS};
use crate::wire::{CtrlPacket, QRTR_PORT_CTRL, QRTR_TYPE_DEL_SERVER, QRTR_TYPE_NEW_SERVER};
use crate::{qerror, qwarn};

type ReadyCallback = Box<dyn FnOnce(QrtrResult<()>)>;
type NodeCallback = Box<dyn FnOnce(QrtrResult<Rc<Node>>)>;

struct Waiter {
    id: u64,
    timer_handle: Option<TimerHandle>,
    cancel: CancellationToken,
    on_complete: RefCell<Option<NodeCallback>>,
}

struct InitialGate {
    on_ready: RefCell<Option<ReadyCallback>>,
    deadline_handle: TimerHandle,
    idle_handle: Cell<Option<TimerHandle>>,
    cancel: CancellationToken,
}

/// Owns the control socket and the node registry for one QRTR bus.
pub struct Bus {
    socket: Rc<dyn RawSocket>,
    event_loop: Rc<dyn EventLoop>,
    timers: Rc<dyn TimerDriver>,
    local_node: u32,
    control_source: Cell<Option<SourceId>>,
    nodes: RefCell<HashMap<u32, Rc<Node>>>,
    debounce_timers: RefCell<HashMap<u32, TimerHandle>>,
    waiters: RefCell<HashMap<u32, Vec<Waiter>>>,
    next_waiter_id: Cell<u64>,
    gate: RefCell<Option<InitialGate>>,
    node_added: RefCell<Vec<Box<dyn Fn(u32)>>>,
    node_removed: RefCell<Vec<Box<dyn Fn(u32)>>>,
    service_added: RefCell<Vec<Box<dyn Fn(u32, u32)>>>,
    service_removed: RefCell<Vec<Box<dyn Fn(u32, u32)>>>,
    closed: Cell<bool>,
}

impl Bus {
    /// Construct a Bus over an already-created socket/event-loop/timer
    /// backend. Sends the initial `NEW_LOOKUP` before returning and hands
    /// back the constructed `Rc<Bus>` synchronously — it is immediately
    /// valid to call [`Bus::run_once`] on the result, whether or not an
    /// initial-lookup gate is pending.
    ///
    /// If `lookup_timeout_ms` (from `config`) is zero, `on_ready` is called
    /// synchronously, within this call, with `Ok(())`. Otherwise `on_ready`
    /// fires later, from inside [`Bus::run_once`], with `Ok(())` once the
    /// control socket has gone quiet for one debounce interval after at
    /// least one reply, or with `Err(LookupTimeout)` if the configured
    /// timeout elapses first.
    pub fn new(
        config: crate::config::BusConfig,
        socket: Rc<dyn RawSocket>,
        event_loop: Rc<dyn EventLoop>,
        timers: Rc<dyn TimerDriver>,
        cancel: CancellationToken,
        on_ready: impl FnOnce(QrtrResult<()>) + 'static,
    ) -> QrtrResult<Rc<Bus>> {
        let (local_node, _local_port) = socket.local_address()?;

        let bus = Rc::new(Bus {
            socket: socket.clone(),
            event_loop: event_loop.clone(),
            timers,
            local_node,
            control_source: Cell::new(None),
            nodes: RefCell::new(HashMap::new()),
            debounce_timers: RefCell::new(HashMap::new()),
            waiters: RefCell::new(HashMap::new()),
            next_waiter_id: Cell::new(0),
            gate: RefCell::new(None),
            node_added: RefCell::new(Vec::new()),
            node_removed: RefCell::new(Vec::new()),
            service_added: RefCell::new(Vec::new()),
            service_removed: RefCell::new(Vec::new()),
            closed: Cell::new(false),
        });

        let fd = socket.as_raw_fd();
        let weak = Rc::downgrade(&bus);
        let source = event_loop.register_readable(
            fd,
            Box::new(move || {
                if let Some(bus) = weak.upgrade() {
                    bus.on_control_readable();
                }
            }),
        );
        bus.control_source.set(Some(source));

        let lookup = CtrlPacket::new_lookup();
        if let Err(e) = bus.socket.send_to(&lookup.encode(), local_node, QRTR_PORT_CTRL) {
            bus.teardown();
            return Err(e);
        }

        if config.lookup_timeout_ms == 0 {
            on_ready(Ok(()));
            return Ok(bus);
        }

        if cancel.is_cancelled() {
            bus.teardown();
            on_ready(Err(QrtrError::Cancelled));
            return Ok(bus);
        }

        let deadline_handle = bus.timers.insert(
            Duration::from_millis(config.lookup_timeout_ms as u64),
            TimerKind::InitialGateDeadline { waited_ms: config.lookup_timeout_ms },
        );
        *bus.gate.borrow_mut() = Some(InitialGate {
            on_ready: RefCell::new(Some(Box::new(on_ready))),
            deadline_handle,
            idle_handle: Cell::new(None),
            cancel,
        });

        Ok(bus)
    }

    pub fn local_node(&self) -> u32 {
        self.local_node
    }

    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }

    // ---- registry queries ----

    /// Look up a node without transferring ownership semantics beyond a
    /// shared reference. Unpublished nodes (pending debounce) are invisible.
    pub fn peek_node(&self, node_id: u32) -> Option<Rc<Node>> {
        self.nodes
            .borrow()
            .get(&node_id)
            .filter(|n| n.is_published())
            .cloned()
    }

    pub fn get_node(&self, node_id: u32) -> Option<Rc<Node>> {
        self.peek_node(node_id)
    }

    pub fn peek_nodes(&self) -> Vec<Rc<Node>> {
        self.nodes
            .borrow()
            .values()
            .filter(|n| n.is_published())
            .cloned()
            .collect()
    }

    pub fn get_nodes(&self) -> Vec<Rc<Node>> {
        self.peek_nodes()
    }

    // ---- event subscription ----

    pub fn on_node_added(&self, cb: impl Fn(u32) + 'static) {
        self.node_added.borrow_mut().push(Box::new(cb));
    }

    pub fn on_node_removed(&self, cb: impl Fn(u32) + 'static) {
        self.node_removed.borrow_mut().push(Box::new(cb));
    }

    pub fn on_service_added(&self, cb: impl Fn(u32, u32) + 'static) {
        self.service_added.borrow_mut().push(Box::new(cb));
    }

    pub fn on_service_removed(&self, cb: impl Fn(u32, u32) + 'static) {
        self.service_removed.borrow_mut().push(Box::new(cb));
    }

    fn fire_node_added(&self, node_id: u32) {
        for cb in self.node_added.borrow().iter() {
            cb(node_id);
        }
    }

    fn fire_node_removed(&self, node_id: u32) {
        for cb in self.node_removed.borrow().iter() {
            cb(node_id);
        }
    }

    fn fire_service_added(&self, node_id: u32, service: u32) {
        for cb in self.service_added.borrow().iter() {
            cb(node_id, service);
        }
    }

    fn fire_service_removed(&self, node_id: u32, service: u32) {
        for cb in self.service_removed.borrow().iter() {
            cb(node_id, service);
        }
    }

    // ---- wait_for_node ----

    /// Asynchronous one-shot wait for a node to become visible.
    ///
    /// `timeout_ms == 0` means wait indefinitely. Exactly one of
    /// `{node-delivered, timeout, cancelled}` invokes `on_complete`.
    pub fn wait_for_node(
        &self,
        node_id: u32,
        timeout_ms: u32,
        cancel: CancellationToken,
        on_complete: impl FnOnce(QrtrResult<Rc<Node>>) + 'static,
    ) {
        if cancel.is_cancelled() {
            on_complete(Err(QrtrError::Cancelled));
            return;
        }

        if let Some(node) = self.peek_node(node_id) {
            on_complete(Ok(node));
            return;
        }

        let id = self.next_waiter_id.get();
        self.next_waiter_id.set(id + 1);

        let timer_handle = if timeout_ms > 0 {
            Some(
                self.timers
                    .insert(Duration::from_millis(timeout_ms as u64), TimerKind::WaitTimeout { waiter_id: id }),
            )
        } else {
            None
        };

        let waiter = Waiter {
            id,
            timer_handle,
            cancel,
            on_complete: RefCell::new(Some(Box::new(on_complete))),
        };
        self.waiters.borrow_mut().entry(node_id).or_default().push(waiter);
    }

    fn complete_waiters_for(&self, node_id: u32, node: &Rc<Node>) {
        let list = self.waiters.borrow_mut().remove(&node_id).unwrap_or_default();
        for waiter in list {
            self.resolve_waiter(waiter, Ok(node.clone()));
        }
    }

    fn resolve_waiter(&self, waiter: Waiter, result: QrtrResult<Rc<Node>>) {
        if let Some(handle) = waiter.timer_handle {
            self.timers.cancel(handle);
        }
        let result = if waiter.cancel.is_cancelled() {
            Err(QrtrError::Cancelled)
        } else {
            result
        };
        if let Some(cb) = waiter.on_complete.borrow_mut().take() {
            cb(result);
        }
    }

    fn handle_wait_timeout(&self, waiter_id: u64) {
        let extracted = {
            let mut waiters = self.waiters.borrow_mut();
            let mut found = None;
            let mut empty_key = None;
            for (node_id, list) in waiters.iter_mut() {
                if let Some(pos) = list.iter().position(|w| w.id == waiter_id) {
                    found = Some(list.remove(pos));
                    if list.is_empty() {
                        empty_key = Some(*node_id);
                    }
                    break;
                }
            }
            if let Some(key) = empty_key {
                waiters.remove(&key);
            }
            found
        };
        if let Some(waiter) = extracted {
            self.resolve_waiter(waiter, Err(QrtrError::TimedOut));
        }
    }

    // ---- control socket dispatch ----

    fn on_control_readable(self: &Rc<Self>) {
        if self.closed.get() {
            return;
        }
        let mut buf = [0u8; 256];
        match self.socket.recv_from(&mut buf) {
            Ok((n, _src_node, _src_port)) => {
                self.note_gate_packet();
                match CtrlPacket::decode(&buf[..n]) {
                    Some(pkt) => self.dispatch_packet(pkt),
                    None => qwarn!("{}, ignoring", QrtrError::ShortPacket { len: n }),
                }
            }
            Err(e) => {
                qerror!("control socket error: {e}");
                self.teardown();
            }
        }
    }

    fn dispatch_packet(&self, pkt: CtrlPacket) {
        crate::kprint::set_context(pkt.node);
        let (version, instance) = pkt.version_instance();
        match pkt.cmd {
            QRTR_TYPE_NEW_SERVER => {
                self.add_service(pkt.node, pkt.port, pkt.service, version, instance);
            }
            QRTR_TYPE_DEL_SERVER => {
                self.remove_service(pkt.node, pkt.port, pkt.service);
            }
            other => qwarn!("ignoring {}", QrtrError::UnknownCmd(other)),
        }
        crate::kprint::clear_context();
    }

    fn add_service(&self, node_id: u32, port: u32, service: u32, version: u32, instance: u32) {
        let is_new = !self.nodes.borrow().contains_key(&node_id);
        if is_new {
            self.nodes.borrow_mut().insert(node_id, Rc::new(Node::new(node_id)));
        }
        let node = self.nodes.borrow().get(&node_id).cloned().expect("just inserted");
        node.table_mut().add_service(ServiceInfo { service, port, version, instance });
        self.fire_service_added(node_id, service);

        if !node.is_published() {
            self.reschedule_debounce(node_id);
        }
    }

    fn remove_service(&self, node_id: u32, port: u32, _service_hint: u32) {
        let node = match self.nodes.borrow().get(&node_id).cloned() {
            Some(n) => n,
            None => {
                qwarn!("DEL_SERVER for unknown node {node_id}");
                return;
            }
        };

        let removed = match node.table_mut().remove_port(port) {
            Some(r) => r,
            None => {
                qwarn!("{}", QrtrError::UnknownPort(port));
                return;
            }
        };
        self.fire_service_removed(node_id, removed.service);

        if !node.has_services() {
            let was_published = node.is_published();
            self.cancel_debounce(node_id);
            self.nodes.borrow_mut().remove(&node_id);
            if was_published {
                node.fire_removed();
                self.fire_node_removed(node_id);
            }
        }
    }

    fn reschedule_debounce(&self, node_id: u32) {
        let mut timers = self.debounce_timers.borrow_mut();
        if let Some(old) = timers.remove(&node_id) {
            self.timers.cancel(old);
        }
        let handle = self
            .timers
            .insert(Duration::from_millis(PUBLISH_TIMEOUT_MS), TimerKind::Debounce { node_id });
        timers.insert(node_id, handle);
    }

    fn cancel_debounce(&self, node_id: u32) {
        if let Some(h) = self.debounce_timers.borrow_mut().remove(&node_id) {
            self.timers.cancel(h);
        }
    }

    fn handle_debounce_fire(&self, node_id: u32) {
        self.debounce_timers.borrow_mut().remove(&node_id);
        let node = match self.nodes.borrow().get(&node_id).cloned() {
            Some(n) => n,
            None => return,
        };
        if node.is_published() {
            return;
        }
        node.mark_published();
        self.fire_node_added(node_id);
        self.complete_waiters_for(node_id, &node);
    }

    // ---- initial-lookup gate ----

    fn note_gate_packet(self: &Rc<Self>) {
        let gate_ref = self.gate.borrow();
        if let Some(gate) = gate_ref.as_ref() {
            if let Some(old) = gate.idle_handle.take() {
                self.timers.cancel(old);
            }
            let h = self.timers.insert(Duration::from_millis(PUBLISH_TIMEOUT_MS), TimerKind::InitialGateIdle);
            gate.idle_handle.set(Some(h));
        }
    }

    fn handle_gate_idle(self: &Rc<Self>) {
        let gate = self.gate.borrow_mut().take();
        if let Some(gate) = gate {
            self.timers.cancel(gate.deadline_handle);
            if let Some(cb) = gate.on_ready.borrow_mut().take() {
                let result = if gate.cancel.is_cancelled() {
                    Err(QrtrError::Cancelled)
                } else {
                    Ok(())
                };
                cb(result);
            }
        }
    }

    fn handle_gate_deadline(self: &Rc<Self>, waited_ms: u32) {
        let gate = self.gate.borrow_mut().take();
        if let Some(gate) = gate {
            if let Some(idle) = gate.idle_handle.take() {
                self.timers.cancel(idle);
            }
            if let Some(cb) = gate.on_ready.borrow_mut().take() {
                cb(Err(QrtrError::LookupTimeout { waited_ms }));
            }
        }
    }

    // ---- event loop pump ----

    /// Drive one iteration of the underlying event loop, then process any
    /// expired timers. `timeout` caps how long this call may block; a
    /// pending timer deadline further bounds it automatically.
    pub fn run_once(self: &Rc<Self>, timeout: Option<Duration>) -> QrtrResult<()> {
        let now = Instant::now();
        let timer_wait = self.timers.next_deadline().map(|d| d.saturating_duration_since(now));
        let effective = match (timeout, timer_wait) {
            (Some(t), Some(n)) => Some(t.min(n)),
            (Some(t), None) => Some(t),
            (None, Some(n)) => Some(n),
            (None, None) => None,
        };

        self.event_loop.run_once(effective)?;
        self.process_timers(Instant::now());
        self.reap_cancelled_waiters();
        Ok(())
    }

    /// Resolve any waiter whose token was cancelled since it was registered.
    ///
    /// A waiter with `timeout_ms == 0` has no timer and only ever hears about
    /// node-added events for its own node id, so without this sweep a caller
    /// cancelling an indefinite wait would never see its callback fire.
    fn reap_cancelled_waiters(&self) {
        let mut cancelled = Vec::new();
        {
            let mut waiters = self.waiters.borrow_mut();
            let mut empty_keys = Vec::new();
            for (node_id, list) in waiters.iter_mut() {
                let mut i = 0;
                while i < list.len() {
                    if list[i].cancel.is_cancelled() {
                        cancelled.push(list.remove(i));
                    } else {
                        i += 1;
                    }
                }
                if list.is_empty() {
                    empty_keys.push(*node_id);
                }
            }
            for key in empty_keys {
                waiters.remove(&key);
            }
        }
        for waiter in cancelled {
            self.resolve_waiter(waiter, Err(QrtrError::Cancelled));
        }
    }

    fn process_timers(self: &Rc<Self>, now: Instant) {
        let fired = self.timers.poll_expired(now);
        for entry in fired {
            match entry.kind {
                TimerKind::Debounce { node_id } => self.handle_debounce_fire(node_id),
                TimerKind::WaitTimeout { waiter_id } => self.handle_wait_timeout(waiter_id),
                TimerKind::InitialGateIdle => self.handle_gate_idle(),
                TimerKind::InitialGateDeadline { waited_ms } => self.handle_gate_deadline(waited_ms),
            }
        }
    }

    fn teardown(&self) {
        if self.closed.replace(true) {
            return;
        }
        if let Some(src) = self.control_source.take() {
            self.event_loop.unregister(src);
        }
        for (_, h) in self.debounce_timers.borrow_mut().drain() {
            self.timers.cancel(h);
        }
        if let Some(gate) = self.gate.borrow_mut().take() {
            self.timers.cancel(gate.deadline_handle);
            if let Some(h) = gate.idle_handle.take() {
                self.timers.cancel(h);
            }
        }
    }
}

impl Drop for Bus {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeSocket {
        local: (u32, u32),
        sent: RefCell<Vec<Vec<u8>>>,
        inbox: RefCell<std::collections::VecDeque<Vec<u8>>>,
    }

    impl RawSocket for FakeSocket {
        fn send_to(&self, buf: &[u8], _node: u32, _port: u32) -> QrtrResult<usize> {
            self.sent.borrow_mut().push(buf.to_vec());
            Ok(buf.len())
        }

        fn recv_from(&self, buf: &mut [u8]) -> QrtrResult<(usize, u32, u32)> {
            match self.inbox.borrow_mut().pop_front() {
                Some(datagram) => {
                    let n = datagram.len().min(buf.len());
                    buf[..n].copy_from_slice(&datagram[..n]);
                    Ok((n, 0, QRTR_PORT_CTRL))
                }
                None => Err(QrtrError::SocketIo(11)), // EAGAIN
            }
        }

        fn local_address(&self) -> QrtrResult<(u32, u32)> {
            Ok(self.local)
        }

        fn as_raw_fd(&self) -> i32 {
            42
        }
    }

    struct FakeEventLoop;

    impl EventLoop for FakeEventLoop {
        fn register_readable(&self, _fd: i32, _callback: Box<dyn FnMut()>) -> SourceId {
            SourceId::from_raw(1)
        }
        fn unregister(&self, _id: SourceId) {}
        fn run_once(&self, _timeout: Option<Duration>) -> QrtrResult<()> {
            Ok(())
        }
    }

    fn make_bus() -> Rc<Bus> {
        let socket = Rc::new(FakeSocket {
            local: (5, 1),
            sent: RefCell::new(Vec::new()),
            inbox: RefCell::new(std::collections::VecDeque::new()),
        });
        let event_loop: Rc<dyn EventLoop> = Rc::new(FakeEventLoop);
        let timers: Rc<dyn TimerDriver> = Rc::new(crate::timer::HeapTimerDriver::new());
        Bus::new(
            crate::config::BusConfig::default(),
            socket,
            event_loop,
            timers,
            CancellationToken::dummy(),
            |_ready| {},
        )
        .unwrap()
    }

    #[test]
    fn test_construction_sends_new_lookup() {
        let bus = make_bus();
        assert_eq!(bus.local_node(), 5);
    }

    #[test]
    fn test_add_service_creates_unpublished_node() {
        let bus = make_bus();
        bus.add_service(7, 100, 0x42, 1, 0);
        assert!(bus.peek_node(7).is_none(), "unpublished nodes stay hidden");
    }

    #[test]
    fn test_debounce_fire_publishes_node() {
        let bus = make_bus();
        bus.add_service(7, 100, 0x42, 1, 0);
        bus.handle_debounce_fire(7);
        let node = bus.peek_node(7).expect("published");
        assert_eq!(node.lookup_port(0x42), Some(100));
    }

    #[test]
    fn test_remove_last_service_reaps_published_node() {
        let bus = make_bus();
        bus.add_service(7, 100, 0x42, 1, 0);
        bus.handle_debounce_fire(7);
        bus.remove_service(7, 100, 0x42);
        assert!(bus.peek_node(7).is_none());
    }

    #[test]
    fn test_remove_unknown_port_is_noop() {
        let bus = make_bus();
        bus.add_service(7, 100, 0x42, 1, 0);
        bus.handle_debounce_fire(7);
        bus.remove_service(7, 999, 0x42);
        assert!(bus.peek_node(7).is_some());
    }

    #[test]
    fn test_wait_for_node_immediate_when_already_published() {
        let bus = make_bus();
        bus.add_service(7, 100, 0x42, 1, 0);
        bus.handle_debounce_fire(7);

        let got = Rc::new(RefCell::new(None));
        let got_clone = got.clone();
        bus.wait_for_node(7, 0, CancellationToken::dummy(), move |r| {
            *got_clone.borrow_mut() = Some(r);
        });
        assert!(got.borrow().as_ref().unwrap().is_ok());
    }

    #[test]
    fn test_wait_for_node_completes_on_publish() {
        let bus = make_bus();
        let got = Rc::new(RefCell::new(None));
        let got_clone = got.clone();
        bus.wait_for_node(7, 1000, CancellationToken::dummy(), move |r| {
            *got_clone.borrow_mut() = Some(r);
        });
        assert!(got.borrow().is_none());

        bus.add_service(7, 100, 0x42, 1, 0);
        bus.handle_debounce_fire(7);
        assert!(got.borrow().as_ref().unwrap().is_ok());
    }

    #[test]
    fn test_wait_for_node_timeout() {
        let bus = make_bus();
        let got = Rc::new(RefCell::new(None));
        let got_clone = got.clone();
        bus.wait_for_node(99, 50, CancellationToken::dummy(), move |r| {
            *got_clone.borrow_mut() = Some(r);
        });
        bus.handle_wait_timeout(0);
        assert!(matches!(got.borrow().as_ref().unwrap(), Err(QrtrError::TimedOut)));
    }

    #[test]
    fn test_wait_for_node_cancelled_before_registration() {
        let bus = make_bus();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let got = Rc::new(RefCell::new(None));
        let got_clone = got.clone();
        bus.wait_for_node(99, 1000, cancel, move |r| {
            *got_clone.borrow_mut() = Some(r);
        });
        assert!(matches!(got.borrow().as_ref().unwrap(), Err(QrtrError::Cancelled)));
    }

    #[test]
    fn test_wait_for_node_cancelled_after_registration_has_no_timer() {
        let bus = make_bus();
        let cancel = CancellationToken::new();
        let got = Rc::new(RefCell::new(None));
        let got_clone = got.clone();
        bus.wait_for_node(99, 0, cancel.clone(), move |r| {
            *got_clone.borrow_mut() = Some(r);
        });
        assert!(got.borrow().is_none(), "indefinite waiter has no timer to fire");

        cancel.cancel();
        bus.reap_cancelled_waiters();
        assert!(matches!(got.borrow().as_ref().unwrap(), Err(QrtrError::Cancelled)));
        assert!(bus.waiters.borrow().is_empty());
    }

    #[test]
    fn test_short_packet_ignored_via_dispatch() {
        let bus = make_bus();
        // Decoding directly exercises the same path on_control_readable would.
        assert!(CtrlPacket::decode(&[1, 2, 3]).is_none());
        assert!(bus.get_nodes().is_empty());
    }

    #[test]
    fn test_nonzero_timeout_returns_bus_synchronously() {
        // The caller must get a pumpable `Rc<Bus>` back immediately even when
        // an initial-lookup gate is pending — otherwise nothing could ever
        // drive the gate to completion.
        let socket = Rc::new(FakeSocket {
            local: (5, 1),
            sent: RefCell::new(Vec::new()),
            inbox: RefCell::new(std::collections::VecDeque::new()),
        });
        let event_loop: Rc<dyn EventLoop> = Rc::new(FakeEventLoop);
        let timers: Rc<dyn TimerDriver> = Rc::new(crate::timer::HeapTimerDriver::new());
        let ready_fired = Rc::new(Cell::new(false));
        let ready_fired_clone = ready_fired.clone();
        let bus = Bus::new(
            crate::config::BusConfig::new(1000),
            socket,
            event_loop,
            timers,
            CancellationToken::dummy(),
            move |_r| ready_fired_clone.set(true),
        )
        .unwrap();
        assert_eq!(bus.local_node(), 5);
        assert!(!ready_fired.get(), "on_ready must not fire before the gate settles");
    }

    fn make_bus_with_timeout(
        timeout_ms: u32,
        on_ready: impl FnOnce(QrtrResult<()>) + 'static,
    ) -> Rc<Bus> {
        let socket = Rc::new(FakeSocket {
            local: (5, 1),
            sent: RefCell::new(Vec::new()),
            inbox: RefCell::new(std::collections::VecDeque::new()),
        });
        let event_loop: Rc<dyn EventLoop> = Rc::new(FakeEventLoop);
        let timers: Rc<dyn TimerDriver> = Rc::new(crate::timer::HeapTimerDriver::new());
        Bus::new(
            crate::config::BusConfig::new(timeout_ms),
            socket,
            event_loop,
            timers,
            CancellationToken::dummy(),
            on_ready,
        )
        .unwrap()
    }

    #[test]
    fn test_gate_idle_fires_on_ready_ok() {
        let got = Rc::new(RefCell::new(None));
        let got_clone = got.clone();
        let bus = make_bus_with_timeout(1000, move |r| *got_clone.borrow_mut() = Some(r));
        assert!(got.borrow().is_none(), "on_ready must not fire before the gate settles");
        bus.handle_gate_idle();
        assert!(matches!(got.borrow().as_ref(), Some(Ok(()))));
    }

    #[test]
    fn test_gate_deadline_fires_on_ready_timeout() {
        let got = Rc::new(RefCell::new(None));
        let got_clone = got.clone();
        let bus = make_bus_with_timeout(50, move |r| *got_clone.borrow_mut() = Some(r));
        bus.handle_gate_deadline(50);
        assert!(matches!(
            got.borrow().as_ref(),
            Some(Err(QrtrError::LookupTimeout { waited_ms: 50 }))
        ));
        // Idempotent: the gate was already consumed, a second fire is a no-op.
        bus.handle_gate_deadline(50);
    }
}
