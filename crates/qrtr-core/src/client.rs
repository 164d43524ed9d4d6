//! Per-`(node, port)` datagram channel.
//!
//! Grounded on the historical client object's public surface: a socket
//! independent of the control socket, `send`/`client-message`, and a
//! `peek_node`/`get_node`/`get_port` accessor trio.

use std::cell::Cell;
use std::rc::Rc;

use crate::error::{QrtrError, QrtrResult};
use crate::node::Node;
use crate::reactor::{EventLoop, RawSocket, SourceId};

/// A channel bound to a single node's port, independent of the control
/// socket.
pub struct Client {
    node: Rc<Node>,
    port: u32,
    socket: Rc<dyn RawSocket>,
    event_loop: Rc<dyn EventLoop>,
    source: Cell<Option<SourceId>>,
    closed: Cell<bool>,
    on_message: std::cell::RefCell<Option<Box<dyn FnMut(Vec<u8>)>>>,
}

impl Client {
    /// Open a channel to `node`'s `port`, registering the socket's fd with
    /// `event_loop` for incoming-datagram notification.
    pub fn new(
        node: Rc<Node>,
        port: u32,
        socket: Rc<dyn RawSocket>,
        event_loop: Rc<dyn EventLoop>,
    ) -> QrtrResult<Rc<Client>> {
        let client = Rc::new(Client {
            node,
            port,
            socket: socket.clone(),
            event_loop: event_loop.clone(),
            source: Cell::new(None),
            closed: Cell::new(false),
            on_message: std::cell::RefCell::new(None),
        });

        let fd = socket.as_raw_fd();
        let weak = Rc::downgrade(&client);
        let source = event_loop.register_readable(
            fd,
            Box::new(move || {
                if let Some(client) = weak.upgrade() {
                    client.on_readable();
                }
            }),
        );
        client.source.set(Some(source));

        Ok(client)
    }

    pub fn port(&self) -> u32 {
        self.port
    }

    pub fn node(&self) -> &Rc<Node> {
        &self.node
    }

    /// Register the callback invoked once per received datagram, in kernel
    /// delivery order. Replaces any previously registered callback.
    pub fn on_message(&self, cb: impl FnMut(Vec<u8>) + 'static) {
        *self.on_message.borrow_mut() = Some(Box::new(cb));
    }

    /// Send one datagram to the owning node's port. Datagram sockets either
    /// queue the whole message or fail — no partial sends.
    pub fn send(&self, bytes: &[u8]) -> QrtrResult<()> {
        if self.closed.get() {
            return Err(QrtrError::SocketIo(0));
        }
        self.socket.send_to(bytes, self.node.id(), self.port)?;
        Ok(())
    }

    fn on_readable(&self) {
        if self.closed.get() {
            return;
        }
        let mut buf = [0u8; 4096];
        match self.socket.recv_from(&mut buf) {
            Ok((n, _src_node, _src_port)) => {
                if let Some(cb) = self.on_message.borrow_mut().as_mut() {
                    cb(buf[..n].to_vec());
                }
            }
            Err(e) => {
                crate::qerror!("client socket error: {e}");
                self.close();
            }
        }
    }

    fn close(&self) {
        if self.closed.replace(true) {
            return;
        }
        if let Some(src) = self.source.take() {
            self.event_loop.unregister(src);
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.close();
    }
}
