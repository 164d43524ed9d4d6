//! Platform-agnostic QRTR bus logic: wire codec, node/service registry,
//! debounced publish state machine, `wait_for_node`, and the per-port
//! client channel. No syscalls live here — `qrtr-runtime` supplies the
//! `RawSocket`/`EventLoop`/`TimerDriver` implementations this crate's types
//! are built against.

pub mod bus;
pub mod cancel;
pub mod client;
pub mod config;
pub mod env;
pub mod error;
pub mod kprint;
pub mod node;
pub mod reactor;
pub mod table;
pub mod timer;
pub mod uri;
pub mod wire;

pub use bus::Bus;
pub use cancel::CancellationToken;
pub use client::Client;
pub use config::BusConfig;
pub use error::{QrtrError, QrtrResult};
pub use node::Node;
pub use reactor::{EventLoop, RawSocket, SourceId};
pub use table::{ServiceInfo, ServiceTable};
pub use timer::{HeapTimerDriver, TimerDriver, TimerEntry, TimerHandle, TimerKind};
pub use uri::{node_for_uri, uri_for_node};
