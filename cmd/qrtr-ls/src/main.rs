//! QRTR node/service lister
//!
//! Opens a Bus against the live kernel QRTR bus and prints each node and
//! service as it is discovered, then keeps running so `DEL_SERVER`/new
//! arrivals show up too. Exits on socket error.
//!
//! Run: ./qrtr-ls [lookup_timeout_ms]

use std::process::ExitCode;
use std::time::Duration;

use qrtr::{uri_for_node, BusConfig, CancellationToken};

fn main() -> ExitCode {
    let lookup_timeout_ms: u32 = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);

    println!("=== qrtr-ls ===");
    println!("lookup_timeout_ms = {lookup_timeout_ms}\n");

    let config = BusConfig::new(lookup_timeout_ms);
    let bus = match qrtr::open(config, CancellationToken::dummy(), |ready| match ready {
        Ok(()) => println!("initial lookup settled"),
        Err(e) => eprintln!("initial lookup did not settle: {e}"),
    }) {
        Ok(bus) => bus,
        Err(e) => {
            eprintln!("failed to open bus: {e}");
            return ExitCode::FAILURE;
        }
    };

    println!("bus ready on local node {}\n", bus.local_node());

    bus.on_node_added(|node_id| {
        println!("+ node {node_id}  ({})", uri_for_node(node_id));
    });
    bus.on_node_removed(|node_id| {
        println!("- node {node_id}");
    });
    bus.on_service_added(|node_id, service| {
        println!("  + service 0x{service:x} on node {node_id}");
    });
    bus.on_service_removed(|node_id, service| {
        println!("  - service 0x{service:x} on node {node_id}");
    });

    println!("listening for QRTR announcements (Ctrl-C to exit)...\n");
    loop {
        if let Err(e) = bus.run_once(Some(Duration::from_secs(1))) {
            eprintln!("bus error: {e}");
            return ExitCode::FAILURE;
        }
        if bus.is_closed() {
            eprintln!("bus closed");
            return ExitCode::FAILURE;
        }
    }
}
