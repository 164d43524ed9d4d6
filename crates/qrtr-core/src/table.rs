//! Per-node service table.
//!
//! Grounded on the historical node implementation's service list/index pair:
//! a flat, insertion-ordered list of announcements plus two indices kept in
//! lock-step — one by port (a `DEL_SERVER` names a port, never a service),
//! one by service id with its versions kept sorted ascending so "the current
//! instance of a service" is always the last entry.
//!
//! Invariants:
//! - I1: every entry in `by_port` and every entry in `by_service` refers to
//!   an `Rc<ServiceInfo>` also present in `entries`, and vice versa.
//! - I2: a port appears at most once across the whole table.
//! - I3: within a `by_service` bucket, entries are sorted by ascending
//!   `version`.
//! - I4: `lookup_port` returns the port of the last entry in a bucket, i.e.
//!   the highest-version instance of that service.

use std::collections::HashMap;
use std::rc::Rc;

/// A single `NEW_SERVER` announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub service: u32,
    pub port: u32,
    pub version: u32,
    pub instance: u32,
}

/// Dual-indexed table of the services a single node currently advertises.
#[derive(Debug, Default)]
pub struct ServiceTable {
    entries: Vec<Rc<ServiceInfo>>,
    by_port: HashMap<u32, Rc<ServiceInfo>>,
    by_service: HashMap<u32, Vec<Rc<ServiceInfo>>>,
}

impl ServiceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a `NEW_SERVER` announcement.
    ///
    /// A second announcement for an already-known port replaces the first
    /// entry in place (the kernel would not normally re-announce a live
    /// port, but re-publishing is harmless and keeps the table consistent).
    pub fn add_service(&mut self, info: ServiceInfo) {
        self.remove_port(info.port);

        let info = Rc::new(info);
        self.entries.push(info.clone());
        self.by_port.insert(info.port, info.clone());

        // `partition_point`, not `binary_search_by_key`: ties must insert
        // after all existing entries of the same version so the last-inserted
        // instance of a given version is also the last in the bucket (and
        // therefore the one `lookup_port` returns).
        let bucket = self.by_service.entry(info.service).or_default();
        let pos = bucket.partition_point(|e| e.version <= info.version);
        bucket.insert(pos, info);
    }

    /// Remove the entry for `port`, per a `DEL_SERVER` announcement.
    ///
    /// Returns the removed entry, or `None` if the port was unknown.
    pub fn remove_port(&mut self, port: u32) -> Option<Rc<ServiceInfo>> {
        let info = self.by_port.remove(&port)?;
        self.entries.retain(|e| e.port != port);
        if let Some(bucket) = self.by_service.get_mut(&info.service) {
            bucket.retain(|e| e.port != port);
            if bucket.is_empty() {
                self.by_service.remove(&info.service);
            }
        }
        Some(info)
    }

    /// Look up the service announced on `port`.
    pub fn lookup_service(&self, port: u32) -> Option<Rc<ServiceInfo>> {
        self.by_port.get(&port).cloned()
    }

    /// Look up the port of the highest-version instance of `service`.
    pub fn lookup_port(&self, service: u32) -> Option<u32> {
        self.by_service.get(&service)?.last().map(|e| e.port)
    }

    /// All announcements currently held, in publish order.
    pub fn entries(&self) -> &[Rc<ServiceInfo>] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
