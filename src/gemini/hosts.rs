//! Virtual host table

use crate::state::DomainSet;
use std::collections::HashMap;

/// Lowercase host name to the port requests for it must carry
///
/// Built once before serving starts, read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct VirtualHostTable {
    ports: HashMap<String, u16>,
}

impl VirtualHostTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every domain maps to `listen_port`, except the onion address which
    /// maps to `onion_virtual_port`
    pub fn build(
        domains: &DomainSet,
        listen_port: u16,
        onion: Option<&str>,
        onion_virtual_port: u16,
    ) -> Self {
        let onion = onion.map(str::to_lowercase);
        let mut table = Self::new();
        for domain in domains.iter() {
            let port = if onion.as_deref() == Some(domain) {
                onion_virtual_port
            } else {
                listen_port
            };
            table.insert(domain, port);
        }
        table
    }

    pub fn insert(&mut self, host: &str, port: u16) {
        self.ports.insert(host.to_lowercase(), port);
    }

    /// Authoritative port for `host`, if the host is served
    pub fn port_for(&self, host: &str) -> Option<u16> {
        self.ports.get(&host.to_lowercase()).copied()
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }
}
