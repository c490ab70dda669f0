//! Start-up state model

use super::DomainSet;
use crate::config::Config;

/// Values learned during start-up and threaded into the listeners
///
/// Written once by the orchestrator, read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct StartupContext {
    /// Onion address reported by Tor, when the onion service is up
    pub onion_address: Option<String>,
}

impl StartupContext {
    pub fn new(onion_address: Option<String>) -> Self {
        Self { onion_address }
    }

    /// Configured names plus the onion address
    pub fn domains(&self, config: &Config) -> DomainSet {
        DomainSet::new(&config.gemini.domain_names, self.onion_address.as_deref())
    }
}
