//! Service registry
//!
//! Holds the set of operations the remote service currently advertises,
//! as learned through either transport. Contents are replaced wholesale on
//! each discovery cycle; stale entries after a disconnect are acceptable
//! because a lookup miss triggers rediscovery.

use dashmap::DashMap;

use lucie_core::error::BridgeError;
use lucie_core::traits::Transport;
use lucie_core::types::ServiceDescriptor;

/// Registry of advertised services, keyed by name
pub struct ServiceRegistry {
    services: DashMap<String, ServiceDescriptor>,
}

impl ServiceRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            services: DashMap::new(),
        }
    }

    /// Get a service by name
    pub fn get(&self, name: &str) -> Option<ServiceDescriptor> {
        self.services.get(name).map(|r| r.value().clone())
    }

    /// Whether a service is currently advertised
    pub fn contains(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    /// All advertised services, sorted by name
    pub fn list(&self) -> Vec<ServiceDescriptor> {
        let mut all: Vec<_> = self.services.iter().map(|r| r.value().clone()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Number of advertised services
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Rebuild the registry from whichever transport is active.
    ///
    /// Replaces contents wholesale, last writer wins per service name.
    /// Services the remote failed to resolve are simply absent, never
    /// tombstoned. Idempotent for an unchanged advertisement.
    pub async fn refresh(&self, transport: &dyn Transport) -> Result<usize, BridgeError> {
        let discovered = transport.list_services().await?;
        let count = discovered.len();

        self.services.clear();
        for service in discovered {
            self.services.insert(service.name.clone(), service);
        }

        tracing::debug!(
            services = count,
            transport = %transport.kind(),
            "service registry refreshed"
        );
        Ok(count)
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
