//! Shared handles wired into both the service and the coordinator.

use crate::bus::EventBus;
use crate::config::Topology;
use crate::locks::KeyedLocks;
use crate::repository::CompositionRepository;
use costgraph_units::UnitRegistry;
use std::sync::Arc;

/// Everything a mutation or a cascade wave needs to reach.
///
/// Cloning is cheap; clones share the same repository, bus and locks.
#[derive(Clone)]
pub struct CascadeContext {
    pub repo: Arc<dyn CompositionRepository>,
    pub bus: Arc<dyn EventBus>,
    pub registry: Arc<UnitRegistry>,
    pub topology: Topology,
    pub locks: Arc<KeyedLocks>,
}

impl CascadeContext {
    pub fn new(
        repo: Arc<dyn CompositionRepository>,
        bus: Arc<dyn EventBus>,
        registry: Arc<UnitRegistry>,
        topology: Topology,
    ) -> Self {
        Self {
            repo,
            bus,
            registry,
            topology,
            locks: Arc::new(KeyedLocks::new()),
        }
    }
}

impl std::fmt::Debug for CascadeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CascadeContext")
            .field("units", &self.registry.len())
            .field("topology", &self.topology)
            .finish_non_exhaustive()
    }
}
