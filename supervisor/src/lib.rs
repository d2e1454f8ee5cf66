use std::sync::Arc;

use client::ClientFactory;
use docker::ContainerRuntime;
use service::Store;

pub mod bootstrap;
pub mod bus;
pub mod effectiveness;
pub mod lifecycle;
pub mod metrics;
pub mod orchestrator;
pub mod registry;
pub mod signing;
pub mod status;
pub mod watcher;

#[cfg(test)]
pub(crate) mod testutil;

use bus::EventBus;
use effectiveness::EffectivenessTracker;
use lifecycle::ValidatorLifecycle;
use orchestrator::LocalNodeOrchestrator;
use registry::{BeaconRegistry, ValidatorRegistry};
use watcher::HeadWatcher;

/// Shared wiring for every long-running task the supervisor spawns.
pub struct Supervisor {
    pub bus: EventBus,
    pub beacons: Arc<BeaconRegistry>,
    pub validators: Arc<ValidatorRegistry>,
    pub clients: Arc<dyn ClientFactory>,
    pub runtime: Arc<dyn ContainerRuntime>,
    pub store: Arc<dyn Store>,
    pub lifecycle: Arc<ValidatorLifecycle>,
    pub orchestrator: Arc<LocalNodeOrchestrator>,
}

impl Supervisor {
    pub fn watcher(&self) -> HeadWatcher {
        HeadWatcher {
            bus: self.bus.clone(),
            beacons: self.beacons.clone(),
            clients: self.clients.clone(),
            runtime: self.runtime.clone(),
        }
    }

    pub fn effectiveness_tracker(&self) -> EffectivenessTracker {
        EffectivenessTracker {
            bus: self.bus.clone(),
            validators: self.validators.clone(),
            clients: self.clients.clone(),
            store: self.store.clone(),
        }
    }
}
