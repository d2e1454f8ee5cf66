use std::{collections::BTreeMap, sync::Arc, sync::RwLock};

use common::status::{BeaconStatus, ValidatorStatus};
use service::model::DockerConfig;
use tokio::task::JoinHandle;
use url::Url;

use crate::bus::{EventBus, Fact};

/// Observed state of one beacon node, keyed by URL.
#[derive(Debug, Clone)]
pub struct Beacon {
    pub url: Url,
    pub network: String,
    pub slot: u64,
    pub epoch: u64,
    pub status: BeaconStatus,
    pub version: Option<String>,
    pub docker: Option<DockerConfig>,
}

/// Observed state of one validator, keyed by public key. The first entry of
/// `beacon_nodes` is the primary beacon.
#[derive(Debug, Clone)]
pub struct Validator {
    pub pubkey: String,
    pub name: String,
    pub network: String,
    pub status: ValidatorStatus,
    pub balance: Option<i64>,
    pub beacon_nodes: Vec<String>,
    pub is_running: bool,
}

/// Fact-driven map of known beacons. Only `apply` mutates; readers get
/// snapshot clones.
pub struct BeaconRegistry {
    inner: RwLock<BTreeMap<String, Beacon>>,
}

impl BeaconRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn apply(&self, fact: &Fact) {
        let mut beacons = self.inner.write().expect("beacon registry lock poisoned");
        match fact {
            Fact::BeaconAdded {
                url,
                network,
                docker,
                slot,
                status,
                version,
            } => {
                beacons.insert(
                    url.to_string(),
                    Beacon {
                        url: url.clone(),
                        network: network.clone(),
                        slot: *slot,
                        epoch: 0,
                        status: *status,
                        version: version.clone(),
                        docker: docker.clone(),
                    },
                );
            }
            Fact::BeaconRemoved { url } => {
                beacons.remove(&url.to_string());
            }
            Fact::SlotUpdated { url, slot } => {
                if let Some(beacon) = beacons.get_mut(&url.to_string()) {
                    beacon.slot = *slot;
                }
            }
            Fact::EpochUpdated { url, epoch } => {
                if let Some(beacon) = beacons.get_mut(&url.to_string()) {
                    beacon.epoch = *epoch;
                }
            }
            Fact::BeaconStatusUpdated { url, status } => {
                if let Some(beacon) = beacons.get_mut(&url.to_string()) {
                    beacon.status = *status;
                }
            }
            Fact::VersionUpdated { url, version } => {
                if let Some(beacon) = beacons.get_mut(&url.to_string()) {
                    beacon.version = Some(version.clone());
                }
            }
            _ => {}
        }
    }

    pub fn get(&self, url: &Url) -> Option<Beacon> {
        self.inner
            .read()
            .expect("beacon registry lock poisoned")
            .get(&url.to_string())
            .cloned()
    }

    pub fn list(&self) -> Vec<Beacon> {
        self.inner
            .read()
            .expect("beacon registry lock poisoned")
            .values()
            .cloned()
            .collect()
    }
}

impl Default for BeaconRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Fact-driven map of known validators.
pub struct ValidatorRegistry {
    inner: RwLock<BTreeMap<String, Validator>>,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn apply(&self, fact: &Fact) {
        let mut validators = self.inner.write().expect("validator registry lock poisoned");
        match fact {
            Fact::ValidatorAdded {
                pubkey,
                name,
                network,
                status,
                balance,
                beacon_nodes,
            } => {
                validators.insert(
                    pubkey.clone(),
                    Validator {
                        pubkey: pubkey.clone(),
                        name: name.clone(),
                        network: network.clone(),
                        status: *status,
                        balance: *balance,
                        beacon_nodes: beacon_nodes.clone(),
                        is_running: false,
                    },
                );
            }
            Fact::ValidatorRemoved { pubkey } => {
                validators.remove(pubkey);
            }
            Fact::ValidatorStatusUpdated { pubkey, status } => {
                if let Some(validator) = validators.get_mut(pubkey) {
                    validator.status = *status;
                }
            }
            Fact::ValidatorBalanceUpdated { pubkey, balance } => {
                if let Some(validator) = validators.get_mut(pubkey) {
                    validator.balance = Some(*balance);
                }
            }
            Fact::BeaconNodesStored { pubkey, nodes } => {
                if let Some(validator) = validators.get_mut(pubkey) {
                    validator.beacon_nodes = nodes.clone();
                    if validator.beacon_nodes.is_empty() {
                        validator.status = ValidatorStatus::NoBeaconNode;
                    }
                }
            }
            Fact::ServiceStarted { pubkey } => {
                if let Some(validator) = validators.get_mut(pubkey) {
                    validator.is_running = true;
                }
            }
            Fact::ServiceStopped { pubkey } => {
                if let Some(validator) = validators.get_mut(pubkey) {
                    validator.is_running = false;
                }
            }
            _ => {}
        }
    }

    pub fn get(&self, pubkey: &str) -> Option<Validator> {
        self.inner
            .read()
            .expect("validator registry lock poisoned")
            .get(pubkey)
            .cloned()
    }

    pub fn list(&self) -> Vec<Validator> {
        self.inner
            .read()
            .expect("validator registry lock poisoned")
            .values()
            .cloned()
            .collect()
    }
}

impl Default for ValidatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Single writer for both registries: consumes the bus and applies facts in
/// receipt order.
pub fn spawn_apply(
    bus: &EventBus,
    beacons: Arc<BeaconRegistry>,
    validators: Arc<ValidatorRegistry>,
) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(fact) => {
                    beacons.apply(&fact);
                    validators.apply(&fact);
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    log::warn!("Registry apply lagged by {missed} facts");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
