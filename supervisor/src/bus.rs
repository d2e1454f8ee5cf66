use common::status::{BeaconStatus, ValidatorStatus};
use service::model::DockerConfig;
use tokio::sync::broadcast;
use url::Url;

use crate::orchestrator::LocalBeaconParams;

const BUS_CAPACITY: usize = 1024;

/// Every observed fact in the system. Registries and long-running tasks
/// consume these; per-key publication order is observation order.
#[derive(Debug, Clone)]
pub enum Fact {
    BeaconAdded {
        url: Url,
        network: String,
        docker: Option<DockerConfig>,
        slot: u64,
        status: BeaconStatus,
        version: Option<String>,
    },
    /// Also the cancellation signal for the beacon's watcher.
    BeaconRemoved {
        url: Url,
    },
    SlotUpdated {
        url: Url,
        slot: u64,
    },
    EpochUpdated {
        url: Url,
        epoch: u64,
    },
    BeaconStatusUpdated {
        url: Url,
        status: BeaconStatus,
    },
    VersionUpdated {
        url: Url,
        version: String,
    },

    ValidatorAdded {
        pubkey: String,
        name: String,
        network: String,
        status: ValidatorStatus,
        balance: Option<i64>,
        beacon_nodes: Vec<String>,
    },
    /// Also the cancellation signal for the validator's balance updater.
    ValidatorRemoved {
        pubkey: String,
    },
    ValidatorStatusUpdated {
        pubkey: String,
        status: ValidatorStatus,
    },
    ValidatorBalanceUpdated {
        pubkey: String,
        balance: i64,
    },
    BeaconNodesStored {
        pubkey: String,
        nodes: Vec<String>,
    },
    /// Emitted by a beacon watcher on every epoch transition.
    BalanceRefresh {
        url: Url,
        slot: u64,
        epoch: u64,
    },

    ValidatorStartRequested {
        pubkey: String,
    },
    ValidatorStopRequested {
        pubkey: String,
    },
    ServiceStarted {
        pubkey: String,
    },
    ServiceStopped {
        pubkey: String,
    },

    InterchangePromptRequested {
        pubkey: String,
    },
    InterchangeSupplied {
        pubkey: String,
        path: String,
    },
    InterchangeSkipped {
        pubkey: String,
    },
    InterchangeCanceled {
        pubkey: String,
    },

    AttestationSigned {
        pubkey: String,
        slot: u64,
        committee_index: u64,
        block_root: String,
    },

    LocalBeaconRequested {
        params: LocalBeaconParams,
    },
    PullStarted,
    PullEnded,
    PullCancelled,
    DaemonOffline {
        offline: bool,
    },

    NotificationCreated {
        title: String,
        source: String,
    },
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Fact>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    pub fn publish(&self, fact: Fact) {
        log::debug!("fact: {fact:?}");
        // send only fails with no subscribers, which is fine
        let _ = self.tx.send(fact);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Fact> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
