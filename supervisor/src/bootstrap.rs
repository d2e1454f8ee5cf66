use std::{
    collections::HashSet,
    sync::Arc,
    time::Duration,
};

use anyhow::Result;
use common::status::{BeaconStatus, ValidatorStatus};
use service::model::{StoredBeacon, StoredValidator};
use tokio::sync::broadcast;
use url::Url;

use crate::{
    bus::Fact,
    status,
    watcher::SYNC_DISTANCE_THRESHOLD,
    Supervisor,
};

const DAEMON_POLL_DELAY: Duration = Duration::from_secs(5);

/// Rebuilds runtime state from the store on startup: relaunches local node
/// containers, probes every stored beacon and validator and announces them on
/// the bus. The dispatcher then spawns their tasks.
pub async fn bootstrap(deps: &Arc<Supervisor>) -> Result<()> {
    let stored = deps.store.get_beacons().await?;
    log::info!("Found {} stored beacon node(s)", stored.len());

    if stored.iter().any(|beacon| beacon.docker.is_some()) {
        wait_for_daemon(deps).await;
        for beacon in &stored {
            if let Some(docker) = &beacon.docker {
                if let Err(err) = deps.runtime.restart_container(&docker.container_name).await {
                    log::error!("Failed to start container {}: {err:#}", docker.container_name);
                }
            }
        }
    }

    let probes =
        futures_util::future::join_all(stored.iter().map(|beacon| probe_beacon(deps, beacon)))
            .await;
    for (beacon, probe) in stored.into_iter().zip(probes) {
        let url = match Url::parse(&beacon.url) {
            Ok(url) => url,
            Err(err) => {
                log::error!("Skipping stored beacon with invalid URL {}: {err}", beacon.url);
                continue;
            }
        };
        deps.bus.publish(Fact::BeaconAdded {
            url,
            network: probe.network,
            docker: beacon.docker,
            slot: probe.slot,
            status: probe.status,
            version: probe.version,
        });
    }

    for validator in deps.store.get_validators().await? {
        let nodes = deps.store.get_beacon_nodes(&validator.pubkey).await?;
        let (status, balance) = probe_validator(deps, &validator, &nodes).await;
        deps.bus.publish(Fact::ValidatorAdded {
            pubkey: validator.pubkey,
            name: validator.name,
            network: validator.network,
            status,
            balance,
            beacon_nodes: nodes,
        });
    }
    Ok(())
}

struct BeaconProbe {
    slot: u64,
    status: BeaconStatus,
    network: String,
    version: Option<String>,
}

async fn probe_beacon(deps: &Arc<Supervisor>, beacon: &StoredBeacon) -> BeaconProbe {
    let offline = |network: &str| BeaconProbe {
        slot: 0,
        status: BeaconStatus::Offline,
        network: network.to_string(),
        version: None,
    };
    let url = match Url::parse(&beacon.url) {
        Ok(url) => url,
        Err(_) => return offline(&beacon.network),
    };
    let client = deps.clients.create(&url);
    let (slot, status) = match client.get_syncing_status().await {
        Ok(syncing) => (
            syncing.head_slot,
            if syncing.sync_distance > SYNC_DISTANCE_THRESHOLD {
                BeaconStatus::Syncing
            } else {
                BeaconStatus::Active
            },
        ),
        Err(err) => {
            log::debug!("Stored beacon {url} unreachable: {err:#}");
            (0, BeaconStatus::Offline)
        }
    };
    let network = client
        .get_spec()
        .await
        .map(|spec| spec.config_name)
        .unwrap_or_else(|_| beacon.network.clone());
    let version = client.get_node_version().await.ok();
    BeaconProbe {
        slot,
        status,
        network,
        version,
    }
}

async fn probe_validator(
    deps: &Arc<Supervisor>,
    validator: &StoredValidator,
    nodes: &[String],
) -> (ValidatorStatus, Option<i64>) {
    let primary = match nodes.first() {
        Some(node) => node,
        None => return (ValidatorStatus::NoBeaconNode, None),
    };
    let url = match Url::parse(primary) {
        Ok(url) => url,
        Err(err) => {
            log::error!("Invalid beacon URL {primary} for {}: {err}", validator.pubkey);
            return (ValidatorStatus::Error, None);
        }
    };
    let client = deps.clients.create(&url);
    let status = status::resolve_status(client.as_ref(), &validator.pubkey).await;
    let balance = client
        .get_validator(&validator.pubkey)
        .await
        .ok()
        .flatten()
        .map(|data| data.balance);
    (status, balance)
}

async fn wait_for_daemon(deps: &Arc<Supervisor>) {
    if deps.runtime.is_daemon_online().await {
        return;
    }
    log::warn!("Container daemon is offline, waiting for it to come back");
    deps.bus.publish(Fact::DaemonOffline { offline: true });
    loop {
        tokio::time::sleep(DAEMON_POLL_DELAY).await;
        if deps.runtime.is_daemon_online().await {
            break;
        }
    }
    log::info!("Container daemon is back online");
    deps.bus.publish(Fact::DaemonOffline { offline: false });
}

/// Routes facts to persistence and task spawning. Owns the sets of beacons
/// being watched and validators with balance updaters so duplicates are never
/// spawned.
pub struct Dispatcher {
    deps: Arc<Supervisor>,
    rx: broadcast::Receiver<Fact>,
    watched: HashSet<String>,
    updaters: HashSet<String>,
}

impl Dispatcher {
    /// Subscribes immediately so facts published between construction and
    /// `run` are not lost.
    pub fn new(deps: Arc<Supervisor>) -> Self {
        let rx = deps.bus.subscribe();
        Self {
            deps,
            rx,
            watched: HashSet::new(),
            updaters: HashSet::new(),
        }
    }

    pub async fn run(mut self) {
        loop {
            match self.rx.recv().await {
                Ok(fact) => {
                    if let Err(err) = self.handle(&fact).await {
                        log::error!("Fact dispatch failed: {err:#}");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    log::warn!("Dispatcher lagged by {missed} facts");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    pub(crate) async fn handle(&mut self, fact: &Fact) -> Result<()> {
        match fact {
            Fact::BeaconAdded {
                url,
                network,
                docker,
                ..
            } => {
                self.deps
                    .store
                    .upsert_beacon(&StoredBeacon {
                        url: url.to_string(),
                        network: network.clone(),
                        docker: docker.clone(),
                    })
                    .await?;
                if self.watched.insert(url.to_string()) {
                    let watcher = self.deps.watcher();
                    tokio::spawn(watcher.run(url.clone()));
                }
            }
            Fact::BeaconRemoved { url } => {
                self.watched.remove(&url.to_string());
                let removed = self.deps.store.remove_beacon(url.as_str()).await?;
                self.deps.store.delete_metrics(url.as_str()).await?;
                if removed {
                    self.detach_validators(url).await?;
                }
            }
            Fact::ValidatorAdded {
                pubkey,
                name,
                network,
                ..
            } => {
                self.deps
                    .store
                    .upsert_validator(&StoredValidator {
                        pubkey: pubkey.clone(),
                        name: name.clone(),
                        network: network.clone(),
                    })
                    .await?;
                if self.updaters.insert(pubkey.clone()) {
                    let lifecycle = self.deps.lifecycle.clone();
                    tokio::spawn(lifecycle.balance_updater(pubkey.clone()));
                }
            }
            Fact::ValidatorRemoved { pubkey } => {
                self.updaters.remove(pubkey);
                self.deps.lifecycle.discard(pubkey).await;
                self.deps.store.remove_validator(pubkey).await?;
            }
            Fact::ValidatorStartRequested { pubkey } => {
                // the start can block on a user decision, never the dispatcher
                let deps = self.deps.clone();
                let pubkey = pubkey.clone();
                tokio::spawn(async move {
                    if let Err(err) = deps.lifecycle.start(&pubkey).await {
                        log::error!("Failed to start validator {pubkey}: {err:#}");
                        deps.bus.publish(Fact::NotificationCreated {
                            title: format!("Failed to start validator: {err}"),
                            source: "validator_start".to_string(),
                        });
                    }
                });
            }
            Fact::ValidatorStopRequested { pubkey } => {
                let deps = self.deps.clone();
                let pubkey = pubkey.clone();
                tokio::spawn(async move {
                    if let Err(err) = deps.lifecycle.stop(&pubkey).await {
                        log::error!("Failed to stop validator {pubkey}: {err:#}");
                        deps.bus.publish(Fact::NotificationCreated {
                            title: format!("Failed to stop validator: {err}"),
                            source: "validator_stop".to_string(),
                        });
                    }
                });
            }
            Fact::AttestationSigned {
                pubkey,
                slot,
                committee_index,
                block_root,
            } => {
                let tracker = self.deps.effectiveness_tracker();
                let pubkey = pubkey.clone();
                let (slot, committee_index) = (*slot, *committee_index);
                let block_root = block_root.clone();
                tokio::spawn(async move {
                    if let Err(err) = tracker.track(pubkey, slot, committee_index, block_root).await
                    {
                        log::error!("Effectiveness tracking failed: {err:#}");
                    }
                });
            }
            Fact::LocalBeaconRequested { params } => {
                let orchestrator = self.deps.orchestrator.clone();
                let params = params.clone();
                tokio::spawn(async move {
                    if let Err(err) = orchestrator.start_local_beacon(params).await {
                        log::error!("Failed to start local beacon node: {err:#}");
                    }
                });
            }
            _ => {}
        }
        Ok(())
    }

    /// A beacon was deleted: drop it from every validator's node list and
    /// flag validators left with no node at all.
    async fn detach_validators(&self, url: &Url) -> Result<()> {
        for pubkey in self
            .deps
            .store
            .validators_with_beacon_node(url.as_str())
            .await?
        {
            let nodes = self
                .deps
                .store
                .remove_beacon_node(&pubkey, url.as_str())
                .await?;
            let orphaned = nodes.is_empty();
            self.deps.bus.publish(Fact::BeaconNodesStored {
                pubkey: pubkey.clone(),
                nodes,
            });
            if orphaned {
                self.deps.bus.publish(Fact::ValidatorStatusUpdated {
                    pubkey,
                    status: ValidatorStatus::NoBeaconNode,
                });
            }
        }
        Ok(())
    }
}
