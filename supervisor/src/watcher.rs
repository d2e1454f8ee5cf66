use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use client::{BeaconApiClient, ClientFactory};
use common::{network::NetworkConfig, status::BeaconStatus};
use docker::ContainerRuntime;
use futures_util::StreamExt;
use tokio::{sync::broadcast, time::Instant};
use url::Url;

use crate::{
    bus::{EventBus, Fact},
    registry::BeaconRegistry,
};

const CONFIG_RETRY_ATTEMPTS: u32 = 30;
const CONFIG_RETRY_DELAY: Duration = Duration::from_secs(1);
const RESTART_DELAY: Duration = Duration::from_secs(1);
/// Clears a stuck `starting` flag even when the recovery event never arrives.
const STARTING_FAILSAFE: Duration = Duration::from_secs(30);
pub const SYNC_DISTANCE_THRESHOLD: u64 = 10;

struct WatchState {
    is_syncing: bool,
    is_online: bool,
    starting_until: Option<Instant>,
    last_slot: u64,
    epoch: Option<u64>,
}

impl WatchState {
    fn is_starting(&self) -> bool {
        self.starting_until.map(|until| Instant::now() < until).unwrap_or(false)
    }
}

/// Supervises one beacon node: subscribes to head events, reconciles
/// online/syncing/starting state and emits slot/epoch facts. Terminates only
/// when a `BeaconRemoved` fact for its URL arrives.
pub struct HeadWatcher {
    pub bus: EventBus,
    pub beacons: Arc<BeaconRegistry>,
    pub clients: Arc<dyn ClientFactory>,
    pub runtime: Arc<dyn ContainerRuntime>,
}

impl HeadWatcher {
    pub async fn run(self, url: Url) {
        let mut rx = self.bus.subscribe();
        log::info!("Watching beacon {url}");
        loop {
            match self.watch(&url, &mut rx).await {
                Ok(()) => break,
                Err(err) => {
                    log::error!("Beacon watcher error for {url}: {err:#}");
                    if let Some(beacon) = self.beacons.get(&url) {
                        if beacon.status != BeaconStatus::Offline {
                            self.bus.publish(Fact::BeaconStatusUpdated {
                                url: url.clone(),
                                status: BeaconStatus::Offline,
                            });
                        }
                    }
                    // a removal published while we were away from the select
                    // still has to cancel the watcher
                    let mut cancelled = false;
                    while let Ok(fact) = rx.try_recv() {
                        if let Fact::BeaconRemoved { url: removed } = fact {
                            if removed == url {
                                cancelled = true;
                            }
                        }
                    }
                    if cancelled {
                        break;
                    }
                    tokio::time::sleep(RESTART_DELAY).await;
                }
            }
        }
        log::info!("Stopped watching beacon {url}");
    }

    /// One watch attempt: any error restarts the whole attempt, `Ok` means
    /// the watcher was cancelled.
    async fn watch(&self, url: &Url, rx: &mut broadcast::Receiver<Fact>) -> Result<()> {
        let client = self.clients.create(url);
        let config = self.resolve_network_config(client.as_ref(), url).await?;

        let snapshot = self.beacons.get(url);
        let status = snapshot.as_ref().map(|beacon| beacon.status).unwrap_or(BeaconStatus::Offline);
        let mut state = WatchState {
            is_syncing: matches!(
                status,
                BeaconStatus::Syncing | BeaconStatus::Offline | BeaconStatus::Starting
            ),
            is_online: status != BeaconStatus::Offline,
            starting_until: (status == BeaconStatus::Starting).then(|| Instant::now() + STARTING_FAILSAFE),
            last_slot: snapshot.as_ref().map(|beacon| beacon.slot).unwrap_or(0),
            epoch: None,
        };

        if snapshot.as_ref().map(|beacon| beacon.version.is_none()).unwrap_or(true) {
            match client.get_node_version().await {
                Ok(version) => self.bus.publish(Fact::VersionUpdated {
                    url: url.clone(),
                    version,
                }),
                Err(err) => log::warn!("Failed to get version for {url}: {err:#}"),
            }
        }

        let mut stream = client.head_events().await?;
        log::info!("Subscribed to head events on {url}");
        loop {
            tokio::select! {
                fact = rx.recv() => match fact {
                    Ok(Fact::BeaconRemoved { url: removed }) if removed == *url => {
                        log::info!("Stopping beacon watcher for {url}");
                        return Ok(());
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        log::warn!("Beacon watcher for {url} lagged by {missed} facts");
                    }
                    Err(broadcast::error::RecvError::Closed) => return Ok(()),
                },
                item = stream.next() => match item {
                    Some(Ok(head)) => {
                        if let Err(err) = self.on_head(url, &config, client.as_ref(), head.slot, &mut state).await {
                            log::error!("Head event error on {url}: {err:#}");
                        }
                    }
                    Some(Err(err)) => {
                        log::debug!("Event stream error on {url}: {err:#}");
                        if let Err(err) = self.on_stream_error(url, &mut state).await {
                            log::error!("Stream error handling failed on {url}: {err:#}");
                        }
                    }
                    None => return Err(anyhow!("head event stream ended")),
                },
            }
        }
    }

    async fn resolve_network_config(&self, client: &dyn BeaconApiClient, url: &Url) -> Result<NetworkConfig> {
        for attempt in 1..=CONFIG_RETRY_ATTEMPTS {
            match client.get_spec().await {
                Ok(spec) => return Ok(spec.into()),
                Err(err) => {
                    log::debug!("Network config attempt {attempt}/{CONFIG_RETRY_ATTEMPTS} failed for {url}: {err:#}");
                    tokio::time::sleep(CONFIG_RETRY_DELAY).await;
                }
            }
        }
        Err(anyhow!("network config unavailable for {url}"))
    }

    async fn on_stream_error(&self, url: &Url, state: &mut WatchState) -> Result<()> {
        let docker = self.beacons.get(url).and_then(|beacon| beacon.docker);
        let is_running = match &docker {
            Some(config) => self.runtime.is_running(&config.container_name).await?,
            None => true,
        };
        if state.is_online && !state.is_starting() {
            self.bus.publish(Fact::BeaconStatusUpdated {
                url: url.clone(),
                status: BeaconStatus::Offline,
            });
            state.is_online = false;
        } else if is_running && !state.is_starting() && docker.is_some() {
            state.starting_until = Some(Instant::now() + STARTING_FAILSAFE);
            self.bus.publish(Fact::BeaconStatusUpdated {
                url: url.clone(),
                status: BeaconStatus::Starting,
            });
        }
        Ok(())
    }

    async fn on_head(
        &self,
        url: &Url,
        config: &NetworkConfig,
        client: &dyn BeaconApiClient,
        slot: u64,
        state: &mut WatchState,
    ) -> Result<()> {
        if slot > state.last_slot {
            state.last_slot = slot;
            self.bus.publish(Fact::SlotUpdated { url: url.clone(), slot });
        }
        if state.is_syncing || !state.is_online {
            let syncing = client.get_syncing_status().await?;
            state.is_syncing = syncing.sync_distance > SYNC_DISTANCE_THRESHOLD;
            state.is_online = true;
            state.starting_until = None;
            let status = if state.is_syncing {
                BeaconStatus::Syncing
            } else {
                BeaconStatus::Active
            };
            self.bus.publish(Fact::BeaconStatusUpdated { url: url.clone(), status });
            if let Some(docker) = self.beacons.get(url).and_then(|beacon| beacon.docker) {
                if let Err(err) = self.runtime.follow_logs(&docker.container_name).await {
                    log::warn!("Failed to follow logs for {}: {err:#}", docker.container_name);
                }
            }
        }
        let head_epoch = config.epoch_at_slot(slot);
        if state.epoch != Some(head_epoch) {
            state.epoch = Some(head_epoch);
            self.bus.publish(Fact::EpochUpdated {
                url: url.clone(),
                epoch: head_epoch,
            });
            self.bus.publish(Fact::BalanceRefresh {
                url: url.clone(),
                slot,
                epoch: head_epoch,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testutil::{MockRuntime, ScriptedClient, SingleClientFactory};
    use client::model::{head::HeadEvent, syncing::SyncingStatus};
    use tokio::time::timeout;

    fn head(slot: u64) -> Result<HeadEvent> {
        Ok(HeadEvent {
            slot,
            block: format!("0xblock{slot}"),
        })
    }

    fn added_fact(url: &Url) -> Fact {
        Fact::BeaconAdded {
            url: url.clone(),
            network: "mainnet".to_string(),
            docker: None,
            slot: 0,
            status: BeaconStatus::Offline,
            version: None,
        }
    }

    async fn wait_for<F: Fn(&Fact) -> bool>(
        rx: &mut broadcast::Receiver<Fact>,
        seen: &mut Vec<Fact>,
        predicate: F,
    ) {
        timeout(Duration::from_secs(5), async {
            loop {
                let fact = rx.recv().await.unwrap();
                let done = predicate(&fact);
                seen.push(fact);
                if done {
                    break;
                }
            }
        })
        .await
        .expect("expected fact not observed");
    }

    #[tokio::test]
    async fn deduplicates_slots_and_epochs() {
        let url = Url::parse("http://localhost:5052").unwrap();
        let client = ScriptedClient::default()
            .with_syncing(SyncingStatus {
                head_slot: 10,
                sync_distance: 0,
                is_syncing: false,
            })
            .with_head_events(vec![head(10), head(10), head(12), head(12)]);
        let bus = EventBus::new();
        let beacons = Arc::new(BeaconRegistry::new());
        beacons.apply(&added_fact(&url));

        let watcher = HeadWatcher {
            bus: bus.clone(),
            beacons: beacons.clone(),
            clients: Arc::new(SingleClientFactory::new(client)),
            runtime: Arc::new(MockRuntime::default()),
        };
        let mut rx = bus.subscribe();
        let handle = tokio::spawn(watcher.run(url.clone()));

        let mut seen = Vec::new();
        wait_for(&mut rx, &mut seen, |fact| {
            matches!(fact, Fact::SlotUpdated { slot: 12, .. })
        })
        .await;
        bus.publish(Fact::BeaconRemoved { url: url.clone() });
        timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();

        let slots = seen
            .iter()
            .filter_map(|fact| match fact {
                Fact::SlotUpdated { slot, .. } => Some(*slot),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(slots, vec![10, 12]);
        let epochs = seen
            .iter()
            .filter_map(|fact| match fact {
                Fact::EpochUpdated { epoch, .. } => Some(*epoch),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(epochs, vec![0]);
    }

    #[tokio::test]
    async fn reports_syncing_until_distance_within_threshold() {
        let url = Url::parse("http://localhost:5052").unwrap();
        let client = ScriptedClient::default()
            .with_syncing(SyncingStatus {
                head_slot: 10,
                sync_distance: 40,
                is_syncing: true,
            })
            .with_syncing(SyncingStatus {
                head_slot: 20,
                sync_distance: 3,
                is_syncing: true,
            })
            .with_head_events(vec![head(10), head(20)]);
        let bus = EventBus::new();
        let beacons = Arc::new(BeaconRegistry::new());
        beacons.apply(&added_fact(&url));

        let watcher = HeadWatcher {
            bus: bus.clone(),
            beacons: beacons.clone(),
            clients: Arc::new(SingleClientFactory::new(client)),
            runtime: Arc::new(MockRuntime::default()),
        };
        let mut rx = bus.subscribe();
        let handle = tokio::spawn(watcher.run(url.clone()));

        let mut seen = Vec::new();
        wait_for(&mut rx, &mut seen, |fact| {
            matches!(
                fact,
                Fact::BeaconStatusUpdated {
                    status: BeaconStatus::Active,
                    ..
                }
            )
        })
        .await;
        bus.publish(Fact::BeaconRemoved { url: url.clone() });
        timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();

        let statuses = seen
            .iter()
            .filter_map(|fact| match fact {
                Fact::BeaconStatusUpdated { status, .. } => Some(*status),
                _ => None,
            })
            .collect::<Vec<_>>();
        // never active before a sync distance within the threshold is observed
        assert_eq!(statuses, vec![BeaconStatus::Syncing, BeaconStatus::Active]);
    }

    #[tokio::test]
    async fn version_is_fetched_once_when_missing() {
        let url = Url::parse("http://localhost:5052").unwrap();
        let client = ScriptedClient::default()
            .with_syncing(SyncingStatus {
                head_slot: 10,
                sync_distance: 0,
                is_syncing: false,
            })
            .with_head_events(vec![head(10)]);
        let bus = EventBus::new();
        let beacons = Arc::new(BeaconRegistry::new());
        beacons.apply(&added_fact(&url));

        let watcher = HeadWatcher {
            bus: bus.clone(),
            beacons: beacons.clone(),
            clients: Arc::new(SingleClientFactory::new(client)),
            runtime: Arc::new(MockRuntime::default()),
        };
        let mut rx = bus.subscribe();
        let handle = tokio::spawn(watcher.run(url.clone()));

        let mut seen = Vec::new();
        wait_for(&mut rx, &mut seen, |fact| matches!(fact, Fact::VersionUpdated { .. })).await;
        bus.publish(Fact::BeaconRemoved { url: url.clone() });
        timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
    }
}
