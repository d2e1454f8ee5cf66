use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use client::{
    model::{
        attestation::Attestation,
        genesis::Genesis,
        head::HeadEvent,
        spec::ChainSpec,
        syncing::SyncingStatus,
        validator::ValidatorData,
    },
    BeaconApiClient, ClientFactory,
};
use common::{
    metrics::NetworkMetric,
    network::NetworkConfig,
    records::{AttestationEffectiveness, BalanceRecord},
};
use docker::{ContainerHandle, ContainerParams, ContainerRuntime, PullProcess};
use futures_util::{stream, StreamExt};
use service::{
    model::{StoredBeacon, StoredValidator},
    signing::{SigningService, SigningServiceFactory, SlashingProtection},
    Store,
};
use url::Url;

pub const GENESIS_ROOT: &str = "0x4242424242424242424242424242424242424242424242424242424242424242";

/// Beacon API client fed from scripted responses. Unscripted syncing calls and
/// event streams error, everything else has a benign default.
#[derive(Default)]
pub struct ScriptedClient {
    syncing: Mutex<VecDeque<SyncingStatus>>,
    genesis: Mutex<Option<Genesis>>,
    validator: Mutex<Option<ValidatorData>>,
    attestations: Mutex<HashMap<u64, Option<Vec<Attestation>>>>,
    head_events: Mutex<Option<Vec<Result<HeadEvent>>>>,
}

impl ScriptedClient {
    pub fn with_syncing(self, status: SyncingStatus) -> Self {
        self.syncing.lock().unwrap().push_back(status);
        self
    }

    pub fn with_genesis(self) -> Self {
        *self.genesis.lock().unwrap() = Some(Genesis {
            genesis_time: 1_606_824_023,
            genesis_validators_root: GENESIS_ROOT.to_string(),
            genesis_fork_version: "0x00000000".to_string(),
        });
        self
    }

    pub fn with_validator(self, data: ValidatorData) -> Self {
        *self.validator.lock().unwrap() = Some(data);
        self
    }

    pub fn with_attestations(self, slot: u64, attestations: Option<Vec<Attestation>>) -> Self {
        self.attestations.lock().unwrap().insert(slot, attestations);
        self
    }

    pub fn with_head_events(self, events: Vec<Result<HeadEvent>>) -> Self {
        *self.head_events.lock().unwrap() = Some(events);
        self
    }
}

#[async_trait]
impl BeaconApiClient for ScriptedClient {
    async fn get_syncing_status(&self) -> Result<SyncingStatus> {
        self.syncing
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow!("no syncing response scripted"))
    }

    async fn get_genesis(&self) -> Result<Option<Genesis>> {
        Ok(self.genesis.lock().unwrap().clone())
    }

    async fn get_node_version(&self) -> Result<String> {
        Ok("mock/v1.0.0".to_string())
    }

    async fn get_spec(&self) -> Result<ChainSpec> {
        Ok(ChainSpec {
            config_name: "mainnet".to_string(),
            slots_per_epoch: 32,
            seconds_per_slot: 12,
        })
    }

    async fn get_block_attestations(&self, slot: u64) -> Result<Option<Vec<Attestation>>> {
        // unscripted slots have a block with no attestations of interest
        Ok(self
            .attestations
            .lock()
            .unwrap()
            .get(&slot)
            .cloned()
            .unwrap_or_else(|| Some(vec![])))
    }

    async fn get_validator(&self, _pubkey: &str) -> Result<Option<ValidatorData>> {
        Ok(self.validator.lock().unwrap().clone())
    }

    async fn head_events(&self) -> Result<futures_util::stream::BoxStream<'static, Result<HeadEvent>>> {
        let events = self
            .head_events
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| anyhow!("no event stream scripted"))?;
        // stay open after the scripted events so the watcher keeps selecting
        Ok(stream::iter(events).chain(stream::pending()).boxed())
    }
}

/// Hands out the same scripted client for every URL.
pub struct SingleClientFactory {
    client: Arc<ScriptedClient>,
}

impl SingleClientFactory {
    pub fn new(client: ScriptedClient) -> Self {
        Self {
            client: Arc::new(client),
        }
    }
}

impl ClientFactory for SingleClientFactory {
    fn create(&self, _url: &Url) -> Arc<dyn BeaconApiClient> {
        self.client.clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullMode {
    Success,
    Fail,
    Hang,
    SpawnError,
}

pub struct MockPull {
    mode: PullMode,
    kills: Arc<AtomicUsize>,
}

#[async_trait]
impl PullProcess for MockPull {
    async fn wait(&mut self) -> Result<()> {
        match self.mode {
            PullMode::Success => Ok(()),
            PullMode::Fail => bail!("pull failed"),
            PullMode::Hang => {
                futures_util::future::pending::<()>().await;
                unreachable!()
            }
            PullMode::SpawnError => unreachable!("the pull never spawned"),
        }
    }

    async fn kill(&mut self) -> Result<()> {
        self.kills.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct MockRuntime {
    pub daemon_online: AtomicBool,
    pub running: AtomicBool,
    pub pull_mode: Mutex<PullMode>,
    pub pull_kills: Arc<AtomicUsize>,
    pub container_starts: AtomicUsize,
    pub restarts: Mutex<Vec<String>>,
    pub followed: Mutex<Vec<String>>,
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self {
            daemon_online: AtomicBool::new(true),
            running: AtomicBool::new(true),
            pull_mode: Mutex::new(PullMode::Success),
            pull_kills: Arc::new(AtomicUsize::new(0)),
            container_starts: AtomicUsize::new(0),
            restarts: Mutex::new(Vec::new()),
            followed: Mutex::new(Vec::new()),
        }
    }
}

impl MockRuntime {
    pub fn set_pull_mode(&self, mode: PullMode) {
        *self.pull_mode.lock().unwrap() = mode;
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn start_pull(&self, _image: &str) -> Result<Box<dyn PullProcess>> {
        let mode = *self.pull_mode.lock().unwrap();
        if mode == PullMode::SpawnError {
            bail!("docker binary not found");
        }
        Ok(Box::new(MockPull {
            mode,
            kills: self.pull_kills.clone(),
        }))
    }

    async fn start_container(&self, params: &ContainerParams) -> Result<ContainerHandle> {
        self.container_starts.fetch_add(1, Ordering::SeqCst);
        Ok(ContainerHandle {
            id: "mock-container-id".to_string(),
            name: params.name.clone(),
        })
    }

    async fn restart_container(&self, name: &str) -> Result<()> {
        self.restarts.lock().unwrap().push(name.to_string());
        Ok(())
    }

    async fn is_running(&self, _name: &str) -> Result<bool> {
        Ok(self.running.load(Ordering::SeqCst))
    }

    async fn is_daemon_online(&self) -> bool {
        self.daemon_online.load(Ordering::SeqCst)
    }

    async fn follow_logs(&self, name: &str) -> Result<()> {
        self.followed.lock().unwrap().push(name.to_string());
        Ok(())
    }
}

/// In-memory store with every collection exposed for assertions.
#[derive(Default)]
pub struct MemoryStore {
    pub beacons: Mutex<Vec<StoredBeacon>>,
    pub validators: Mutex<Vec<StoredValidator>>,
    pub nodes: Mutex<HashMap<String, Vec<String>>>,
    pub metrics: Mutex<Vec<NetworkMetric>>,
    pub balances: Mutex<Vec<(String, BalanceRecord)>>,
    pub effectiveness: Mutex<Vec<(String, AttestationEffectiveness)>>,
}

impl MemoryStore {
    pub fn seed_beacon(&self, url: &str, network: &str, docker: Option<service::model::DockerConfig>) {
        self.beacons.lock().unwrap().push(StoredBeacon {
            url: url.to_string(),
            network: network.to_string(),
            docker,
        });
    }

    pub fn seed_validator(&self, pubkey: &str, name: &str, network: &str, nodes: Vec<String>) {
        self.validators.lock().unwrap().push(StoredValidator {
            pubkey: pubkey.to_string(),
            name: name.to_string(),
            network: network.to_string(),
        });
        self.nodes.lock().unwrap().insert(pubkey.to_string(), nodes);
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_beacons(&self) -> Result<Vec<StoredBeacon>> {
        Ok(self.beacons.lock().unwrap().clone())
    }

    async fn upsert_beacon(&self, beacon: &StoredBeacon) -> Result<()> {
        let mut beacons = self.beacons.lock().unwrap();
        beacons.retain(|stored| stored.url != beacon.url);
        beacons.push(beacon.clone());
        Ok(())
    }

    async fn remove_beacon(&self, url: &str) -> Result<bool> {
        let mut beacons = self.beacons.lock().unwrap();
        let before = beacons.len();
        beacons.retain(|stored| stored.url != url);
        Ok(beacons.len() < before)
    }

    async fn get_validators(&self) -> Result<Vec<StoredValidator>> {
        Ok(self.validators.lock().unwrap().clone())
    }

    async fn upsert_validator(&self, validator: &StoredValidator) -> Result<()> {
        let mut validators = self.validators.lock().unwrap();
        validators.retain(|stored| stored.pubkey != validator.pubkey);
        validators.push(validator.clone());
        Ok(())
    }

    async fn remove_validator(&self, pubkey: &str) -> Result<bool> {
        let mut validators = self.validators.lock().unwrap();
        let before = validators.len();
        validators.retain(|stored| stored.pubkey != pubkey);
        self.nodes.lock().unwrap().remove(pubkey);
        Ok(validators.len() < before)
    }

    async fn get_beacon_nodes(&self, pubkey: &str) -> Result<Vec<String>> {
        Ok(self
            .nodes
            .lock()
            .unwrap()
            .get(pubkey)
            .cloned()
            .unwrap_or_default())
    }

    async fn add_beacon_node(&self, pubkey: &str, url: &str) -> Result<Vec<String>> {
        let mut nodes = self.nodes.lock().unwrap();
        let entry = nodes.entry(pubkey.to_string()).or_default();
        if !entry.iter().any(|node| node == url) {
            entry.push(url.to_string());
        }
        Ok(entry.clone())
    }

    async fn remove_beacon_node(&self, pubkey: &str, url: &str) -> Result<Vec<String>> {
        let mut nodes = self.nodes.lock().unwrap();
        let entry = nodes.entry(pubkey.to_string()).or_default();
        entry.retain(|node| node != url);
        Ok(entry.clone())
    }

    async fn validators_with_beacon_node(&self, url: &str) -> Result<Vec<String>> {
        Ok(self
            .nodes
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, nodes)| nodes.iter().any(|node| node == url))
            .map(|(pubkey, _)| pubkey.clone())
            .collect())
    }

    async fn add_metric(&self, metric: &NetworkMetric) -> Result<()> {
        self.metrics.lock().unwrap().push(metric.clone());
        Ok(())
    }

    async fn metrics_in_range(&self, url: &str, from: i64, to: i64) -> Result<Vec<NetworkMetric>> {
        Ok(self
            .metrics
            .lock()
            .unwrap()
            .iter()
            .filter(|metric| metric.url == url && metric.time > from && metric.time < to)
            .cloned()
            .collect())
    }

    async fn delete_metrics(&self, url: &str) -> Result<()> {
        self.metrics.lock().unwrap().retain(|metric| metric.url != url);
        Ok(())
    }

    async fn add_balance_record(&self, pubkey: &str, record: &BalanceRecord) -> Result<()> {
        self.balances
            .lock()
            .unwrap()
            .push((pubkey.to_string(), record.clone()));
        Ok(())
    }

    async fn add_effectiveness_record(
        &self,
        pubkey: &str,
        record: &AttestationEffectiveness,
    ) -> Result<()> {
        self.effectiveness
            .lock()
            .unwrap()
            .push((pubkey.to_string(), record.clone()));
        Ok(())
    }
}

/// Records imported genesis roots; starts "missing" only when asked to.
#[derive(Default)]
pub struct MockSlashing {
    missing: AtomicBool,
    pub imports: Mutex<Vec<String>>,
}

impl MockSlashing {
    pub fn missing() -> Self {
        Self {
            missing: AtomicBool::new(true),
            imports: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl SlashingProtection for MockSlashing {
    async fn missing_imported_protection(&self, _pubkey: &str) -> Result<bool> {
        Ok(self.missing.load(Ordering::SeqCst))
    }

    async fn import_interchange(
        &self,
        _interchange: serde_json::Value,
        genesis_validators_root: &str,
    ) -> Result<()> {
        self.imports
            .lock()
            .unwrap()
            .push(genesis_validators_root.to_string());
        self.missing.store(false, Ordering::SeqCst);
        Ok(())
    }
}

struct NoopSigningService;

#[async_trait]
impl SigningService for NoopSigningService {
    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct CountingSignerFactory {
    pub created: AtomicUsize,
}

impl SigningServiceFactory for CountingSignerFactory {
    fn create(
        &self,
        _pubkey: &str,
        _beacon_url: &str,
        _config: &NetworkConfig,
    ) -> Result<Arc<dyn SigningService>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(NoopSigningService))
    }
}
