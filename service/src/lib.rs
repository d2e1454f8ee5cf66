pub mod model;
pub mod signing;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use common::{
    metrics::NetworkMetric,
    records::{AttestationEffectiveness, BalanceRecord},
};
use model::{StoredBeacon, StoredValidator};

#[async_trait]
pub trait BeaconRepository: Sync + Send {
    async fn get_beacons(&self) -> Result<Vec<StoredBeacon>>;
    async fn upsert_beacon(&self, beacon: &StoredBeacon) -> Result<()>;
    async fn remove_beacon(&self, url: &str) -> Result<bool>;
}

#[async_trait]
pub trait ValidatorRepository: Sync + Send {
    async fn get_validators(&self) -> Result<Vec<StoredValidator>>;
    async fn upsert_validator(&self, validator: &StoredValidator) -> Result<()>;
    async fn remove_validator(&self, pubkey: &str) -> Result<bool>;
}

/// Ordered beacon-node associations per validator. The first node in the list
/// is the validator's primary beacon.
#[async_trait]
pub trait BeaconNodeRepository: Sync + Send {
    async fn get_beacon_nodes(&self, pubkey: &str) -> Result<Vec<String>>;
    async fn add_beacon_node(&self, pubkey: &str, url: &str) -> Result<Vec<String>>;
    async fn remove_beacon_node(&self, pubkey: &str, url: &str) -> Result<Vec<String>>;
    async fn validators_with_beacon_node(&self, url: &str) -> Result<Vec<String>>;
}

#[async_trait]
pub trait MetricRepository: Sync + Send {
    async fn add_metric(&self, metric: &NetworkMetric) -> Result<()>;
    async fn metrics_in_range(&self, url: &str, from: i64, to: i64) -> Result<Vec<NetworkMetric>>;
    async fn delete_metrics(&self, url: &str) -> Result<()>;
}

#[async_trait]
pub trait BalanceRepository: Sync + Send {
    async fn add_balance_record(&self, pubkey: &str, record: &BalanceRecord) -> Result<()>;
}

#[async_trait]
pub trait EffectivenessRepository: Sync + Send {
    async fn add_effectiveness_record(&self, pubkey: &str, record: &AttestationEffectiveness) -> Result<()>;
}

/// Facade over the persistence layer consumed by the supervisor.
#[async_trait]
pub trait Store: Sync + Send {
    async fn get_beacons(&self) -> Result<Vec<StoredBeacon>>;
    async fn upsert_beacon(&self, beacon: &StoredBeacon) -> Result<()>;
    async fn remove_beacon(&self, url: &str) -> Result<bool>;

    async fn get_validators(&self) -> Result<Vec<StoredValidator>>;
    async fn upsert_validator(&self, validator: &StoredValidator) -> Result<()>;
    async fn remove_validator(&self, pubkey: &str) -> Result<bool>;

    async fn get_beacon_nodes(&self, pubkey: &str) -> Result<Vec<String>>;
    async fn add_beacon_node(&self, pubkey: &str, url: &str) -> Result<Vec<String>>;
    async fn remove_beacon_node(&self, pubkey: &str, url: &str) -> Result<Vec<String>>;
    async fn validators_with_beacon_node(&self, url: &str) -> Result<Vec<String>>;

    async fn add_metric(&self, metric: &NetworkMetric) -> Result<()>;
    async fn metrics_in_range(&self, url: &str, from: i64, to: i64) -> Result<Vec<NetworkMetric>>;
    async fn delete_metrics(&self, url: &str) -> Result<()>;

    async fn add_balance_record(&self, pubkey: &str, record: &BalanceRecord) -> Result<()>;
    async fn add_effectiveness_record(&self, pubkey: &str, record: &AttestationEffectiveness) -> Result<()>;
}

#[derive(Clone)]
pub struct StoreImpl {
    beacon_repository: Arc<dyn BeaconRepository>,
    validator_repository: Arc<dyn ValidatorRepository>,
    beacon_node_repository: Arc<dyn BeaconNodeRepository>,
    metric_repository: Arc<dyn MetricRepository>,
    balance_repository: Arc<dyn BalanceRepository>,
    effectiveness_repository: Arc<dyn EffectivenessRepository>,
}

impl StoreImpl {
    pub fn new(
        beacon_repository: Arc<dyn BeaconRepository>,
        validator_repository: Arc<dyn ValidatorRepository>,
        beacon_node_repository: Arc<dyn BeaconNodeRepository>,
        metric_repository: Arc<dyn MetricRepository>,
        balance_repository: Arc<dyn BalanceRepository>,
        effectiveness_repository: Arc<dyn EffectivenessRepository>,
    ) -> Self {
        Self {
            beacon_repository,
            validator_repository,
            beacon_node_repository,
            metric_repository,
            balance_repository,
            effectiveness_repository,
        }
    }
}

#[async_trait]
impl Store for StoreImpl {
    async fn get_beacons(&self) -> Result<Vec<StoredBeacon>> {
        self.beacon_repository.get_beacons().await
    }

    async fn upsert_beacon(&self, beacon: &StoredBeacon) -> Result<()> {
        self.beacon_repository.upsert_beacon(beacon).await
    }

    async fn remove_beacon(&self, url: &str) -> Result<bool> {
        self.beacon_repository.remove_beacon(url).await
    }

    async fn get_validators(&self) -> Result<Vec<StoredValidator>> {
        self.validator_repository.get_validators().await
    }

    async fn upsert_validator(&self, validator: &StoredValidator) -> Result<()> {
        self.validator_repository.upsert_validator(validator).await
    }

    async fn remove_validator(&self, pubkey: &str) -> Result<bool> {
        self.validator_repository.remove_validator(pubkey).await
    }

    async fn get_beacon_nodes(&self, pubkey: &str) -> Result<Vec<String>> {
        self.beacon_node_repository.get_beacon_nodes(pubkey).await
    }

    async fn add_beacon_node(&self, pubkey: &str, url: &str) -> Result<Vec<String>> {
        self.beacon_node_repository.add_beacon_node(pubkey, url).await
    }

    async fn remove_beacon_node(&self, pubkey: &str, url: &str) -> Result<Vec<String>> {
        self.beacon_node_repository.remove_beacon_node(pubkey, url).await
    }

    async fn validators_with_beacon_node(&self, url: &str) -> Result<Vec<String>> {
        self.beacon_node_repository.validators_with_beacon_node(url).await
    }

    async fn add_metric(&self, metric: &NetworkMetric) -> Result<()> {
        self.metric_repository.add_metric(metric).await
    }

    async fn metrics_in_range(&self, url: &str, from: i64, to: i64) -> Result<Vec<NetworkMetric>> {
        self.metric_repository.metrics_in_range(url, from, to).await
    }

    async fn delete_metrics(&self, url: &str) -> Result<()> {
        self.metric_repository.delete_metrics(url).await
    }

    async fn add_balance_record(&self, pubkey: &str, record: &BalanceRecord) -> Result<()> {
        self.balance_repository.add_balance_record(pubkey, record).await
    }

    async fn add_effectiveness_record(&self, pubkey: &str, record: &AttestationEffectiveness) -> Result<()> {
        self.effectiveness_repository
            .add_effectiveness_record(pubkey, record)
            .await
    }
}
