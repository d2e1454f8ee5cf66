use common::{network::NetworkConfig, util::deserialize_num};
use serde::{Deserialize, Serialize};

/// Subset of the chain spec endpoint needed for slot math and network naming.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainSpec {
    #[serde(rename = "CONFIG_NAME")]
    pub config_name: String,
    #[serde(rename = "SLOTS_PER_EPOCH", deserialize_with = "deserialize_num")]
    pub slots_per_epoch: u64,
    #[serde(rename = "SECONDS_PER_SLOT", deserialize_with = "deserialize_num")]
    pub seconds_per_slot: u64,
}

impl From<ChainSpec> for NetworkConfig {
    fn from(spec: ChainSpec) -> Self {
        NetworkConfig {
            name: spec.config_name,
            slots_per_epoch: spec.slots_per_epoch,
            seconds_per_slot: spec.seconds_per_slot,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SpecResponse {
    pub data: ChainSpec,
}
