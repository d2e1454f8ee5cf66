use common::util::deserialize_num;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Attestation {
    pub aggregation_bits: String,
    pub data: AttestationData,
    pub signature: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AttestationData {
    pub beacon_block_root: String,
    #[serde(deserialize_with = "deserialize_num")]
    pub index: u64,
    #[serde(deserialize_with = "deserialize_num")]
    pub slot: u64,
    pub source: Checkpoint,
    pub target: Checkpoint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Checkpoint {
    #[serde(deserialize_with = "deserialize_num")]
    pub epoch: u64,
    pub root: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AttestationResponse {
    pub data: Vec<Attestation>,
}
