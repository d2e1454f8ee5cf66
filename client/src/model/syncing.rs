use common::util::deserialize_num;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SyncingStatus {
    #[serde(deserialize_with = "deserialize_num")]
    pub head_slot: u64,
    #[serde(deserialize_with = "deserialize_num")]
    pub sync_distance: u64,
    pub is_syncing: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SyncingResponse {
    pub data: SyncingStatus,
}
