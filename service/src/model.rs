use serde::{Deserialize, Serialize};

/// Launch parameters for a locally managed beacon node container. Persisted so
/// the node can be restarted across application runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerConfig {
    pub container_name: String,
    pub image: String,
    pub network: String,
    pub chain_data_dir: String,
    pub eth1_url: String,
    pub discovery_port: u16,
    pub libp2p_port: u16,
    pub rpc_port: u16,
    pub memory: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredBeacon {
    pub url: String,
    pub network: String,
    pub docker: Option<DockerConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredValidator {
    pub pubkey: String,
    pub name: String,
    pub network: String,
}
