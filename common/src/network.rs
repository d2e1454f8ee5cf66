use serde::{Deserialize, Serialize};

/// Chain timing parameters, resolved from a beacon node's spec endpoint or
/// from the built-in table of known networks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub name: String,
    pub slots_per_epoch: u64,
    pub seconds_per_slot: u64,
}

impl NetworkConfig {
    pub fn mainnet() -> Self {
        Self {
            name: "mainnet".to_string(),
            slots_per_epoch: 32,
            seconds_per_slot: 12,
        }
    }

    pub fn known(name: &str) -> Option<Self> {
        match name {
            "mainnet" => Some(Self::mainnet()),
            "prater" => Some(Self {
                name: "prater".to_string(),
                slots_per_epoch: 32,
                seconds_per_slot: 12,
            }),
            "localhost" => Some(Self {
                name: "localhost".to_string(),
                slots_per_epoch: 8,
                seconds_per_slot: 12,
            }),
            _ => None,
        }
    }

    pub fn epoch_at_slot(&self, slot: u64) -> u64 {
        slot / self.slots_per_epoch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_math() {
        let config = NetworkConfig::mainnet();
        assert_eq!(config.epoch_at_slot(0), 0);
        assert_eq!(config.epoch_at_slot(31), 0);
        assert_eq!(config.epoch_at_slot(32), 1);
        assert_eq!(config.epoch_at_slot(320), 10);
    }

    #[test]
    fn known_networks() {
        assert_eq!(NetworkConfig::known("mainnet"), Some(NetworkConfig::mainnet()));
        assert!(NetworkConfig::known("prater").is_some());
        assert!(NetworkConfig::known("unknown").is_none());
    }
}
