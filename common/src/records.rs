use serde::{Deserialize, Serialize};

/// Balance observation for a validator, one per epoch transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceRecord {
    pub epoch: u64,
    pub balance: i64,
    pub time: i64,
}

/// Outcome of tracking one signed attestation until inclusion or timeout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttestationEffectiveness {
    pub epoch: u64,
    pub target_slot: u64,
    pub inclusion_slot: u64,
    pub efficiency: f64,
    pub time: i64,
}
