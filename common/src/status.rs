use std::fmt;

use serde::{Deserialize, Serialize};

/// Observed state of a beacon node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeaconStatus {
    Offline,
    /// Node process is up but its API is not answering yet.
    Starting,
    Syncing,
    Active,
}

impl fmt::Display for BeaconStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BeaconStatus::Offline => "offline",
            BeaconStatus::Starting => "starting",
            BeaconStatus::Syncing => "syncing",
            BeaconStatus::Active => "active",
        };
        write!(f, "{name}")
    }
}

/// Display status of a validator. Beacon-side conditions (unreachable node,
/// unstarted chain, syncing) take precedence over the on-chain status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorStatus {
    NoBeaconNode,
    BeaconError,
    WaitingStart,
    Syncing,
    WaitingDeposit,
    ProcessingDeposit,
    Deposited,
    Queued,
    Pending,
    Active,
    SlashedExiting,
    Slashed,
    VoluntarilyExited,
    Withdrawable,
    Withdrawn,
    Error,
}

impl fmt::Display for ValidatorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValidatorStatus::NoBeaconNode => "no_beacon_node",
            ValidatorStatus::BeaconError => "beacon_error",
            ValidatorStatus::WaitingStart => "waiting_start",
            ValidatorStatus::Syncing => "syncing",
            ValidatorStatus::WaitingDeposit => "waiting_deposit",
            ValidatorStatus::ProcessingDeposit => "processing_deposit",
            ValidatorStatus::Deposited => "deposited",
            ValidatorStatus::Queued => "queued",
            ValidatorStatus::Pending => "pending",
            ValidatorStatus::Active => "active",
            ValidatorStatus::SlashedExiting => "slashed_exiting",
            ValidatorStatus::Slashed => "slashed",
            ValidatorStatus::VoluntarilyExited => "voluntarily_exited",
            ValidatorStatus::Withdrawable => "withdrawable",
            ValidatorStatus::Withdrawn => "withdrawn",
            ValidatorStatus::Error => "error",
        };
        write!(f, "{name}")
    }
}
