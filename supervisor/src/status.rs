use client::{model::validator::ApiValidatorStatus, BeaconApiClient};
use common::status::ValidatorStatus;

/// Resolves a validator's display status from its beacon node, mirroring the
/// beacon-first precedence: unreachable node, unstarted chain and syncing all
/// mask the on-chain status.
pub async fn resolve_status(client: &dyn BeaconApiClient, pubkey: &str) -> ValidatorStatus {
    let syncing = match client.get_syncing_status().await {
        Ok(status) => status,
        Err(err) => {
            log::warn!("Failed to get syncing status: {err:#}");
            return ValidatorStatus::BeaconError;
        }
    };
    match client.get_genesis().await {
        Ok(Some(_)) => {}
        Ok(None) => return ValidatorStatus::WaitingStart,
        Err(err) => {
            log::warn!("Failed to get genesis: {err:#}");
            return ValidatorStatus::WaitingStart;
        }
    }
    if syncing.sync_distance > 0 {
        return ValidatorStatus::Syncing;
    }
    match client.get_validator(pubkey).await {
        Ok(Some(data)) => map_api_status(data.status),
        Ok(None) => ValidatorStatus::ProcessingDeposit,
        Err(err) => {
            log::warn!("Failed to get validator {pubkey}: {err:#}");
            ValidatorStatus::Error
        }
    }
}

pub fn map_api_status(status: ApiValidatorStatus) -> ValidatorStatus {
    match status {
        ApiValidatorStatus::PendingInitialized => ValidatorStatus::Deposited,
        ApiValidatorStatus::PendingQueued => ValidatorStatus::Queued,
        ApiValidatorStatus::ActiveOngoing => ValidatorStatus::Active,
        ApiValidatorStatus::ActiveExiting => ValidatorStatus::Active,
        ApiValidatorStatus::ActiveSlashed => ValidatorStatus::SlashedExiting,
        ApiValidatorStatus::ExitedUnslashed => ValidatorStatus::VoluntarilyExited,
        ApiValidatorStatus::ExitedSlashed => ValidatorStatus::Slashed,
        ApiValidatorStatus::WithdrawalPossible => ValidatorStatus::Withdrawable,
        ApiValidatorStatus::WithdrawalDone => ValidatorStatus::Withdrawn,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::ScriptedClient;
    use client::model::syncing::SyncingStatus;

    #[tokio::test]
    async fn unreachable_beacon_is_beacon_error() {
        let client = ScriptedClient::default();
        // no syncing responses scripted, the call errors
        assert_eq!(resolve_status(&client, "0xabc").await, ValidatorStatus::BeaconError);
    }

    #[tokio::test]
    async fn missing_genesis_is_waiting_start() {
        let client = ScriptedClient::default()
            .with_syncing(SyncingStatus {
                head_slot: 0,
                sync_distance: 0,
                is_syncing: false,
            });
        assert_eq!(resolve_status(&client, "0xabc").await, ValidatorStatus::WaitingStart);
    }

    #[tokio::test]
    async fn syncing_beacon_masks_chain_status() {
        let client = ScriptedClient::default()
            .with_genesis()
            .with_syncing(SyncingStatus {
                head_slot: 100,
                sync_distance: 40,
                is_syncing: true,
            });
        assert_eq!(resolve_status(&client, "0xabc").await, ValidatorStatus::Syncing);
    }

    #[test]
    fn api_status_mapping() {
        assert_eq!(map_api_status(ApiValidatorStatus::ActiveOngoing), ValidatorStatus::Active);
        assert_eq!(
            map_api_status(ApiValidatorStatus::ActiveSlashed),
            ValidatorStatus::SlashedExiting
        );
        assert_eq!(
            map_api_status(ApiValidatorStatus::WithdrawalDone),
            ValidatorStatus::Withdrawn
        );
    }
}
