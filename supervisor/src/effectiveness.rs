use std::sync::Arc;

use anyhow::{anyhow, Result};
use client::ClientFactory;
use common::{network::NetworkConfig, records::AttestationEffectiveness, util::now_millis};
use tokio::sync::broadcast;
use url::Url;

use crate::{
    bus::{EventBus, Fact},
    registry::ValidatorRegistry,
};

/// Stop searching once this many non-skipped blocks without the attestation
/// have gone by.
const EMPTY_BLOCK_LIMIT: u64 = 3;
/// Give up one epoch's worth of slots after the target.
const SEARCH_WINDOW_SLOTS: u64 = 32;

/// Follows head slots after a signed attestation and records how quickly it
/// was included. Spawned once per signed attestation.
pub struct EffectivenessTracker {
    pub bus: EventBus,
    pub validators: Arc<ValidatorRegistry>,
    pub clients: Arc<dyn ClientFactory>,
    pub store: Arc<dyn service::Store>,
}

impl EffectivenessTracker {
    pub async fn track(
        self,
        pubkey: String,
        target_slot: u64,
        committee_index: u64,
        block_root: String,
    ) -> Result<()> {
        let mut rx = self.bus.subscribe();
        let validator = self
            .validators
            .get(&pubkey)
            .ok_or_else(|| anyhow!("unknown validator {pubkey}"))?;
        let primary = validator
            .beacon_nodes
            .first()
            .ok_or_else(|| anyhow!("validator {pubkey} has no beacon node"))?;
        let primary_url = Url::parse(primary)?;
        let client = self.clients.create(&primary_url);
        let config: NetworkConfig = match client.get_spec().await {
            Ok(spec) => spec.into(),
            Err(_) => NetworkConfig::known(&validator.network).unwrap_or_else(NetworkConfig::mainnet),
        };

        let mut inclusion_slot = 0u64;
        let mut pending_skips = 0u64;
        let mut empty_blocks = 0u64;
        let mut last_checked = target_slot;

        'search: loop {
            let head = match rx.recv().await {
                Ok(Fact::SlotUpdated { url, slot }) if url == primary_url => slot,
                Ok(Fact::ValidatorRemoved { pubkey: p }) if p == pubkey => break,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    log::warn!("Effectiveness tracker for {pubkey} lagged by {missed} facts");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            if head <= last_checked {
                continue;
            }
            // the head stream can jump several slots at once, every slot in
            // the gap still has to be inspected for the attestation
            for slot in (last_checked + 1)..=head {
                if slot > target_slot + SEARCH_WINDOW_SLOTS {
                    break 'search;
                }
                match client.get_block_attestations(slot).await {
                    // skipped slot, the block never existed
                    Ok(None) => pending_skips += 1,
                    Ok(Some(attestations)) => {
                        let found = attestations.iter().any(|attestation| {
                            attestation.data.slot == target_slot
                                && attestation.data.index == committee_index
                                && attestation.data.beacon_block_root == block_root
                        });
                        if found {
                            inclusion_slot = slot;
                            break 'search;
                        }
                        empty_blocks += 1;
                        if empty_blocks >= EMPTY_BLOCK_LIMIT + pending_skips {
                            break 'search;
                        }
                    }
                    Err(err) => log::warn!("Failed to get attestations at slot {slot}: {err:#}"),
                }
            }
            last_checked = head;
        }

        // attestation never observed: assume best-case inclusion in the next
        // slot rather than reporting a false miss
        if inclusion_slot == 0 {
            inclusion_slot = target_slot + 1;
        }
        let record = AttestationEffectiveness {
            epoch: config.epoch_at_slot(target_slot),
            target_slot,
            inclusion_slot,
            efficiency: efficiency(target_slot, inclusion_slot),
            time: now_millis(),
        };
        log::info!(
            "Attestation by {pubkey} for slot {target_slot} included at {inclusion_slot}, efficiency {:.2}",
            record.efficiency
        );
        self.store.add_effectiveness_record(&pubkey, &record).await
    }
}

/// `1 / (inclusion - target)`, capped at 1.
fn efficiency(target_slot: u64, inclusion_slot: u64) -> f64 {
    let distance = inclusion_slot.saturating_sub(target_slot).max(1);
    (1.0 / distance as f64).min(1.0)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testutil::{MemoryStore, ScriptedClient, SingleClientFactory};
    use client::model::attestation::{Attestation, AttestationData, Checkpoint};
    use common::status::ValidatorStatus;
    use tokio::time::timeout;

    const PUBKEY: &str = "0xabc";
    const NODE: &str = "http://localhost:5052/";
    const ROOT: &str = "0xroot";

    fn registry() -> Arc<ValidatorRegistry> {
        let registry = Arc::new(ValidatorRegistry::new());
        registry.apply(&Fact::ValidatorAdded {
            pubkey: PUBKEY.to_string(),
            name: "Validator 1".to_string(),
            network: "mainnet".to_string(),
            status: ValidatorStatus::Active,
            balance: None,
            beacon_nodes: vec![NODE.to_string()],
        });
        registry
    }

    fn attestation(slot: u64, index: u64, root: &str) -> Attestation {
        Attestation {
            aggregation_bits: "0x01".to_string(),
            data: AttestationData {
                beacon_block_root: root.to_string(),
                index,
                slot,
                source: Checkpoint {
                    epoch: 0,
                    root: "0xsource".to_string(),
                },
                target: Checkpoint {
                    epoch: 0,
                    root: "0xtarget".to_string(),
                },
            },
            signature: "0xsig".to_string(),
        }
    }

    async fn run_tracker(
        client: ScriptedClient,
        slots: Vec<u64>,
    ) -> (Arc<MemoryStore>, AttestationEffectiveness) {
        let bus = EventBus::new();
        let store = Arc::new(MemoryStore::default());
        let tracker = EffectivenessTracker {
            bus: bus.clone(),
            validators: registry(),
            clients: Arc::new(SingleClientFactory::new(client)),
            store: store.clone(),
        };
        let task = tokio::spawn(tracker.track(PUBKEY.to_string(), 100, 0, ROOT.to_string()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        let url = Url::parse(NODE).unwrap();
        for slot in slots {
            bus.publish(Fact::SlotUpdated {
                url: url.clone(),
                slot,
            });
        }
        timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let record = {
            let records = store.effectiveness.lock().unwrap();
            assert_eq!(records.len(), 1);
            assert_eq!(records[0].0, PUBKEY);
            records[0].1.clone()
        };
        (store, record)
    }

    #[tokio::test]
    async fn inclusion_two_slots_late_halves_efficiency() {
        let client = ScriptedClient::default()
            .with_attestations(101, Some(vec![attestation(99, 0, "0xother")]))
            .with_attestations(102, Some(vec![attestation(100, 0, ROOT)]));
        let (_store, record) = run_tracker(client, vec![101, 102]).await;
        assert_eq!(record.target_slot, 100);
        assert_eq!(record.inclusion_slot, 102);
        assert!((record.efficiency - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn skipped_slots_extend_the_search() {
        let client = ScriptedClient::default()
            .with_attestations(101, None)
            .with_attestations(102, Some(vec![attestation(100, 0, ROOT)]));
        let (_store, record) = run_tracker(client, vec![101, 102]).await;
        assert_eq!(record.inclusion_slot, 102);
        assert!((record.efficiency - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn slots_jumped_over_by_the_head_stream_are_still_checked() {
        // inclusion sits at 103 but the first head event past the target
        // already reports 105
        let client = ScriptedClient::default()
            .with_attestations(103, Some(vec![attestation(100, 0, ROOT)]));
        let (_store, record) = run_tracker(client, vec![105, 106, 107]).await;
        assert_eq!(record.inclusion_slot, 103);
        assert!((record.efficiency - 1.0 / 3.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn unobserved_attestation_falls_back_to_best_case() {
        // three empty blocks end the search without a match
        let client = ScriptedClient::default();
        let (_store, record) = run_tracker(client, vec![101, 102, 103]).await;
        assert_eq!(record.inclusion_slot, 101);
        assert!((record.efficiency - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn efficiency_is_capped_at_one() {
        assert!((efficiency(100, 101) - 1.0).abs() < f64::EPSILON);
        assert!((efficiency(100, 102) - 0.5).abs() < f64::EPSILON);
        assert!((efficiency(100, 100) - 1.0).abs() < f64::EPSILON);
    }
}
