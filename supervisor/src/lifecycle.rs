use std::{collections::HashMap, sync::Arc};

use anyhow::{anyhow, bail, Result};
use client::{BeaconApiClient, ClientFactory};
use common::{network::NetworkConfig, records::BalanceRecord, util::now_millis};
use service::{
    signing::{SigningService, SigningServiceFactory, SlashingProtection},
    Store,
};
use tokio::sync::{broadcast, Mutex};
use url::Url;

use crate::{
    bus::{EventBus, Fact},
    registry::ValidatorRegistry,
};

/// Starts and stops signing services for validators and keeps balances
/// refreshed. One service per public key; a second start request reuses the
/// existing one.
pub struct ValidatorLifecycle {
    bus: EventBus,
    validators: Arc<ValidatorRegistry>,
    clients: Arc<dyn ClientFactory>,
    store: Arc<dyn Store>,
    slashing: Arc<dyn SlashingProtection>,
    signers: Arc<dyn SigningServiceFactory>,
    services: Mutex<HashMap<String, Arc<dyn SigningService>>>,
}

impl ValidatorLifecycle {
    pub fn new(
        bus: EventBus,
        validators: Arc<ValidatorRegistry>,
        clients: Arc<dyn ClientFactory>,
        store: Arc<dyn Store>,
        slashing: Arc<dyn SlashingProtection>,
        signers: Arc<dyn SigningServiceFactory>,
    ) -> Self {
        Self {
            bus,
            validators,
            clients,
            store,
            slashing,
            signers,
            services: Mutex::new(HashMap::new()),
        }
    }

    pub async fn start(&self, pubkey: &str) -> Result<()> {
        let validator = self
            .validators
            .get(pubkey)
            .ok_or_else(|| anyhow!("unknown validator {pubkey}"))?;
        let primary = validator
            .beacon_nodes
            .first()
            .cloned()
            .ok_or_else(|| anyhow!("validator {pubkey} has no beacon node"))?;
        let primary_url = Url::parse(&primary)?;
        let client = self.clients.create(&primary_url);
        let config = match client.get_spec().await {
            Ok(spec) => spec.into(),
            Err(err) => {
                log::warn!("Network config unavailable for {primary}, using defaults: {err:#}");
                NetworkConfig::known(&validator.network).unwrap_or_else(NetworkConfig::mainnet)
            }
        };

        if self.slashing.missing_imported_protection(pubkey).await? {
            self.import_interchange(pubkey, client.as_ref()).await?;
        }

        let service = {
            let mut services = self.services.lock().await;
            match services.get(pubkey) {
                Some(service) => service.clone(),
                None => {
                    let service = self.signers.create(pubkey, &primary, &config)?;
                    services.insert(pubkey.to_string(), service.clone());
                    service
                }
            }
        };
        service.start().await?;
        log::info!("Started signing service for {pubkey}");
        self.bus.publish(Fact::ServiceStarted {
            pubkey: pubkey.to_string(),
        });
        Ok(())
    }

    pub async fn stop(&self, pubkey: &str) -> Result<()> {
        let service = self
            .services
            .lock()
            .await
            .remove(pubkey)
            .ok_or_else(|| anyhow!("no signing service registered for {pubkey}"))?;
        service.stop().await?;
        log::info!("Stopped signing service for {pubkey}");
        self.bus.publish(Fact::ServiceStopped {
            pubkey: pubkey.to_string(),
        });
        Ok(())
    }

    /// Drops the signing service of a removed validator so a later re-import
    /// of the same key builds a fresh one.
    pub async fn discard(&self, pubkey: &str) {
        if let Some(service) = self.services.lock().await.remove(pubkey) {
            if let Err(err) = service.stop().await {
                log::warn!("Failed to stop signing service for removed validator {pubkey}: {err:#}");
            }
            log::info!("Discarded signing service for removed validator {pubkey}");
        }
    }

    /// First start without imported slashing protection: prompt the user and
    /// wait for their answer on the bus.
    async fn import_interchange(&self, pubkey: &str, client: &dyn BeaconApiClient) -> Result<()> {
        let mut rx = self.bus.subscribe();
        self.bus.publish(Fact::InterchangePromptRequested {
            pubkey: pubkey.to_string(),
        });
        log::info!("Waiting for slashing interchange decision for {pubkey}");
        loop {
            match rx.recv().await {
                Ok(Fact::InterchangeSupplied { pubkey: p, path }) if p == pubkey => {
                    let genesis = client
                        .get_genesis()
                        .await?
                        .ok_or_else(|| anyhow!("genesis unavailable, cannot validate interchange"))?;
                    let raw = tokio::fs::read_to_string(&path).await?;
                    let interchange: serde_json::Value = serde_json::from_str(&raw)?;
                    self.slashing
                        .import_interchange(interchange, &genesis.genesis_validators_root)
                        .await?;
                    log::info!("Imported slashing interchange for {pubkey}");
                    return Ok(());
                }
                Ok(Fact::InterchangeSkipped { pubkey: p }) if p == pubkey => return Ok(()),
                Ok(Fact::InterchangeCanceled { pubkey: p }) if p == pubkey => {
                    bail!("validator start canceled by user")
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    log::warn!("Interchange wait for {pubkey} lagged by {missed} facts");
                }
                Err(broadcast::error::RecvError::Closed) => bail!("event bus closed"),
            }
        }
    }

    /// Long-running task: refreshes the validator's balance on every epoch
    /// transition of an associated beacon, until the validator is removed.
    pub async fn balance_updater(self: Arc<Self>, pubkey: String) {
        let mut rx = self.bus.subscribe();
        log::info!("Tracking balance for {pubkey}");
        loop {
            match rx.recv().await {
                Ok(Fact::ValidatorRemoved { pubkey: p }) if p == pubkey => break,
                Ok(Fact::BalanceRefresh { url, epoch, .. }) => {
                    if let Err(err) = self.refresh_balance(&pubkey, &url, epoch).await {
                        log::error!("Balance refresh failed for {pubkey}: {err:#}");
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    log::warn!("Balance updater for {pubkey} lagged by {missed} facts");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        log::info!("Stopped tracking balance for {pubkey}");
    }

    async fn refresh_balance(&self, pubkey: &str, url: &Url, epoch: u64) -> Result<()> {
        let validator = match self.validators.get(pubkey) {
            Some(validator) => validator,
            None => return Ok(()),
        };
        // refresh triggers from beacons this validator no longer uses are stale
        if !validator.beacon_nodes.contains(&url.to_string()) {
            return Ok(());
        }
        let client = self.clients.create(url);
        if let Some(data) = client.get_validator(pubkey).await? {
            self.store
                .add_balance_record(
                    pubkey,
                    &BalanceRecord {
                        epoch,
                        balance: data.balance,
                        time: now_millis(),
                    },
                )
                .await?;
            self.bus.publish(Fact::ValidatorBalanceUpdated {
                pubkey: pubkey.to_string(),
                balance: data.balance,
            });
        }
        Ok(())
    }
}
