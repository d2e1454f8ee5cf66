use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

use anyhow::Result;
use async_trait::async_trait;
use common::network::NetworkConfig;
use service::signing::{SigningService, SigningServiceFactory, SlashingProtection};

// Stand-ins for the embedded validator client. They keep the lifecycle wiring
// honest until real signing lands; slashing state lives in process memory.

pub struct LoggingSigningService {
    pubkey: String,
    beacon_url: String,
}

#[async_trait]
impl SigningService for LoggingSigningService {
    async fn start(&self) -> Result<()> {
        log::info!(
            "Signing service for {} attached to {} (no-op signer)",
            self.pubkey,
            self.beacon_url
        );
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        log::info!("Signing service for {} stopped", self.pubkey);
        Ok(())
    }
}

#[derive(Default)]
pub struct LoggingSignerFactory;

impl SigningServiceFactory for LoggingSignerFactory {
    fn create(
        &self,
        pubkey: &str,
        beacon_url: &str,
        config: &NetworkConfig,
    ) -> Result<Arc<dyn SigningService>> {
        log::debug!("Creating signer for {pubkey} on {} network", config.name);
        Ok(Arc::new(LoggingSigningService {
            pubkey: pubkey.to_string(),
            beacon_url: beacon_url.to_string(),
        }))
    }
}

#[derive(Default)]
pub struct InMemorySlashingProtection {
    imported: Mutex<HashSet<String>>,
}

#[async_trait]
impl SlashingProtection for InMemorySlashingProtection {
    async fn missing_imported_protection(&self, pubkey: &str) -> Result<bool> {
        let imported = self
            .imported
            .lock()
            .expect("slashing protection lock poisoned");
        Ok(!imported.contains(pubkey))
    }

    async fn import_interchange(
        &self,
        interchange: serde_json::Value,
        genesis_validators_root: &str,
    ) -> Result<()> {
        let mut imported = self
            .imported
            .lock()
            .expect("slashing protection lock poisoned");
        if let Some(data) = interchange.get("data").and_then(|data| data.as_array()) {
            for entry in data {
                if let Some(pubkey) = entry.get("pubkey").and_then(|pubkey| pubkey.as_str()) {
                    imported.insert(pubkey.to_string());
                }
            }
        }
        log::info!("Imported slashing interchange for root {genesis_validators_root}");
        Ok(())
    }
}
