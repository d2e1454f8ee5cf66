use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use common::network::NetworkConfig;

/// A running validator client bound to one public key.
#[async_trait]
pub trait SigningService: Sync + Send {
    async fn start(&self) -> Result<()>;
    async fn stop(&self) -> Result<()>;
}

/// Durable slashing-protection state owned by the signing engine.
#[async_trait]
pub trait SlashingProtection: Sync + Send {
    async fn missing_imported_protection(&self, pubkey: &str) -> Result<bool>;
    async fn import_interchange(&self, interchange: serde_json::Value, genesis_validators_root: &str) -> Result<()>;
}

/// Constructs signing services. Key material stays behind this seam.
pub trait SigningServiceFactory: Sync + Send {
    fn create(&self, pubkey: &str, beacon_url: &str, config: &NetworkConfig) -> Result<Arc<dyn SigningService>>;
}
