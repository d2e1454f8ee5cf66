use anyhow::Result;
use async_trait::async_trait;
use deadpool_postgres::Pool;
use service::{model::StoredValidator, BeaconNodeRepository, ValidatorRepository};
use tokio_postgres::Row;

use crate::get_client;

pub struct PostgresValidatorRepository {
    pool: Pool,
}

impl PostgresValidatorRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

fn validator_from_row(row: Row) -> Result<StoredValidator> {
    Ok(StoredValidator {
        pubkey: row.try_get("pubkey")?,
        name: row.try_get("name")?,
        network: row.try_get("network")?,
    })
}

#[async_trait]
impl ValidatorRepository for PostgresValidatorRepository {
    async fn get_validators(&self) -> Result<Vec<StoredValidator>> {
        let client = get_client(&self.pool).await?;
        let rows = client
            .query("SELECT pubkey, name, network FROM validator ORDER BY pubkey", &[])
            .await?;
        rows.into_iter().map(validator_from_row).collect()
    }

    async fn upsert_validator(&self, validator: &StoredValidator) -> Result<()> {
        let client = get_client(&self.pool).await?;
        client
            .execute(
                "INSERT INTO validator (pubkey, name, network) VALUES ($1, $2, $3)
                ON CONFLICT (pubkey) DO UPDATE SET name = $2, network = $3",
                &[&validator.pubkey, &validator.name, &validator.network],
            )
            .await?;
        Ok(())
    }

    async fn remove_validator(&self, pubkey: &str) -> Result<bool> {
        let client = get_client(&self.pool).await?;
        let removed = client
            .execute("DELETE FROM validator WHERE pubkey = $1", &[&pubkey])
            .await?;
        client
            .execute("DELETE FROM validator_beacon_node WHERE pubkey = $1", &[&pubkey])
            .await?;
        Ok(removed > 0)
    }
}

pub struct PostgresBeaconNodeRepository {
    pool: Pool,
}

impl PostgresBeaconNodeRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn nodes(&self, pubkey: &str) -> Result<Vec<String>> {
        let client = get_client(&self.pool).await?;
        let rows = client
            .query(
                "SELECT url FROM validator_beacon_node WHERE pubkey = $1 ORDER BY position",
                &[&pubkey],
            )
            .await?;
        rows.into_iter().map(|row| Ok(row.try_get("url")?)).collect()
    }
}

#[async_trait]
impl BeaconNodeRepository for PostgresBeaconNodeRepository {
    async fn get_beacon_nodes(&self, pubkey: &str) -> Result<Vec<String>> {
        self.nodes(pubkey).await
    }

    async fn add_beacon_node(&self, pubkey: &str, url: &str) -> Result<Vec<String>> {
        let client = get_client(&self.pool).await?;
        client
            .execute(
                "INSERT INTO validator_beacon_node (pubkey, url, position)
                SELECT $1, $2, COALESCE(MAX(position) + 1, 0)
                FROM validator_beacon_node WHERE pubkey = $1
                ON CONFLICT (pubkey, url) DO NOTHING",
                &[&pubkey, &url],
            )
            .await?;
        self.nodes(pubkey).await
    }

    async fn remove_beacon_node(&self, pubkey: &str, url: &str) -> Result<Vec<String>> {
        let client = get_client(&self.pool).await?;
        client
            .execute(
                "DELETE FROM validator_beacon_node WHERE pubkey = $1 AND url = $2",
                &[&pubkey, &url],
            )
            .await?;
        self.nodes(pubkey).await
    }

    async fn validators_with_beacon_node(&self, url: &str) -> Result<Vec<String>> {
        let client = get_client(&self.pool).await?;
        let rows = client
            .query(
                "SELECT pubkey FROM validator_beacon_node WHERE url = $1 ORDER BY pubkey",
                &[&url],
            )
            .await?;
        rows.into_iter().map(|row| Ok(row.try_get("pubkey")?)).collect()
    }
}
