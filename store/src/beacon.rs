use anyhow::Result;
use async_trait::async_trait;
use deadpool_postgres::Pool;
use service::{
    model::{DockerConfig, StoredBeacon},
    BeaconRepository,
};
use tokio_postgres::Row;

use crate::get_client;

pub struct PostgresBeaconRepository {
    pool: Pool,
}

impl PostgresBeaconRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

fn beacon_from_row(row: Row) -> Result<StoredBeacon> {
    let docker: Option<String> = row.try_get("docker")?;
    let docker: Option<DockerConfig> = docker.map(|json| serde_json::from_str(&json)).transpose()?;
    Ok(StoredBeacon {
        url: row.try_get("url")?,
        network: row.try_get("network")?,
        docker,
    })
}

#[async_trait]
impl BeaconRepository for PostgresBeaconRepository {
    async fn get_beacons(&self) -> Result<Vec<StoredBeacon>> {
        let client = get_client(&self.pool).await?;
        let rows = client
            .query("SELECT url, network, docker FROM beacon ORDER BY url", &[])
            .await?;
        rows.into_iter().map(beacon_from_row).collect()
    }

    async fn upsert_beacon(&self, beacon: &StoredBeacon) -> Result<()> {
        let client = get_client(&self.pool).await?;
        let docker = beacon.docker.as_ref().map(serde_json::to_string).transpose()?;
        client
            .execute(
                "INSERT INTO beacon (url, network, docker) VALUES ($1, $2, $3)
                ON CONFLICT (url) DO UPDATE SET network = $2, docker = $3",
                &[&beacon.url, &beacon.network, &docker],
            )
            .await?;
        Ok(())
    }

    async fn remove_beacon(&self, url: &str) -> Result<bool> {
        let client = get_client(&self.pool).await?;
        let removed = client.execute("DELETE FROM beacon WHERE url = $1", &[&url]).await?;
        Ok(removed > 0)
    }
}
