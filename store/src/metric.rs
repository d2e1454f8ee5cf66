use anyhow::Result;
use async_trait::async_trait;
use common::{metrics::NetworkMetric, util::now_millis};
use deadpool_postgres::Pool;
use service::MetricRepository;
use tokio_postgres::Row;

use crate::get_client;

const RETENTION_MILLIS: i64 = 25 * 60 * 60 * 1000;

pub struct PostgresMetricRepository {
    pool: Pool,
}

impl PostgresMetricRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

fn metric_from_row(row: Row) -> Result<NetworkMetric> {
    let code: i32 = row.try_get("code")?;
    Ok(NetworkMetric {
        url: row.try_get("url")?,
        code: u16::try_from(code)?,
        latency: row.try_get("latency")?,
        time: row.try_get("time")?,
    })
}

#[async_trait]
impl MetricRepository for PostgresMetricRepository {
    async fn add_metric(&self, metric: &NetworkMetric) -> Result<()> {
        let client = get_client(&self.pool).await?;
        client
            .execute(
                "INSERT INTO network_metric (url, code, latency, time) VALUES ($1, $2, $3, $4)",
                &[&metric.url, &(metric.code as i32), &metric.latency, &metric.time],
            )
            .await?;
        // rolling retention window, pruned on every insert
        let cutoff = now_millis() - RETENTION_MILLIS;
        client
            .execute("DELETE FROM network_metric WHERE time < $1", &[&cutoff])
            .await?;
        Ok(())
    }

    async fn metrics_in_range(&self, url: &str, from: i64, to: i64) -> Result<Vec<NetworkMetric>> {
        let client = get_client(&self.pool).await?;
        let rows = client
            .query(
                "SELECT url, code, latency, time FROM network_metric
                WHERE url = $1 AND time > $2 AND time < $3 ORDER BY time",
                &[&url, &from, &to],
            )
            .await?;
        rows.into_iter().map(metric_from_row).collect()
    }

    async fn delete_metrics(&self, url: &str) -> Result<()> {
        let client = get_client(&self.pool).await?;
        client
            .execute("DELETE FROM network_metric WHERE url = $1", &[&url])
            .await?;
        Ok(())
    }
}
