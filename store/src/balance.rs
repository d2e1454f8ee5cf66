use anyhow::Result;
use async_trait::async_trait;
use common::records::BalanceRecord;
use deadpool_postgres::Pool;
use service::BalanceRepository;

use crate::get_client;

pub struct PostgresBalanceRepository {
    pool: Pool,
}

impl PostgresBalanceRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BalanceRepository for PostgresBalanceRepository {
    async fn add_balance_record(&self, pubkey: &str, record: &BalanceRecord) -> Result<()> {
        let client = get_client(&self.pool).await?;
        client
            .execute(
                "INSERT INTO balance_record (pubkey, epoch, balance, time) VALUES ($1, $2, $3, $4)
                ON CONFLICT (pubkey, epoch) DO UPDATE SET balance = $3, time = $4",
                &[
                    &pubkey,
                    &i64::try_from(record.epoch)?,
                    &record.balance,
                    &record.time,
                ],
            )
            .await?;
        Ok(())
    }
}
