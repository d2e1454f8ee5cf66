use anyhow::Result;
use async_trait::async_trait;
use common::records::AttestationEffectiveness;
use deadpool_postgres::Pool;
use service::EffectivenessRepository;

use crate::get_client;

pub struct PostgresEffectivenessRepository {
    pool: Pool,
}

impl PostgresEffectivenessRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EffectivenessRepository for PostgresEffectivenessRepository {
    async fn add_effectiveness_record(&self, pubkey: &str, record: &AttestationEffectiveness) -> Result<()> {
        let client = get_client(&self.pool).await?;
        client
            .execute(
                "INSERT INTO attestation_effectiveness
                (pubkey, epoch, target_slot, inclusion_slot, efficiency, time)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (pubkey, target_slot) DO NOTHING",
                &[
                    &pubkey,
                    &i64::try_from(record.epoch)?,
                    &i64::try_from(record.target_slot)?,
                    &i64::try_from(record.inclusion_slot)?,
                    &record.efficiency,
                    &record.time,
                ],
            )
            .await?;
        Ok(())
    }
}
