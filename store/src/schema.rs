use anyhow::Result;
use deadpool_postgres::Pool;

use crate::get_client;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS beacon (
        url VARCHAR PRIMARY KEY,
        network VARCHAR NOT NULL,
        docker TEXT
    )",
    "CREATE TABLE IF NOT EXISTS validator (
        pubkey VARCHAR PRIMARY KEY,
        name VARCHAR NOT NULL,
        network VARCHAR NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS validator_beacon_node (
        pubkey VARCHAR NOT NULL,
        url VARCHAR NOT NULL,
        position BIGINT NOT NULL,
        PRIMARY KEY (pubkey, url)
    )",
    "CREATE TABLE IF NOT EXISTS network_metric (
        url VARCHAR NOT NULL,
        code INT NOT NULL,
        latency BIGINT NOT NULL,
        time BIGINT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS network_metric_url_time ON network_metric (url, time)",
    "CREATE TABLE IF NOT EXISTS balance_record (
        pubkey VARCHAR NOT NULL,
        epoch BIGINT NOT NULL,
        balance BIGINT NOT NULL,
        time BIGINT NOT NULL,
        PRIMARY KEY (pubkey, epoch)
    )",
    "CREATE TABLE IF NOT EXISTS attestation_effectiveness (
        pubkey VARCHAR NOT NULL,
        epoch BIGINT NOT NULL,
        target_slot BIGINT NOT NULL,
        inclusion_slot BIGINT NOT NULL,
        efficiency DOUBLE PRECISION NOT NULL,
        time BIGINT NOT NULL,
        PRIMARY KEY (pubkey, target_slot)
    )",
];

pub async fn migrate(pool: &Pool) -> Result<()> {
    let client = get_client(pool).await?;
    for statement in SCHEMA {
        client.execute(*statement, &[]).await?;
    }
    log::info!("Database schema is up to date");
    Ok(())
}
