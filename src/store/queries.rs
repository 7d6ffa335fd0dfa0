use super::sink::SyncStore;
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_CONNECTIONS: u32 = 16;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS blocks (
    hash            CHAR(66) PRIMARY KEY,
    number          BIGINT NOT NULL UNIQUE,
    time            BIGINT NOT NULL,
    parenthash      CHAR(66) NOT NULL,
    difficulty      VARCHAR NOT NULL,
    gasused         BIGINT NOT NULL,
    gaslimit        BIGINT NOT NULL,
    nonce           VARCHAR NOT NULL,
    miner           CHAR(42) NOT NULL,
    size            FLOAT8 NOT NULL,
    stateroothash   CHAR(66) NOT NULL,
    unclehash       CHAR(66) NOT NULL,
    txroothash      CHAR(66) NOT NULL,
    receiptroothash CHAR(66) NOT NULL,
    extradata       BYTEA
);
CREATE INDEX IF NOT EXISTS blocks_number_idx ON blocks (number ASC);
CREATE INDEX IF NOT EXISTS blocks_time_idx ON blocks (time ASC);

CREATE TABLE IF NOT EXISTS transactions (
    hash      CHAR(66) PRIMARY KEY,
    "from"    CHAR(42) NOT NULL,
    "to"      CHAR(42),
    contract  CHAR(42),
    value     VARCHAR,
    data      BYTEA,
    gas       BIGINT NOT NULL,
    gasprice  VARCHAR NOT NULL,
    cost      VARCHAR NOT NULL,
    nonce     BIGINT NOT NULL,
    state     SMALLINT NOT NULL,
    blockhash CHAR(66) NOT NULL REFERENCES blocks (hash) ON DELETE CASCADE
);
CREATE INDEX IF NOT EXISTS transactions_from_idx ON transactions ("from");
CREATE INDEX IF NOT EXISTS transactions_to_idx ON transactions ("to");
CREATE INDEX IF NOT EXISTS transactions_contract_idx ON transactions (contract);
CREATE INDEX IF NOT EXISTS transactions_nonce_idx ON transactions (nonce);
CREATE INDEX IF NOT EXISTS transactions_blockhash_idx ON transactions (blockhash);

CREATE TABLE IF NOT EXISTS events (
    blockhash CHAR(66) NOT NULL REFERENCES blocks (hash) ON DELETE CASCADE,
    "index"   INTEGER NOT NULL,
    origin    CHAR(42) NOT NULL,
    topics    TEXT[] NOT NULL,
    data      BYTEA,
    txhash    CHAR(66) NOT NULL,
    PRIMARY KEY (blockhash, "index")
);
CREATE INDEX IF NOT EXISTS events_origin_idx ON events (origin);
CREATE INDEX IF NOT EXISTS events_txhash_idx ON events (txhash);
CREATE INDEX IF NOT EXISTS events_topics_idx ON events USING GIN (topics);
"#;

/// Opens the process-wide connection pool.
pub async fn connect(database_url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .acquire_timeout(CONNECT_TIMEOUT)
        .connect(database_url)
        .await
        .context("failed to connect to postgres")
}

/// Applies the table and index DDL. Idempotent.
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .context("failed to apply schema")?;
    Ok(())
}

pub async fn block_count(pool: &PgPool) -> Result<u64> {
    let row = sqlx::query("SELECT COUNT(*) AS count FROM blocks")
        .fetch_one(pool)
        .await
        .context("failed to count blocks")?;
    let count: i64 = row.try_get("count")?;
    Ok(count as u64)
}

pub async fn max_block_number(pool: &PgPool) -> Result<Option<u64>> {
    let row = sqlx::query("SELECT MAX(number) AS number FROM blocks")
        .fetch_one(pool)
        .await
        .context("failed to read max block number")?;
    let number: Option<i64> = row.try_get("number")?;
    Ok(number.map(|value| value as u64))
}

pub async fn block_numbers_in_range(pool: &PgPool, from: u64, to: u64) -> Result<Vec<u64>> {
    let rows = sqlx::query(
        "SELECT number FROM blocks WHERE number >= $1 AND number <= $2 ORDER BY number ASC",
    )
    .bind(from as i64)
    .bind(to as i64)
    .fetch_all(pool)
    .await
    .with_context(|| format!("failed to read block numbers in [{from}, {to}]"))?;

    rows.into_iter()
        .map(|row| {
            let number: i64 = row.try_get("number")?;
            Ok(number as u64)
        })
        .collect()
}

pub async fn has_block(pool: &PgPool, number: u64) -> Result<bool> {
    let row = sqlx::query("SELECT 1 AS present FROM blocks WHERE number = $1")
        .bind(number as i64)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("failed to look up block {number}"))?;
    Ok(row.is_some())
}

/// [`SyncStore`] view over the connection pool, handed to the syncer.
#[derive(Clone)]
pub struct StoreReader {
    pool: PgPool,
}

impl StoreReader {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl SyncStore for StoreReader {
    fn block_numbers_in_range<'a>(
        &'a self,
        from: u64,
        to: u64,
    ) -> BoxFuture<'a, Result<Vec<u64>>> {
        Box::pin(block_numbers_in_range(&self.pool, from, to))
    }

    fn current_block_number<'a>(&'a self) -> BoxFuture<'a, Result<Option<u64>>> {
        Box::pin(max_block_number(&self.pool))
    }

    fn has_block<'a>(&'a self, number: u64) -> BoxFuture<'a, Result<bool>> {
        Box::pin(has_block(&self.pool, number))
    }
}
