//! Atomic block persistence: one database transaction per packed block.

use super::models::{BlockRow, EventRow, PackedBlock, TxRow};
use super::sink::BlockSink;
use crate::runtime::status::StatusHolder;
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::sync::Arc;

/// Writes packed blocks into Postgres and keeps the sync-state insertion
/// counter current.
pub struct Persister {
    pool: PgPool,
    status: Arc<StatusHolder>,
}

impl Persister {
    pub fn new(pool: PgPool, status: Arc<StatusHolder>) -> Self {
        Self { pool, status }
    }

    /// Commits the block, its transactions and its events together.
    ///
    /// Conflict policy at the block's height:
    /// - stored header field-wise identical to the incoming one: idempotent
    ///   success, nothing written;
    /// - stored header differs (reorg): the old row is deleted, cascading to
    ///   its transactions and events, and the incoming rows are inserted
    ///   afresh.
    async fn store(&self, packed: PackedBlock) -> Result<()> {
        let number = packed.block.number;
        let mut db_tx = self
            .pool
            .begin()
            .await
            .context("failed to open database transaction")?;

        let existing = existing_block(&mut db_tx, number).await?;
        let fresh_insert = match &existing {
            None => true,
            Some(stored) if stored.similar_to(&packed.block) => {
                tracing::debug!(number, hash = %packed.block.hash, "block already stored");
                return Ok(());
            }
            Some(stored) => {
                tracing::info!(
                    number,
                    stored_hash = %stored.hash,
                    incoming_hash = %packed.block.hash,
                    "superseding reorged block"
                );
                sqlx::query("DELETE FROM blocks WHERE hash = $1")
                    .bind(&stored.hash)
                    .execute(&mut *db_tx)
                    .await
                    .with_context(|| format!("failed to delete reorged block {number}"))?;
                false
            }
        };

        insert_block(&mut db_tx, &packed.block).await?;
        for packed_tx in &packed.transactions {
            insert_transaction(&mut db_tx, &packed_tx.tx).await?;
            for event in &packed_tx.events {
                insert_event(&mut db_tx, event).await?;
            }
        }

        db_tx
            .commit()
            .await
            .with_context(|| format!("failed to commit block {number}"))?;

        if fresh_insert {
            self.status.increment_blocks_inserted();
        }
        Ok(())
    }
}

impl BlockSink for Persister {
    fn store_block<'a>(&'a self, packed: PackedBlock) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.store(packed))
    }
}

async fn existing_block(
    db_tx: &mut Transaction<'_, Postgres>,
    number: u64,
) -> Result<Option<BlockRow>> {
    let row = sqlx::query(
        "SELECT hash, number, time, parenthash, difficulty, gasused, gaslimit, nonce, miner, \
         size, stateroothash, unclehash, txroothash, receiptroothash, extradata \
         FROM blocks WHERE number = $1",
    )
    .bind(number as i64)
    .fetch_optional(&mut **db_tx)
    .await
    .with_context(|| format!("failed to read stored block {number}"))?;

    let Some(row) = row else {
        return Ok(None);
    };

    Ok(Some(BlockRow {
        hash: row.try_get("hash")?,
        number: row.try_get::<i64, _>("number")? as u64,
        time: row.try_get::<i64, _>("time")? as u64,
        parent_hash: row.try_get("parenthash")?,
        difficulty: row.try_get("difficulty")?,
        gas_used: row.try_get::<i64, _>("gasused")? as u64,
        gas_limit: row.try_get::<i64, _>("gaslimit")? as u64,
        nonce: row.try_get("nonce")?,
        miner: row.try_get("miner")?,
        size: row.try_get("size")?,
        state_root: row.try_get("stateroothash")?,
        uncle_hash: row.try_get("unclehash")?,
        tx_root: row.try_get("txroothash")?,
        receipt_root: row.try_get("receiptroothash")?,
        extra_data: row.try_get::<Option<Vec<u8>>, _>("extradata")?.unwrap_or_default(),
    }))
}

async fn insert_block(db_tx: &mut Transaction<'_, Postgres>, block: &BlockRow) -> Result<()> {
    sqlx::query(
        "INSERT INTO blocks (hash, number, time, parenthash, difficulty, gasused, gaslimit, \
         nonce, miner, size, stateroothash, unclehash, txroothash, receiptroothash, extradata) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
    )
    .bind(&block.hash)
    .bind(block.number as i64)
    .bind(block.time as i64)
    .bind(&block.parent_hash)
    .bind(&block.difficulty)
    .bind(block.gas_used as i64)
    .bind(block.gas_limit as i64)
    .bind(&block.nonce)
    .bind(&block.miner)
    .bind(block.size)
    .bind(&block.state_root)
    .bind(&block.uncle_hash)
    .bind(&block.tx_root)
    .bind(&block.receipt_root)
    .bind(&block.extra_data)
    .execute(&mut **db_tx)
    .await
    .with_context(|| format!("failed to insert block {}", block.number))?;
    Ok(())
}

// A transaction already stored under a different (reorged-away) block moves
// to the incoming block rather than rejecting the whole commit.
async fn insert_transaction(db_tx: &mut Transaction<'_, Postgres>, tx: &TxRow) -> Result<()> {
    sqlx::query(
        "INSERT INTO transactions (hash, \"from\", \"to\", contract, value, data, gas, gasprice, \
         cost, nonce, state, blockhash) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
         ON CONFLICT (hash) DO UPDATE SET \
         \"from\" = EXCLUDED.\"from\", \"to\" = EXCLUDED.\"to\", \
         contract = EXCLUDED.contract, value = EXCLUDED.value, data = EXCLUDED.data, \
         gas = EXCLUDED.gas, gasprice = EXCLUDED.gasprice, cost = EXCLUDED.cost, \
         nonce = EXCLUDED.nonce, state = EXCLUDED.state, blockhash = EXCLUDED.blockhash",
    )
    .bind(&tx.hash)
    .bind(&tx.from)
    .bind(&tx.to)
    .bind(&tx.contract)
    .bind(&tx.value)
    .bind(&tx.data)
    .bind(tx.gas as i64)
    .bind(&tx.gas_price)
    .bind(&tx.cost)
    .bind(tx.nonce as i64)
    .bind(tx.state as i16)
    .bind(&tx.block_hash)
    .execute(&mut **db_tx)
    .await
    .with_context(|| format!("failed to insert transaction {}", tx.hash))?;
    Ok(())
}

async fn insert_event(db_tx: &mut Transaction<'_, Postgres>, event: &EventRow) -> Result<()> {
    sqlx::query(
        "INSERT INTO events (blockhash, \"index\", origin, topics, data, txhash) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         ON CONFLICT (blockhash, \"index\") DO UPDATE SET \
         origin = EXCLUDED.origin, topics = EXCLUDED.topics, data = EXCLUDED.data, \
         txhash = EXCLUDED.txhash",
    )
    .bind(&event.block_hash)
    .bind(event.index as i32)
    .bind(&event.origin)
    .bind(&event.topics)
    .bind(&event.data)
    .bind(&event.tx_hash)
    .execute(&mut **db_tx)
    .await
    .with_context(|| {
        format!(
            "failed to insert event {} of block {}",
            event.index, event.block_hash
        )
    })?;
    Ok(())
}
