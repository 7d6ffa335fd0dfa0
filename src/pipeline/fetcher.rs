//! Block assembly: fetch a block, fan out its receipt lookups, and hand the
//! packed result to the persister.
//!
//! Failure of any single transaction abandons the whole block; the caller
//! reports the failure to the owning queue lane and the block is retried
//! later under backoff. Persistence is therefore all-or-nothing per block
//! and retries stay idempotent.

use super::pack;
use super::workers::WorkerPool;
use crate::node::source::ChainSource;
use crate::queue::BlockProcessorQueue;
use crate::runtime::status::StatusHolder;
use crate::runtime::telemetry::Telemetry;
use crate::store::models::{PackedBlock, PackedTransaction};
use crate::store::sink::BlockSink;
use alloy::network::TransactionResponse as _;
use alloy::primitives::B256;
use alloy::rpc::types::{Block, BlockTransactions, Transaction};
use anyhow::{anyhow, bail, Context, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;

pub struct IngestorParams {
    pub source: Arc<dyn ChainSource>,
    pub sink: Arc<dyn BlockSink>,
    pub queue: Arc<BlockProcessorQueue>,
    pub status: Arc<StatusHolder>,
    pub telemetry: Arc<Telemetry>,
    /// Pool size for the per-block transaction fan-out.
    pub worker_count: usize,
}

/// Stateless front of the ingestion pipeline, shared by the listener, the
/// syncer and the retry manager.
#[derive(Clone)]
pub struct Ingestor {
    source: Arc<dyn ChainSource>,
    sink: Arc<dyn BlockSink>,
    queue: Arc<BlockProcessorQueue>,
    status: Arc<StatusHolder>,
    telemetry: Arc<Telemetry>,
    worker_count: usize,
}

impl Ingestor {
    pub fn new(params: IngestorParams) -> Self {
        Self {
            source: params.source,
            sink: params.sink,
            queue: params.queue,
            status: params.status,
            telemetry: params.telemetry,
            worker_count: params.worker_count.max(1),
        }
    }

    pub fn queue(&self) -> &Arc<BlockProcessorQueue> {
        &self.queue
    }

    pub fn status(&self) -> &Arc<StatusHolder> {
        &self.status
    }

    pub fn telemetry(&self) -> &Arc<Telemetry> {
        &self.telemetry
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub async fn fetch_block_by_hash(&self, hash: B256) -> Result<()> {
        let block = self
            .source
            .block_by_hash(hash)
            .await
            .with_context(|| format!("failed to fetch block {hash}"))?
            .ok_or_else(|| anyhow!("block {hash} not found on node"))?;
        self.process_block(block).await
    }

    pub async fn fetch_block_by_number(&self, number: u64) -> Result<()> {
        let block = self
            .source
            .block_by_number(number)
            .await
            .with_context(|| format!("failed to fetch block {number}"))?
            .ok_or_else(|| anyhow!("block {number} not found on node"))?;
        self.process_block(block).await
    }

    /// Packs and persists one block: every transaction receipt is fetched
    /// concurrently through a pool owned by this call, and each packed
    /// transaction lands at its original block position.
    async fn process_block(&self, block: Block) -> Result<()> {
        let started = Instant::now();
        let header = block.header;
        let number = header.number;

        let transactions = match block.transactions {
            BlockTransactions::Full(transactions) => transactions,
            BlockTransactions::Hashes(hashes) if hashes.is_empty() => Vec::new(),
            BlockTransactions::Hashes(_) => {
                bail!("block {number} was returned without full transaction bodies")
            }
            BlockTransactions::Uncle => Vec::new(),
        };

        if transactions.is_empty() {
            let packed = PackedBlock {
                block: pack::build_block_row(&header),
                transactions: Vec::new(),
            };
            self.sink
                .store_block(packed)
                .await
                .with_context(|| format!("failed to persist block {number}"))?;
            self.finish_block(number, 0, started);
            return Ok(());
        }

        let base_fee = header.base_fee_per_gas;
        let total = transactions.len();
        let workers = WorkerPool::new(self.worker_count);
        let (results_tx, mut results_rx) =
            mpsc::channel::<(usize, Option<PackedTransaction>)>(total);

        for (index, tx) in transactions.into_iter().enumerate() {
            let source = Arc::clone(&self.source);
            let telemetry = Arc::clone(&self.telemetry);
            let results = results_tx.clone();
            workers.spawn(async move {
                let packed = match pack_transaction(source.as_ref(), &tx, base_fee).await {
                    Ok(packed) => Some(packed),
                    Err(err) => {
                        telemetry.record_receipt_error();
                        tracing::warn!(
                            tx = %tx.tx_hash(),
                            block = number,
                            error = %err,
                            "failed to pack transaction"
                        );
                        None
                    }
                };
                let _ = results.send((index, packed)).await;
            });
        }
        drop(results_tx);

        let mut packed_txs: Vec<Option<PackedTransaction>> = vec![None; total];
        let mut failures = 0usize;
        for _ in 0..total {
            let Some((index, packed)) = results_rx.recv().await else {
                bail!("transaction fetchers of block {number} exited early");
            };
            match packed {
                Some(packed) => packed_txs[index] = Some(packed),
                None => failures += 1,
            }
        }

        if failures > 0 {
            bail!("{failures} of {total} transaction fetches failed for block {number}");
        }

        let packed = PackedBlock {
            block: pack::build_block_row(&header),
            transactions: packed_txs.into_iter().flatten().collect(),
        };
        self.sink
            .store_block(packed)
            .await
            .with_context(|| format!("failed to persist block {number}"))?;
        self.finish_block(number, total, started);
        Ok(())
    }

    fn finish_block(&self, number: u64, transactions: usize, started: Instant) {
        self.status.increment_blocks_processed();
        self.telemetry.record_block_persisted();
        tracing::info!(
            number,
            transactions,
            took = ?started.elapsed(),
            "block persisted"
        );
    }
}

async fn pack_transaction(
    source: &dyn ChainSource,
    tx: &Transaction,
    base_fee: Option<u64>,
) -> Result<PackedTransaction> {
    let hash = tx.tx_hash();
    let receipt = source
        .transaction_receipt(hash)
        .await
        .with_context(|| format!("failed to fetch receipt of {hash}"))?
        .ok_or_else(|| anyhow!("receipt of {hash} not available"))?;
    let sender = pack::recover_sender(tx)?;
    pack::build_packed_tx(tx, sender, &receipt, base_fee)
}
