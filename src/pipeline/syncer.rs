//! Range back-fill and the periodic missing-block finder.

use super::fetcher::Ingestor;
use super::workers::WorkerPool;
use crate::store::sink::SyncStore;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Blocks examined per store round-trip during a sync pass.
const SYNC_WINDOW: u64 = 10_000;

pub struct SyncerParams {
    pub ingestor: Ingestor,
    pub store: Arc<dyn SyncStore>,
    pub from: u64,
    pub to: u64,
    pub scan_interval: Duration,
    pub shutdown: CancellationToken,
}

/// Given the ascending block numbers already present, returns the numbers
/// missing from `[from, to]` inclusive.
pub fn find_missing_blocks(found: &[u64], from: u64, to: u64) -> Vec<u64> {
    if from > to {
        return Vec::new();
    }

    let mut absent = Vec::with_capacity((to - from + 1) as usize);
    for number in from..=to {
        let idx = found.partition_point(|&present| present < number);
        if !(idx < found.len() && found[idx] == number) {
            absent.push(number);
        }
    }
    absent
}

/// Walks `[from, to]` (either direction) in fixed windows and enqueues every
/// block the store does not yet hold.
pub async fn sync_range<F>(store: &dyn SyncStore, from: u64, to: u64, enqueue: &F) -> Result<()>
where
    F: Fn(u64),
{
    let (from, to) = if from <= to { (from, to) } else { (to, from) };

    let mut window_start = from;
    loop {
        let window_end = window_start.saturating_add(SYNC_WINDOW - 1).min(to);
        let present = store.block_numbers_in_range(window_start, window_end).await?;
        let window_len = (window_end - window_start + 1) as usize;

        if present.is_empty() {
            for number in window_start..=window_end {
                enqueue(number);
            }
        } else if present.len() != window_len {
            for number in find_missing_blocks(&present, window_start, window_end) {
                enqueue(number);
            }
        }

        if window_end == to {
            break;
        }
        window_start = window_end + 1;
    }
    Ok(())
}

/// Back-fills the startup gap, then settles into the endless missing-block
/// finder. Runs until cancellation.
pub async fn run(params: SyncerParams) {
    let SyncerParams {
        ingestor,
        store,
        from,
        to,
        scan_interval,
        shutdown,
    } = params;

    let workers = WorkerPool::new(ingestor.worker_count());

    tracing::info!(from, to, "starting block syncer");
    let enqueue = |number: u64| submit_backfill(&ingestor, &workers, number, None);
    if let Err(err) = sync_range(store.as_ref(), from, to, &enqueue).await {
        tracing::error!(error = %err, "initial sync pass failed");
    }
    tracing::info!("stopping block syncer");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = sleep(scan_interval) => {}
        }

        tracing::info!("starting missing block finder");
        let current = match store.current_block_number().await {
            Ok(Some(number)) => number,
            Ok(None) => continue,
            Err(err) => {
                tracing::warn!(error = %err, "failed to read current block number");
                continue;
            }
        };

        // A contiguous history holds exactly current + 1 blocks.
        if current + 1 == ingestor.status().block_count_in_db() {
            tracing::info!("no missing blocks found");
            continue;
        }

        let enqueue =
            |number: u64| submit_backfill(&ingestor, &workers, number, Some(store.clone()));
        if let Err(err) = sync_range(store.as_ref(), 0, current, &enqueue).await {
            tracing::warn!(error = %err, "missing block scan failed");
        }
        tracing::info!("stopping missing block finder");
    }
    tracing::debug!("block syncer stopped");
}

/// Submits one back-fill job. With `recheck` set, the job verifies the block
/// is still absent right before enqueueing; the finder rescans wide ranges
/// and most candidates will have landed in the meantime.
fn submit_backfill(
    ingestor: &Ingestor,
    workers: &WorkerPool,
    number: u64,
    recheck: Option<Arc<dyn SyncStore>>,
) {
    let ingestor = ingestor.clone();
    workers.spawn(async move {
        if let Some(store) = recheck {
            match store.has_block(number).await {
                Ok(true) => return,
                Ok(false) => {}
                Err(err) => {
                    tracing::warn!(number, error = %err, "failed to re-check block presence");
                    return;
                }
            }
        }

        if !ingestor.queue().put(number).await {
            return;
        }

        match ingestor.fetch_block_by_number(number).await {
            Ok(()) => {
                ingestor.queue().unconfirmed_done(number).await;
            }
            Err(err) => {
                tracing::warn!(number, error = %err, "failed to sync block");
                ingestor.telemetry().record_block_failed();
                ingestor.queue().unconfirmed_failed(number).await;
            }
        }
    });
}
