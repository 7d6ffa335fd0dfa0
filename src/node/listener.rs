//! New-heads listener: the entry point of the live ingestion path.
//!
//! Subscribes to the node's head stream, gates every header against the
//! invariants of the startup state, and drives both queue lanes: the fresh
//! head goes through the unconfirmed lane by hash, while one promoted block
//! per header is re-fetched by number through the confirmed lane. The first
//! header also launches the syncer and the retry manager.

use crate::pipeline::fetcher::Ingestor;
use crate::pipeline::workers::WorkerPool;
use crate::pipeline::{retry, syncer};
use crate::store::sink::SyncStore;
use alloy::primitives::B256;
use alloy::providers::{DynProvider, Provider};
use anyhow::{bail, Context, Result};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, PartialEq, Eq)]
pub enum ListenerError {
    /// The first streamed head is not ahead of our own store; the upstream
    /// node is behind the data it once served us.
    StaleFirstHead { received: u64, max_at_startup: u64 },
    /// A later head skipped past `latest + 1`; the stream is unreliable.
    HeadBeyondNext { received: u64, latest: u64 },
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::StaleFirstHead {
                received,
                max_at_startup,
            } => write!(
                f,
                "bad first head {received}: expected a block above {max_at_startup}"
            ),
            ListenerError::HeadBeyondNext { received, latest } => {
                write!(f, "bad head {received}: expected at most {}", latest + 1)
            }
        }
    }
}

impl std::error::Error for ListenerError {}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum HeaderClass {
    First,
    Sequential,
    /// Below `latest + 1`: most likely a reorg at the tip; processed anyway.
    Replay,
}

pub(crate) fn classify_header(
    first: bool,
    number: u64,
    max_at_startup: u64,
    latest: u64,
) -> Result<HeaderClass, ListenerError> {
    if first {
        if number <= max_at_startup {
            return Err(ListenerError::StaleFirstHead {
                received: number,
                max_at_startup,
            });
        }
        return Ok(HeaderClass::First);
    }

    if number > latest + 1 {
        return Err(ListenerError::HeadBeyondNext {
            received: number,
            latest,
        });
    }

    if number == latest + 1 {
        Ok(HeaderClass::Sequential)
    } else {
        Ok(HeaderClass::Replay)
    }
}

pub struct ListenerParams {
    pub websocket: DynProvider,
    pub ingestor: Ingestor,
    pub store: Arc<dyn SyncStore>,
    pub confirmations: u64,
    pub scan_interval: Duration,
    pub shutdown: CancellationToken,
}

pub struct Listener {
    websocket: DynProvider,
    ingestor: Ingestor,
    store: Arc<dyn SyncStore>,
    confirmations: u64,
    scan_interval: Duration,
    shutdown: CancellationToken,
    workers: WorkerPool,
}

impl Listener {
    pub fn new(params: ListenerParams) -> Self {
        let workers = WorkerPool::new(params.ingestor.worker_count());
        Self {
            websocket: params.websocket,
            ingestor: params.ingestor,
            store: params.store,
            confirmations: params.confirmations,
            scan_interval: params.scan_interval,
            shutdown: params.shutdown,
            workers,
        }
    }

    /// Runs until cancellation. Any returned error is fatal to the process:
    /// a broken subscription or a violated head invariant means the replica
    /// can no longer trust its view of the chain.
    pub async fn run(self) -> Result<()> {
        let subscription = self
            .websocket
            .subscribe_blocks()
            .await
            .context("failed to subscribe to new heads")?;
        let mut headers = subscription.into_stream();
        tracing::info!("listening for new block headers");

        let mut first = true;
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return Ok(()),
                header = headers.next() => {
                    let Some(header) = header else {
                        bail!("new heads subscription terminated");
                    };
                    self.handle_header(header.hash, header.number, &mut first).await?;
                }
            }
        }
    }

    async fn handle_header(&self, hash: B256, number: u64, first: &mut bool) -> Result<()> {
        let status = self.ingestor.status();
        let class = classify_header(
            *first,
            number,
            status.max_block_number_at_startup(),
            status.latest_block_number(),
        )?;

        match class {
            HeaderClass::Replay => {
                self.ingestor.telemetry().record_reorg_head();
                tracing::info!(
                    number,
                    expected = status.latest_block_number() + 1,
                    "received block again; likely chain reorganization"
                );
            }
            _ => tracing::info!(number, "received block"),
        }

        status.set_latest_block_number(number);
        self.ingestor.queue().latest(number).await;

        if *first {
            status.set_started_at();

            tokio::spawn(retry::run(self.ingestor.clone(), self.shutdown.clone()));

            // Re-cover the confirmation window below our own maximum: those
            // blocks may have changed while the service was offline.
            let to = status
                .max_block_number_at_startup()
                .saturating_sub(self.confirmations);
            tokio::spawn(syncer::run(syncer::SyncerParams {
                ingestor: self.ingestor.clone(),
                store: self.store.clone(),
                from: number.saturating_sub(1),
                to,
                scan_interval: self.scan_interval,
                shutdown: self.shutdown.clone(),
            }));

            *first = false;
        }

        if let Some(finalized) = self.ingestor.queue().confirmed_next().await {
            tracing::info!(
                number = finalized,
                latest = status.latest_block_number(),
                "processing finalised block"
            );
            let ingestor = self.ingestor.clone();
            self.workers.spawn(async move {
                match ingestor.fetch_block_by_number(finalized).await {
                    Ok(()) => {
                        ingestor.queue().confirmed_done(finalized).await;
                    }
                    Err(err) => {
                        tracing::warn!(number = finalized, error = %err, "failed to finalise block");
                        ingestor.telemetry().record_block_failed();
                        ingestor.queue().confirmed_failed(finalized).await;
                    }
                }
            });
        }

        let ingestor = self.ingestor.clone();
        self.workers.spawn(async move {
            if !ingestor.queue().put(number).await {
                return;
            }
            match ingestor.fetch_block_by_hash(hash).await {
                Ok(()) => {
                    ingestor.queue().unconfirmed_done(number).await;
                }
                Err(err) => {
                    tracing::warn!(number, error = %err, "failed to ingest new head");
                    ingestor.telemetry().record_block_failed();
                    ingestor.queue().unconfirmed_failed(number).await;
                }
            }
        });

        Ok(())
    }
}
