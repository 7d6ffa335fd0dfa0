//! Process bootstrap and lifecycle: acquires every shared resource, wires
//! the pipeline together and coordinates graceful shutdown on OS signals.

use crate::node::client::{connect_websocket, NodeClient};
use crate::node::listener::{Listener, ListenerParams};
use crate::node::source::ChainSource;
use crate::pipeline::fetcher::{Ingestor, IngestorParams};
use crate::queue::BlockProcessorQueue;
use crate::runtime::config::IndexerConfig;
use crate::runtime::status::StatusHolder;
use crate::runtime::telemetry::{spawn_metrics_reporter, Telemetry};
use crate::store::persist::Persister;
use crate::store::queries::{self, StoreReader};
use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Owns the root cancellation token and runs the indexer until a signal or
/// a fatal pipeline error.
pub struct Runner {
    config: IndexerConfig,
    shutdown: CancellationToken,
}

impl Runner {
    pub fn new(config: IndexerConfig) -> Self {
        Self {
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Returns a clone of the root shutdown token so external callers can
    /// integrate with their own cancellation strategies.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Brings the pipeline up and parks until SIGINT/SIGTERM or a fatal
    /// listener error. On return every task has observed cancellation and
    /// the database pool is closed.
    pub async fn run(self) -> Result<()> {
        let config = self.config;
        let shutdown = self.shutdown;

        let pool = queries::connect(&config.database_url()).await?;
        queries::ensure_schema(&pool).await?;

        let block_count = queries::block_count(&pool).await?;
        let max_block_number = queries::max_block_number(&pool).await?.unwrap_or_default();
        let status = Arc::new(StatusHolder::new(block_count, max_block_number));
        tracing::info!(
            blocks_in_db = block_count,
            max_block_number,
            "captured store state at startup"
        );

        let node = NodeClient::connect(config.rpc_url(), config.rpc_timeout()).await?;
        let chain_id = node.chain_id().await.context("failed to read chain id")?;
        tracing::info!(chain_id, rpc = config.rpc_url(), "connected to node");

        let websocket = connect_websocket(config.ws_url()).await?;

        let queue = BlockProcessorQueue::start(config.block_confirmations(), shutdown.clone());
        let telemetry = Arc::new(Telemetry::default());
        let persister = Arc::new(Persister::new(pool.clone(), status.clone()));
        let reader = Arc::new(StoreReader::new(pool.clone()));

        let ingestor = Ingestor::new(IngestorParams {
            source: Arc::new(node),
            sink: persister,
            queue: queue.clone(),
            status: status.clone(),
            telemetry: telemetry.clone(),
            worker_count: config.worker_count(),
        });

        let reporter = spawn_metrics_reporter(
            telemetry,
            queue,
            status,
            shutdown.clone(),
            config.metrics_interval(),
        );

        let listener = Listener::new(ListenerParams {
            websocket,
            ingestor,
            store: reader,
            confirmations: config.block_confirmations(),
            scan_interval: config.missing_block_scan_interval(),
            shutdown: shutdown.clone(),
        });
        let mut listener_handle = tokio::spawn(listener.run());

        let outcome = tokio::select! {
            signal = shutdown_signal() => match signal {
                Ok(()) => {
                    tracing::info!("shutdown signal received");
                    Ok(())
                }
                Err(err) => Err(err),
            },
            result = &mut listener_handle => match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(err)) => Err(err.context("listener aborted")),
                Err(err) => Err(anyhow!("listener task panicked: {err}")),
            },
        };

        shutdown.cancel();
        if !listener_handle.is_finished() {
            let _ = listener_handle.await;
        }
        let _ = reporter.await;
        pool.close().await;

        tracing::info!("gracefully shut down");
        outcome
    }
}

async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .context("failed to install SIGTERM handler")?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.context("failed to listen for SIGINT")?,
            _ = terminate.recv() => {}
        }
        Ok(())
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for SIGINT")
    }
}
