use crate::queue::BlockProcessorQueue;
use crate::runtime::status::StatusHolder;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Default interval used by the metrics reporter task.
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(5);

/// Installs the tracing subscriber. `RUST_LOG` directives apply on top of
/// an `info` default; production deployments emit JSON lines. Safe to call
/// more than once: a second install attempt is simply ignored.
pub fn init_tracing(production: bool) {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = if production {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Lightweight rolling counters used to derive runtime metrics.
#[derive(Default, Debug)]
pub struct Telemetry {
    blocks_persisted: AtomicU64,
    blocks_failed: AtomicU64,
    receipt_errors: AtomicU64,
    reorg_heads: AtomicU64,
}

impl Telemetry {
    pub fn record_block_persisted(&self) {
        self.blocks_persisted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_block_failed(&self) {
        self.blocks_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_receipt_error(&self) {
        self.receipt_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reorg_head(&self) {
        self.reorg_heads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn blocks_persisted(&self) -> u64 {
        self.blocks_persisted.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            blocks_persisted: self.blocks_persisted.load(Ordering::Relaxed),
            blocks_failed: self.blocks_failed.load(Ordering::Relaxed),
            receipt_errors: self.receipt_errors.load(Ordering::Relaxed),
            reorg_heads: self.reorg_heads.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Copy, Clone)]
pub struct TelemetrySnapshot {
    pub blocks_persisted: u64,
    pub blocks_failed: u64,
    pub receipt_errors: u64,
    pub reorg_heads: u64,
}

/// Spawns a background task that logs one progress line per interval: how
/// many blocks landed since the previous line, both lanes' backlog, and the
/// cumulative error counters. Intervals where the pipeline neither
/// persisted anything nor has queued work are demoted to a debug heartbeat
/// so a fully caught-up indexer does not fill the log.
pub fn spawn_metrics_reporter(
    telemetry: Arc<Telemetry>,
    queue: Arc<BlockProcessorQueue>,
    status: Arc<StatusHolder>,
    shutdown: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut reported_persisted = telemetry.blocks_persisted();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = sleep(interval) => {}
            }

            let snapshot = telemetry.snapshot();
            let stat = queue.stat().await;
            let persisted_since_last = snapshot
                .blocks_persisted
                .saturating_sub(reported_persisted);
            reported_persisted = snapshot.blocks_persisted;

            if persisted_since_last == 0 && stat.waiting() == 0 {
                tracing::debug!(
                    target: "etherscribe::metrics",
                    latest = status.latest_block_number(),
                    "pipeline idle"
                );
                continue;
            }

            tracing::info!(
                target: "etherscribe::metrics",
                persisted_since_last,
                persisted = snapshot.blocks_persisted,
                failed = snapshot.blocks_failed,
                receipt_errors = snapshot.receipt_errors,
                reorg_heads = snapshot.reorg_heads,
                unconfirmed_waiting = stat.unconfirmed_waiting,
                confirmed_waiting = stat.confirmed_waiting,
                swept = stat.total,
                latest = status.latest_block_number(),
                blocks_in_db = status.block_count_in_db(),
                "ingestion progress"
            );
        }

        tracing::debug!(target: "etherscribe::metrics", "metrics reporter stopped");
    })
}
