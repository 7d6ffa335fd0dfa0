//! Retry manager: periodically drains the unconfirmed lane and resubmits
//! eligible blocks. All per-block timing lives in the queue; this loop only
//! polls.

use super::fetcher::Ingestor;
use super::workers::WorkerPool;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

const RETRY_INTERVAL: Duration = Duration::from_millis(512);

pub async fn run(ingestor: Ingestor, shutdown: CancellationToken) {
    let workers = WorkerPool::new(ingestor.worker_count());

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = sleep(RETRY_INTERVAL) => {}
        }

        let Some(number) = ingestor.queue().unconfirmed_next().await else {
            continue;
        };

        let stat = ingestor.queue().stat().await;
        tracing::info!(
            number,
            unconfirmed_waiting = stat.unconfirmed_waiting,
            confirmed_waiting = stat.confirmed_waiting,
            total = stat.total,
            "retrying block"
        );

        let ingestor = ingestor.clone();
        workers.spawn(async move {
            match ingestor.fetch_block_by_number(number).await {
                Ok(()) => {
                    ingestor.queue().unconfirmed_done(number).await;
                }
                Err(err) => {
                    tracing::warn!(number, error = %err, "retry failed");
                    ingestor.telemetry().record_block_failed();
                    ingestor.queue().unconfirmed_failed(number).await;
                }
            }
        });
    }
    tracing::debug!("retry manager stopped");
}
