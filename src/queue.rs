//! Block processor queue: the scheduling core of the ingestion pipeline.
//!
//! Every block under processing is tracked by exactly one entry across two
//! lanes, each owned by its own actor task:
//! - the *unconfirmed* lane holds blocks first observed at the tip (or
//!   enqueued by the syncer), schedules retries with Fibonacci backoff, and
//!   promotes finished entries once they sink `confirmations` blocks below
//!   the latest head;
//! - the *confirmed* lane re-fetches promoted blocks by number against the
//!   canonical chain, providing reorg tolerance up to confirmation depth.
//!
//! Callers never touch the entry maps directly; each operation is a request
//! posted to the owning actor with a private reply channel, which serializes
//! the state machine without locks.

pub mod confirmed;
pub mod entry;
pub mod unconfirmed;

use confirmed::{ConfirmedLane, ConfirmedRequest, ConfirmedStat};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use unconfirmed::{UnconfirmedLane, UnconfirmedRequest};

const PROMOTION_BUFFER: usize = 128;

/// Snapshot of queue occupancy, exposed to operators via the metrics
/// reporter and the retry log line.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueStat {
    pub unconfirmed_waiting: u64,
    pub confirmed_waiting: u64,
    /// Cumulative count of blocks swept after completing both lanes.
    pub total: u64,
}

impl QueueStat {
    pub fn waiting(&self) -> u64 {
        self.unconfirmed_waiting + self.confirmed_waiting
    }
}

/// Handle to the two lane actors. Cheap to share; all methods are safe to
/// call from any task.
pub struct BlockProcessorQueue {
    unconfirmed: mpsc::Sender<UnconfirmedRequest>,
    confirmed: mpsc::Sender<ConfirmedRequest>,
}

impl BlockProcessorQueue {
    /// Spawns both lane actors wired by the promotion channel. The actors
    /// exit when `shutdown` fires.
    pub fn start(confirmations: u64, shutdown: CancellationToken) -> Arc<Self> {
        let (promotion_tx, promotion_rx) = mpsc::channel(PROMOTION_BUFFER);
        let unconfirmed = UnconfirmedLane::spawn(confirmations, promotion_tx, shutdown.clone());
        let confirmed = ConfirmedLane::spawn(promotion_rx, shutdown);
        Arc::new(Self {
            unconfirmed,
            confirmed,
        })
    }

    /// Starts tracking `number`. Returns `false` when the block is already
    /// tracked, in which case the caller must not process it.
    pub async fn put(&self, number: u64) -> bool {
        let (reply, rx) = oneshot::channel();
        if self
            .unconfirmed
            .send(UnconfirmedRequest::Put { number, reply })
            .await
            .is_err()
        {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Advances the confirmation threshold to the newly observed head.
    pub async fn latest(&self, number: u64) {
        let _ = self
            .unconfirmed
            .send(UnconfirmedRequest::Latest { number })
            .await;
    }

    /// Hands out some retry-eligible unconfirmed block, stamping its attempt
    /// time. `None` when nothing is currently eligible.
    pub async fn unconfirmed_next(&self) -> Option<u64> {
        let (reply, rx) = oneshot::channel();
        self.unconfirmed
            .send(UnconfirmedRequest::Next { reply })
            .await
            .ok()?;
        rx.await.ok().flatten()
    }

    pub async fn unconfirmed_done(&self, number: u64) -> bool {
        let (reply, rx) = oneshot::channel();
        if self
            .unconfirmed
            .send(UnconfirmedRequest::Done { number, reply })
            .await
            .is_err()
        {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    pub async fn unconfirmed_failed(&self, number: u64) -> bool {
        let (reply, rx) = oneshot::channel();
        if self
            .unconfirmed
            .send(UnconfirmedRequest::Failed { number, reply })
            .await
            .is_err()
        {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Yields the oldest promoted block awaiting its canonical re-fetch.
    pub async fn confirmed_next(&self) -> Option<u64> {
        let (reply, rx) = oneshot::channel();
        self.confirmed
            .send(ConfirmedRequest::Next { reply })
            .await
            .ok()?;
        rx.await.ok().flatten()
    }

    pub async fn confirmed_done(&self, number: u64) -> bool {
        let (reply, rx) = oneshot::channel();
        if self
            .confirmed
            .send(ConfirmedRequest::Done { number, reply })
            .await
            .is_err()
        {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    pub async fn confirmed_failed(&self, number: u64) -> bool {
        let (reply, rx) = oneshot::channel();
        if self
            .confirmed
            .send(ConfirmedRequest::Failed { number, reply })
            .await
            .is_err()
        {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    pub async fn stat(&self) -> QueueStat {
        let unconfirmed_waiting = {
            let (reply, rx) = oneshot::channel();
            match self.unconfirmed.send(UnconfirmedRequest::Stat { reply }).await {
                Ok(()) => rx.await.unwrap_or(0),
                Err(_) => 0,
            }
        };
        let confirmed = {
            let (reply, rx) = oneshot::channel();
            match self.confirmed.send(ConfirmedRequest::Stat { reply }).await {
                Ok(()) => rx.await.unwrap_or_default(),
                Err(_) => ConfirmedStat::default(),
            }
        };
        QueueStat {
            unconfirmed_waiting,
            confirmed_waiting: confirmed.waiting,
            total: confirmed.total,
        }
    }
}
