//! Unconfirmed lane: tip-local blocks under time-based retry scheduling.

use super::entry::BlockEntry;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

const REQUEST_BUFFER: usize = 128;
const SWEEP_IDLE: Duration = Duration::from_millis(100);

pub(crate) enum UnconfirmedRequest {
    Put {
        number: u64,
        reply: oneshot::Sender<bool>,
    },
    Failed {
        number: u64,
        reply: oneshot::Sender<bool>,
    },
    Done {
        number: u64,
        reply: oneshot::Sender<bool>,
    },
    Next {
        reply: oneshot::Sender<Option<u64>>,
    },
    Latest {
        number: u64,
    },
    Stat {
        reply: oneshot::Sender<u64>,
    },
}

/// Single-owner actor for the unconfirmed lane.
///
/// All entry-map mutation happens on one task; callers interact through
/// request messages carrying a private reply channel. Entries that are done
/// and deep enough below the latest head are handed to the confirmed lane
/// during the idle sweep.
pub(crate) struct UnconfirmedLane {
    entries: HashMap<u64, BlockEntry>,
    latest: u64,
    confirmations: u64,
    promotions: mpsc::Sender<u64>,
}

impl UnconfirmedLane {
    pub(crate) fn spawn(
        confirmations: u64,
        promotions: mpsc::Sender<u64>,
        shutdown: CancellationToken,
    ) -> mpsc::Sender<UnconfirmedRequest> {
        let (tx, mut requests) = mpsc::channel(REQUEST_BUFFER);
        let mut lane = Self {
            entries: HashMap::new(),
            latest: 0,
            confirmations,
            promotions,
        };

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    request = requests.recv() => {
                        match request {
                            Some(request) => lane.handle(request),
                            None => break,
                        }
                    }
                    _ = sleep(SWEEP_IDLE) => {
                        if lane.sweep().await.is_err() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("unconfirmed lane actor stopped");
        });

        tx
    }

    fn handle(&mut self, request: UnconfirmedRequest) {
        match request {
            UnconfirmedRequest::Put { number, reply } => {
                // A tracked block keeps its attempt history; reject the caller.
                if self.entries.contains_key(&number) {
                    let _ = reply.send(false);
                    return;
                }
                self.entries.insert(number, BlockEntry::new());
                let _ = reply.send(true);
            }
            UnconfirmedRequest::Failed { number, reply } => {
                let Some(entry) = self.entries.get_mut(&number) else {
                    let _ = reply.send(false);
                    return;
                };
                entry.advance_delay();
                let _ = reply.send(true);
            }
            UnconfirmedRequest::Done { number, reply } => {
                let Some(entry) = self.entries.get_mut(&number) else {
                    let _ = reply.send(false);
                    return;
                };
                entry.done = true;
                entry.reset_delay();
                let _ = reply.send(true);
            }
            UnconfirmedRequest::Next { reply } => {
                let selected = self
                    .entries
                    .iter()
                    .find(|(_, entry)| !entry.done && entry.can_attempt())
                    .map(|(number, _)| *number);
                if let Some(number) = selected {
                    // The attempt token: the caller owns this attempt window.
                    if let Some(entry) = self.entries.get_mut(&number) {
                        entry.mark_attempted();
                    }
                }
                let _ = reply.send(selected);
            }
            UnconfirmedRequest::Latest { number } => {
                self.latest = number;
            }
            UnconfirmedRequest::Stat { reply } => {
                let waiting = self.entries.values().filter(|entry| !entry.done).count() as u64;
                let _ = reply.send(waiting);
            }
        }
    }

    /// Moves every done entry that has reached confirmation depth into the
    /// confirmed lane. Runs only when the actor has been idle for a beat so
    /// request handling stays responsive.
    async fn sweep(&mut self) -> Result<(), ()> {
        let promotable: Vec<u64> = self
            .entries
            .iter()
            .filter(|(number, entry)| {
                entry.done
                    && **number <= self.latest
                    && self.latest - **number >= self.confirmations
            })
            .map(|(number, _)| *number)
            .collect();

        for number in promotable {
            self.entries.remove(&number);
            if self.promotions.send(number).await.is_err() {
                tracing::warn!(number, "confirmed lane closed; dropping promotion");
                return Err(());
            }
        }
        Ok(())
    }
}
