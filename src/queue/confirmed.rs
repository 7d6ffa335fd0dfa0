//! Confirmed lane: blocks past confirmation depth awaiting their final
//! canonical re-fetch.

use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

const REQUEST_BUFFER: usize = 128;
const SWEEP_IDLE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfirmedState {
    Pending,
    InFlight,
    Done,
}

pub(crate) enum ConfirmedRequest {
    Next {
        reply: oneshot::Sender<Option<u64>>,
    },
    Failed {
        number: u64,
        reply: oneshot::Sender<bool>,
    },
    Done {
        number: u64,
        reply: oneshot::Sender<bool>,
    },
    Stat {
        reply: oneshot::Sender<ConfirmedStat>,
    },
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ConfirmedStat {
    pub(crate) waiting: u64,
    pub(crate) total: u64,
}

/// Single-owner actor for the confirmed lane.
///
/// Membership is the eligibility predicate: only promotions from the
/// unconfirmed lane enter, and promotion already requires
/// `latest - number >= confirmations`. `Next` therefore just hands out the
/// oldest pending number. Done entries are garbage-collected by the idle
/// sweep, which feeds the cumulative processed counter.
pub(crate) struct ConfirmedLane {
    entries: BTreeMap<u64, ConfirmedState>,
    total: u64,
}

impl ConfirmedLane {
    pub(crate) fn spawn(
        mut promotions: mpsc::Receiver<u64>,
        shutdown: CancellationToken,
    ) -> mpsc::Sender<ConfirmedRequest> {
        let (tx, mut requests) = mpsc::channel(REQUEST_BUFFER);
        let mut lane = Self {
            entries: BTreeMap::new(),
            total: 0,
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
                    promoted = promotions.recv() => {
                        match promoted {
                            Some(number) => {
                                lane.entries.entry(number).or_insert(ConfirmedState::Pending);
                            }
                            None => break,
                        }
                    }
                    _ = sleep(SWEEP_IDLE) => lane.sweep(),
                }
            }
            tracing::debug!("confirmed lane actor stopped");
        });

        tx
    }

    fn handle(&mut self, request: ConfirmedRequest) {
        match request {
            ConfirmedRequest::Next { reply } => {
                let selected = self
                    .entries
                    .iter()
                    .find(|(_, state)| **state == ConfirmedState::Pending)
                    .map(|(number, _)| *number);
                if let Some(number) = selected {
                    self.entries.insert(number, ConfirmedState::InFlight);
                }
                let _ = reply.send(selected);
            }
            ConfirmedRequest::Failed { number, reply } => match self.entries.get_mut(&number) {
                Some(state) => {
                    *state = ConfirmedState::Pending;
                    let _ = reply.send(true);
                }
                None => {
                    let _ = reply.send(false);
                }
            },
            ConfirmedRequest::Done { number, reply } => match self.entries.get_mut(&number) {
                Some(state) => {
                    *state = ConfirmedState::Done;
                    let _ = reply.send(true);
                }
                None => {
                    let _ = reply.send(false);
                }
            },
            ConfirmedRequest::Stat { reply } => {
                let waiting = self
                    .entries
                    .values()
                    .filter(|state| **state != ConfirmedState::Done)
                    .count() as u64;
                let _ = reply.send(ConfirmedStat {
                    waiting,
                    total: self.total,
                });
            }
        }
    }

    fn sweep(&mut self) {
        let before = self.entries.len();
        self.entries.retain(|_, state| *state != ConfirmedState::Done);
        self.total += (before - self.entries.len()) as u64;
    }
}
