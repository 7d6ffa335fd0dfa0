use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Progress of the indexer relative to the chain, captured at startup and
/// advanced by the listener and the persister.
#[derive(Debug, Default)]
pub struct SyncState {
    /// Blocks fully processed since the service started.
    pub done: u64,
    pub started_at: Option<Instant>,
    pub block_count_at_startup: u64,
    pub max_block_number_at_startup: u64,
    pub new_blocks_inserted: u64,
    pub latest_block_number: u64,
}

impl SyncState {
    pub fn block_count_in_db(&self) -> u64 {
        self.block_count_at_startup + self.new_blocks_inserted
    }
}

/// Shared owner of [`SyncState`] behind a reader/writer lock. Read by the
/// status endpoints of the query layer; mutated by the pipeline.
#[derive(Debug)]
pub struct StatusHolder {
    state: RwLock<SyncState>,
}

impl StatusHolder {
    pub fn new(block_count_at_startup: u64, max_block_number_at_startup: u64) -> Self {
        Self {
            state: RwLock::new(SyncState {
                block_count_at_startup,
                max_block_number_at_startup,
                ..SyncState::default()
            }),
        }
    }

    pub fn max_block_number_at_startup(&self) -> u64 {
        self.state.read().unwrap().max_block_number_at_startup
    }

    pub fn set_started_at(&self) {
        self.state.write().unwrap().started_at = Some(Instant::now());
    }

    pub fn increment_blocks_inserted(&self) {
        self.state.write().unwrap().new_blocks_inserted += 1;
    }

    pub fn increment_blocks_processed(&self) {
        self.state.write().unwrap().done += 1;
    }

    pub fn block_count_in_db(&self) -> u64 {
        self.state.read().unwrap().block_count_in_db()
    }

    /// Uptime since the first header was observed; zero before that.
    pub fn elapsed_time(&self) -> Duration {
        self.state
            .read()
            .unwrap()
            .started_at
            .map(|started| started.elapsed())
            .unwrap_or_default()
    }

    pub fn done(&self) -> u64 {
        self.state.read().unwrap().done
    }

    pub fn latest_block_number(&self) -> u64 {
        self.state.read().unwrap().latest_block_number
    }

    pub fn set_latest_block_number(&self, number: u64) {
        self.state.write().unwrap().latest_block_number = number;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_count_tracks_startup_plus_inserted() {
        let status = StatusHolder::new(50, 49);
        assert_eq!(status.block_count_in_db(), 50);

        status.increment_blocks_inserted();
        status.increment_blocks_inserted();
        assert_eq!(status.block_count_in_db(), 52);
    }

    #[test]
    fn elapsed_time_is_zero_before_first_header() {
        let status = StatusHolder::new(0, 0);
        assert_eq!(status.elapsed_time(), Duration::ZERO);

        status.set_started_at();
        // Not asserting an exact duration; just that the clock started.
        assert!(status.elapsed_time() < Duration::from_secs(1));
    }

    #[test]
    fn latest_block_number_round_trips() {
        let status = StatusHolder::new(0, 0);
        status.set_latest_block_number(1234);
        assert_eq!(status.latest_block_number(), 1234);
    }
}
