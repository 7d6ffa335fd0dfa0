use super::models::PackedBlock;
use anyhow::Result;
use futures::future::BoxFuture;

/// Destination for fully assembled blocks. The production implementation is
/// [`crate::store::persist::Persister`]; tests substitute an in-memory sink.
pub trait BlockSink: Send + Sync {
    /// Commits the packed block atomically: the block row, every transaction
    /// and every event become visible together or not at all.
    fn store_block<'a>(&'a self, packed: PackedBlock) -> BoxFuture<'a, Result<()>>;
}

/// Read-only view of persisted block numbers, consumed by the syncer when
/// computing gaps. Split from [`BlockSink`] so the missing-block finder can
/// be driven by a plain mock in tests.
pub trait SyncStore: Send + Sync {
    /// Ascending block numbers already present within `[from, to]`.
    fn block_numbers_in_range<'a>(&'a self, from: u64, to: u64)
        -> BoxFuture<'a, Result<Vec<u64>>>;

    /// Highest block number currently persisted, if any.
    fn current_block_number<'a>(&'a self) -> BoxFuture<'a, Result<Option<u64>>>;

    fn has_block<'a>(&'a self, number: u64) -> BoxFuture<'a, Result<bool>>;
}
