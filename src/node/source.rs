use alloy::primitives::B256;
use alloy::rpc::types::{Block, TransactionReceipt};
use anyhow::Result;
use futures::future::BoxFuture;

/// Read access to the upstream execution node, consumed by the fetcher and
/// the runner. Implemented by [`crate::node::client::NodeClient`] over
/// JSON-RPC; tests substitute an in-memory chain.
///
/// Block lookups must return full transaction bodies; a `None` means the
/// node does not (yet) know the block, which callers treat as a transient
/// failure.
pub trait ChainSource: Send + Sync {
    fn block_by_hash<'a>(&'a self, hash: B256) -> BoxFuture<'a, Result<Option<Block>>>;

    fn block_by_number<'a>(&'a self, number: u64) -> BoxFuture<'a, Result<Option<Block>>>;

    fn transaction_receipt<'a>(
        &'a self,
        hash: B256,
    ) -> BoxFuture<'a, Result<Option<TransactionReceipt>>>;

    fn chain_id<'a>(&'a self) -> BoxFuture<'a, Result<u64>>;
}
