//! JSON-RPC client for the upstream execution node. Wraps an `alloy`
//! provider with a per-request timeout and surfaces every call through the
//! [`ChainSource`] trait consumed by the pipeline.

use super::source::ChainSource;
use alloy::eips::BlockNumberOrTag;
use alloy::primitives::B256;
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{Block, TransactionReceipt};
use anyhow::{anyhow, Context, Result};
use futures::future::BoxFuture;
use std::future::IntoFuture;
use std::time::Duration;
use tokio::time::timeout;

#[derive(Debug)]
pub enum NodeError {
    Timeout { method: &'static str },
}

impl std::fmt::Display for NodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeError::Timeout { method } => write!(f, "rpc method {method} timed out"),
        }
    }
}

impl std::error::Error for NodeError {}

/// Process-singleton HTTP client, safe for concurrent calls.
#[derive(Debug, Clone)]
pub struct NodeClient {
    provider: DynProvider,
    request_timeout: Duration,
}

impl NodeClient {
    /// Connects to the node at `url` (http or https).
    pub async fn connect(url: &str, request_timeout: Duration) -> Result<Self> {
        let provider = ProviderBuilder::new()
            .connect(url)
            .await
            .with_context(|| format!("failed to connect to node at {url}"))?
            .erased();
        Ok(Self {
            provider,
            request_timeout,
        })
    }

    async fn request<T, E, Call>(&self, method: &'static str, call: Call) -> Result<T>
    where
        E: std::fmt::Display,
        Call: IntoFuture<Output = Result<T, E>>,
    {
        timeout(self.request_timeout, call.into_future())
            .await
            .map_err(|_| anyhow!(NodeError::Timeout { method }))?
            .map_err(|err| anyhow!("rpc {method} call failed: {err}"))
    }
}

impl ChainSource for NodeClient {
    fn block_by_hash<'a>(&'a self, hash: B256) -> BoxFuture<'a, Result<Option<Block>>> {
        Box::pin(async move {
            self.request(
                "eth_getBlockByHash",
                self.provider.get_block_by_hash(hash).full(),
            )
            .await
        })
    }

    fn block_by_number<'a>(&'a self, number: u64) -> BoxFuture<'a, Result<Option<Block>>> {
        Box::pin(async move {
            self.request(
                "eth_getBlockByNumber",
                self.provider
                    .get_block_by_number(BlockNumberOrTag::Number(number))
                    .full(),
            )
            .await
        })
    }

    fn transaction_receipt<'a>(
        &'a self,
        hash: B256,
    ) -> BoxFuture<'a, Result<Option<TransactionReceipt>>> {
        Box::pin(async move {
            self.request(
                "eth_getTransactionReceipt",
                self.provider.get_transaction_receipt(hash),
            )
            .await
        })
    }

    fn chain_id<'a>(&'a self) -> BoxFuture<'a, Result<u64>> {
        Box::pin(async move { self.request("eth_chainId", self.provider.get_chain_id()).await })
    }
}

/// Opens the websocket provider used for the new-heads subscription.
pub async fn connect_websocket(url: &str) -> Result<DynProvider> {
    let provider = ProviderBuilder::new()
        .connect(url)
        .await
        .with_context(|| format!("failed to connect websocket at {url}"))?
        .erased();
    Ok(provider)
}
