//! Shared fixtures: an in-memory chain, block sink and store view driving
//! the pipeline without a node or a database.

#![allow(dead_code)]

use alloy::primitives::B256;
use alloy::rpc::types::{Block, TransactionReceipt};
use anyhow::{anyhow, Result};
use etherscribe::{BlockSink, PackedBlock, SyncStore};
use futures::future::BoxFuture;
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Mutex;

pub fn hash_hex(seed: u8) -> String {
    format!("0x{}", format!("{seed:02x}").repeat(32))
}

pub fn address_hex(seed: u8) -> String {
    format!("0x{}", format!("{seed:02x}").repeat(20))
}

pub fn b256(seed: u8) -> B256 {
    hash_hex(seed).parse().expect("valid fixture hash")
}

fn bloom_hex() -> String {
    format!("0x{}", "00".repeat(256))
}

/// A block fixture whose header fields are derived from `number` and `seed`;
/// `txs` are transaction JSON objects from [`tx_json`].
pub fn block_json(number: u64, seed: u8, txs: Vec<Value>) -> Value {
    json!({
        "hash": hash_hex(seed),
        "parentHash": hash_hex(seed.wrapping_add(1)),
        "sha3Uncles": hash_hex(0xc1),
        "miner": address_hex(0xc2),
        "stateRoot": hash_hex(0xc3),
        "transactionsRoot": hash_hex(0xc4),
        "receiptsRoot": hash_hex(0xc5),
        "logsBloom": bloom_hex(),
        "difficulty": "0x2",
        "number": format!("{number:#x}"),
        "gasLimit": "0x1c9c380",
        "gasUsed": "0x5208",
        "timestamp": "0x65487621",
        "extraData": "0x",
        "mixHash": hash_hex(0xc6),
        "nonce": "0x0000000000000000",
        "baseFeePerGas": "0x7",
        "size": "0x220",
        "uncles": [],
        "transactions": txs,
    })
}

pub fn make_block(number: u64, seed: u8, txs: Vec<Value>) -> Block {
    serde_json::from_value(block_json(number, seed, txs)).expect("valid block fixture")
}

/// A legacy transaction with an EIP-155 signature that recovers to some
/// deterministic address (r is the curve generator's x-coordinate).
pub fn tx_json(tx_seed: u8, block_seed: u8, index: u64, to: Option<String>) -> Value {
    json!({
        "hash": hash_hex(tx_seed),
        "nonce": "0x5",
        "blockHash": hash_hex(block_seed),
        "blockNumber": "0x64",
        "transactionIndex": format!("{index:#x}"),
        "from": address_hex(0x21),
        "to": to,
        "value": "0xde0b6b3a7640000",
        "gasPrice": "0x3b9aca00",
        "gas": "0x5208",
        "input": "0x",
        "v": "0x25",
        "r": "0x79be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798",
        "s": "0x1",
        "type": "0x0",
        "chainId": "0x1",
    })
}

pub fn make_receipt(tx_seed: u8, block_seed: u8, logs: Value) -> TransactionReceipt {
    serde_json::from_value(json!({
        "transactionHash": hash_hex(tx_seed),
        "transactionIndex": "0x0",
        "blockHash": hash_hex(block_seed),
        "blockNumber": "0x64",
        "from": address_hex(0x21),
        "to": null,
        "cumulativeGasUsed": "0x5208",
        "gasUsed": "0x5208",
        "contractAddress": null,
        "logs": logs,
        "status": "0x1",
        "logsBloom": bloom_hex(),
        "type": "0x0",
        "effectiveGasPrice": "0x3b9aca00",
    }))
    .expect("valid receipt fixture")
}

/// In-memory chain implementing [`etherscribe::ChainSource`].
#[derive(Default)]
pub struct MockChain {
    by_number: HashMap<u64, Block>,
    by_hash: HashMap<B256, Block>,
    receipts: HashMap<B256, TransactionReceipt>,
    failing_receipts: HashSet<B256>,
    chain_id: u64,
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            chain_id: 1,
            ..Self::default()
        }
    }

    pub fn add_block(&mut self, block: Block) {
        self.by_hash.insert(block.header.hash, block.clone());
        self.by_number.insert(block.header.number, block);
    }

    pub fn add_receipt(&mut self, tx_hash: B256, receipt: TransactionReceipt) {
        self.receipts.insert(tx_hash, receipt);
    }

    /// Makes every receipt lookup for `tx_hash` fail with an error.
    pub fn fail_receipt(&mut self, tx_hash: B256) {
        self.failing_receipts.insert(tx_hash);
    }
}

impl etherscribe::ChainSource for MockChain {
    fn block_by_hash<'a>(&'a self, hash: B256) -> BoxFuture<'a, Result<Option<Block>>> {
        Box::pin(async move { Ok(self.by_hash.get(&hash).cloned()) })
    }

    fn block_by_number<'a>(&'a self, number: u64) -> BoxFuture<'a, Result<Option<Block>>> {
        Box::pin(async move { Ok(self.by_number.get(&number).cloned()) })
    }

    fn transaction_receipt<'a>(
        &'a self,
        hash: B256,
    ) -> BoxFuture<'a, Result<Option<TransactionReceipt>>> {
        Box::pin(async move {
            if self.failing_receipts.contains(&hash) {
                return Err(anyhow!("receipt lookup failed"));
            }
            Ok(self.receipts.get(&hash).cloned())
        })
    }

    fn chain_id<'a>(&'a self) -> BoxFuture<'a, Result<u64>> {
        Box::pin(async move { Ok(self.chain_id) })
    }
}

/// Collects stored blocks in memory.
#[derive(Default)]
pub struct MemorySink {
    stored: Mutex<Vec<PackedBlock>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stored(&self) -> Vec<PackedBlock> {
        self.stored.lock().unwrap().clone()
    }
}

impl BlockSink for MemorySink {
    fn store_block<'a>(&'a self, packed: PackedBlock) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.stored.lock().unwrap().push(packed);
            Ok(())
        })
    }
}

/// Store view over a plain set of present block numbers.
#[derive(Default)]
pub struct MemoryStore {
    present: Mutex<BTreeSet<u64>>,
}

impl MemoryStore {
    pub fn with_blocks(numbers: impl IntoIterator<Item = u64>) -> Self {
        Self {
            present: Mutex::new(numbers.into_iter().collect()),
        }
    }
}

impl SyncStore for MemoryStore {
    fn block_numbers_in_range<'a>(
        &'a self,
        from: u64,
        to: u64,
    ) -> BoxFuture<'a, Result<Vec<u64>>> {
        Box::pin(async move {
            Ok(self
                .present
                .lock()
                .unwrap()
                .range(from..=to)
                .copied()
                .collect())
        })
    }

    fn current_block_number<'a>(&'a self) -> BoxFuture<'a, Result<Option<u64>>> {
        Box::pin(async move { Ok(self.present.lock().unwrap().iter().next_back().copied()) })
    }

    fn has_block<'a>(&'a self, number: u64) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move { Ok(self.present.lock().unwrap().contains(&number)) })
    }
}
