/// Row image of the `blocks` table. Hash is the primary key; the block
/// number carries a unique index.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockRow {
    pub hash: String,
    pub number: u64,
    pub time: u64,
    pub parent_hash: String,
    pub difficulty: String,
    pub gas_used: u64,
    pub gas_limit: u64,
    pub nonce: String,
    pub miner: String,
    pub size: f64,
    pub state_root: String,
    pub uncle_hash: String,
    pub tx_root: String,
    pub receipt_root: String,
    pub extra_data: Vec<u8>,
}

impl BlockRow {
    /// Field-wise equality, extra data included. A re-ingested block that is
    /// similar to the stored one is an idempotent no-op; a dissimilar one at
    /// the same height is a reorg and supersedes the stored row.
    pub fn similar_to(&self, other: &BlockRow) -> bool {
        self.hash == other.hash
            && self.number == other.number
            && self.time == other.time
            && self.parent_hash == other.parent_hash
            && self.difficulty == other.difficulty
            && self.gas_used == other.gas_used
            && self.gas_limit == other.gas_limit
            && self.nonce == other.nonce
            && self.miner == other.miner
            && self.size == other.size
            && self.state_root == other.state_root
            && self.uncle_hash == other.uncle_hash
            && self.tx_root == other.tx_root
            && self.receipt_root == other.receipt_root
            && self.extra_data == other.extra_data
    }
}

/// Row image of the `transactions` table. `to` and `contract` are mutually
/// exclusive: a contract creation has no recipient and records the address
/// the receipt reports instead.
#[derive(Debug, Clone, PartialEq)]
pub struct TxRow {
    pub hash: String,
    pub from: String,
    pub to: Option<String>,
    pub contract: Option<String>,
    pub value: String,
    pub data: Vec<u8>,
    pub gas: u64,
    pub gas_price: String,
    pub cost: String,
    pub nonce: u64,
    pub state: u64,
    pub block_hash: String,
}

/// Row image of the `events` table, keyed by (block hash, log index).
#[derive(Debug, Clone, PartialEq)]
pub struct EventRow {
    pub block_hash: String,
    pub index: u64,
    pub origin: String,
    pub topics: Vec<String>,
    pub data: Vec<u8>,
    pub tx_hash: String,
}

/// One transaction plus the events its receipt carried.
#[derive(Debug, Clone)]
pub struct PackedTransaction {
    pub tx: TxRow,
    pub events: Vec<EventRow>,
}

/// The in-flight bundle handed to the persister: everything belonging to one
/// block, committed in a single database transaction.
#[derive(Debug, Clone)]
pub struct PackedBlock {
    pub block: BlockRow,
    pub transactions: Vec<PackedTransaction>,
}
