//! Conversion of node RPC types into the row bundle handed to the persister.

use crate::store::models::{BlockRow, EventRow, PackedTransaction, TxRow};
use alloy::consensus::transaction::SignerRecoverable;
use alloy::consensus::Transaction as _;
use alloy::network::TransactionResponse as _;
use alloy::primitives::{Address, B256, U256};
use alloy::rpc::types::{Header, Transaction, TransactionReceipt};
use anyhow::{anyhow, Context, Result};

fn hex_bytes32(value: B256) -> String {
    format!("{value:#x}")
}

fn hex_address(value: Address) -> String {
    format!("{value:#x}")
}

/// Recovers the transaction sender from the consensus envelope signature.
/// Handles legacy, EIP-155, EIP-2930, EIP-1559 and EIP-4844 envelopes.
pub fn recover_sender(tx: &Transaction) -> Result<Address> {
    let envelope = tx.inner.clone().into_inner();
    envelope
        .recover_signer()
        .with_context(|| format!("failed to recover sender of transaction {}", tx.tx_hash()))
}

pub fn build_block_row(header: &Header) -> BlockRow {
    BlockRow {
        hash: hex_bytes32(header.hash),
        number: header.number,
        time: header.timestamp,
        parent_hash: hex_bytes32(header.parent_hash),
        difficulty: header.difficulty.to_string(),
        gas_used: header.gas_used,
        gas_limit: header.gas_limit,
        nonce: format!("{:#x}", header.nonce),
        miner: hex_address(header.beneficiary),
        size: header
            .size
            .map(|size| size.saturating_to::<u64>() as f64)
            .unwrap_or_default(),
        state_root: hex_bytes32(header.state_root),
        uncle_hash: hex_bytes32(header.ommers_hash),
        tx_root: hex_bytes32(header.transactions_root),
        receipt_root: hex_bytes32(header.receipts_root),
        extra_data: header.extra_data.to_vec(),
    }
}

/// Bundles one transaction with the events its receipt carried.
///
/// A missing recipient marks a contract creation; the deployed address comes
/// from the receipt. Gas price is the effective price under the block's base
/// fee, and cost follows the upstream convention `value + gas_limit * price`.
pub fn build_packed_tx(
    tx: &Transaction,
    sender: Address,
    receipt: &TransactionReceipt,
    base_fee: Option<u64>,
) -> Result<PackedTransaction> {
    let hash = tx.tx_hash();
    let block_hash = receipt
        .block_hash
        .ok_or_else(|| anyhow!("receipt of {hash} carries no block hash"))?;

    let gas_price = tx.effective_gas_price(base_fee);
    let cost = tx.value() + U256::from(tx.gas_limit()) * U256::from(gas_price);

    let (to, contract) = match tx.to() {
        Some(recipient) => (Some(hex_address(recipient)), None),
        None => (None, receipt.contract_address.map(hex_address)),
    };

    let row = TxRow {
        hash: hex_bytes32(hash),
        from: hex_address(sender),
        to,
        contract,
        value: tx.value().to_string(),
        data: tx.input().to_vec(),
        gas: tx.gas_limit(),
        gas_price: gas_price.to_string(),
        cost: cost.to_string(),
        nonce: tx.nonce(),
        state: receipt.status() as u64,
        block_hash: hex_bytes32(block_hash),
    };

    let mut events = Vec::with_capacity(receipt.inner.logs().len());
    for log in receipt.inner.logs() {
        let index = log
            .log_index
            .ok_or_else(|| anyhow!("receipt of {hash} carries a log without an index"))?;
        events.push(EventRow {
            block_hash: hex_bytes32(log.block_hash.unwrap_or(block_hash)),
            index,
            origin: hex_address(log.address()),
            topics: log.topics().iter().copied().map(hex_bytes32).collect(),
            data: log.data().data.to_vec(),
            tx_hash: hex_bytes32(log.transaction_hash.unwrap_or(hash)),
        });
    }

    Ok(PackedTransaction { tx: row, events })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hash_hex(seed: u8) -> String {
        format!("0x{}", hex_byte_repeat(seed, 32))
    }

    fn address_hex(seed: u8) -> String {
        format!("0x{}", hex_byte_repeat(seed, 20))
    }

    fn hex_byte_repeat(seed: u8, len: usize) -> String {
        format!("{seed:02x}").repeat(len)
    }

    fn bloom_hex() -> String {
        format!("0x{}", "00".repeat(256))
    }

    fn sample_header() -> Header {
        serde_json::from_value(json!({
            "hash": hash_hex(0xaa),
            "parentHash": hash_hex(0xab),
            "sha3Uncles": hash_hex(0xac),
            "miner": address_hex(0xad),
            "stateRoot": hash_hex(0xae),
            "transactionsRoot": hash_hex(0xaf),
            "receiptsRoot": hash_hex(0xb0),
            "logsBloom": bloom_hex(),
            "difficulty": "0x2",
            "number": "0x64",
            "gasLimit": "0x1c9c380",
            "gasUsed": "0x5208",
            "timestamp": "0x65487621",
            "extraData": "0x010203",
            "mixHash": hash_hex(0xb1),
            "nonce": "0x0000000000000042",
            "baseFeePerGas": "0x7",
            "size": "0x220",
        }))
        .expect("valid header fixture")
    }

    fn sample_transaction(to: Option<String>) -> Transaction {
        serde_json::from_value(json!({
            "hash": hash_hex(0x11),
            "nonce": "0x5",
            "blockHash": hash_hex(0xaa),
            "blockNumber": "0x64",
            "transactionIndex": "0x0",
            "from": address_hex(0x21),
            "to": to,
            "value": "0xde0b6b3a7640000",
            "gasPrice": "0x3b9aca00",
            "gas": "0x5208",
            "input": "0x6001",
            "v": "0x25",
            // The secp256k1 generator x-coordinate: guaranteed recoverable.
            "r": "0x79be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798",
            "s": "0x1",
            "type": "0x0",
            "chainId": "0x1",
        }))
        .expect("valid transaction fixture")
    }

    fn sample_receipt(contract: Option<String>, logs: serde_json::Value) -> TransactionReceipt {
        serde_json::from_value(json!({
            "transactionHash": hash_hex(0x11),
            "transactionIndex": "0x0",
            "blockHash": hash_hex(0xaa),
            "blockNumber": "0x64",
            "from": address_hex(0x21),
            "to": null,
            "cumulativeGasUsed": "0x5208",
            "gasUsed": "0x5208",
            "contractAddress": contract,
            "logs": logs,
            "status": "0x1",
            "logsBloom": bloom_hex(),
            "type": "0x0",
            "effectiveGasPrice": "0x3b9aca00",
        }))
        .expect("valid receipt fixture")
    }

    #[test]
    fn block_row_mirrors_header_fields() {
        let header = sample_header();
        let row = build_block_row(&header);

        assert_eq!(row.hash, hash_hex(0xaa));
        assert_eq!(row.number, 100);
        assert_eq!(row.time, 0x6548_7621);
        assert_eq!(row.miner, address_hex(0xad));
        assert_eq!(row.difficulty, "2");
        assert_eq!(row.gas_used, 21_000);
        assert_eq!(row.size, 544.0);
        assert_eq!(row.extra_data, vec![1, 2, 3]);
    }

    #[test]
    fn call_transaction_keeps_recipient_and_no_contract() {
        let tx = sample_transaction(Some(address_hex(0x31)));
        let receipt = sample_receipt(None, json!([]));
        let sender = recover_sender(&tx).expect("fixture signature recovers some address");

        let packed = build_packed_tx(&tx, sender, &receipt, Some(7)).unwrap();
        assert_eq!(packed.tx.to.as_deref(), Some(address_hex(0x31).as_str()));
        assert_eq!(packed.tx.contract, None);
        assert_eq!(packed.tx.nonce, 5);
        assert_eq!(packed.tx.gas, 21_000);
        assert_eq!(packed.tx.state, 1);
        assert_eq!(packed.tx.block_hash, hash_hex(0xaa));
        assert!(packed.events.is_empty());
    }

    #[test]
    fn creation_transaction_records_contract_from_receipt() {
        let tx = sample_transaction(None);
        let receipt = sample_receipt(Some(address_hex(0x41)), json!([]));
        let sender = recover_sender(&tx).expect("recoverable signature");

        let packed = build_packed_tx(&tx, sender, &receipt, None).unwrap();
        assert_eq!(packed.tx.to, None);
        assert_eq!(
            packed.tx.contract.as_deref(),
            Some(address_hex(0x41).as_str())
        );
    }

    #[test]
    fn cost_is_value_plus_gas_times_price() {
        let tx = sample_transaction(Some(address_hex(0x31)));
        let receipt = sample_receipt(None, json!([]));
        let sender = recover_sender(&tx).unwrap();

        let packed = build_packed_tx(&tx, sender, &receipt, None).unwrap();
        // 1 ETH + 21000 * 1 gwei
        let expected = U256::from(10u128.pow(18)) + U256::from(21_000u64) * U256::from(10u64.pow(9));
        assert_eq!(packed.tx.cost, expected.to_string());
        assert_eq!(packed.tx.gas_price, "1000000000");
    }

    #[test]
    fn events_keyed_by_block_hash_and_log_index() {
        let tx = sample_transaction(Some(address_hex(0x31)));
        let logs = json!([
            {
                "address": address_hex(0x51),
                "topics": [hash_hex(0x61), hash_hex(0x62)],
                "data": "0x0001",
                "blockHash": hash_hex(0xaa),
                "blockNumber": "0x64",
                "transactionHash": hash_hex(0x11),
                "transactionIndex": "0x0",
                "logIndex": "0x3",
                "removed": false,
            },
        ]);
        let receipt = sample_receipt(None, logs);
        let sender = recover_sender(&tx).unwrap();

        let packed = build_packed_tx(&tx, sender, &receipt, None).unwrap();
        assert_eq!(packed.events.len(), 1);
        let event = &packed.events[0];
        assert_eq!(event.block_hash, hash_hex(0xaa));
        assert_eq!(event.index, 3);
        assert_eq!(event.origin, address_hex(0x51));
        assert_eq!(event.topics, vec![hash_hex(0x61), hash_hex(0x62)]);
        assert_eq!(event.data, vec![0, 1]);
        assert_eq!(event.tx_hash, hash_hex(0x11));
    }
}
