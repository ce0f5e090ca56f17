//! Genesis file parsing and block-0 construction (SPEC_FULL.md §6).
//!
//! Grounded on the teacher's `genesis/builder.rs`, which computes block 0's
//! state root by hashing the validator list directly — its own comment
//! flags this as a placeholder ("In production: build actual Patricia
//! Merkle Trie"). This version builds a real [`state_trie::Trie`] over
//! `alloc` instead, the way [`crate::runtime`] builds every other state
//! root in the node.

use crate::errors::NodeError;
use kv_store::KeyValueStore;
use serde::Deserialize;
use shared_types::{Account, Address, Block, BlockHeader, Hash, U256};
use state_trie::Trie;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct GenesisFile {
    coinbase: String,
    difficulty: String,
    #[serde(rename = "gasLimit")]
    gas_limit: String,
    timestamp: String,
    #[serde(rename = "extraData")]
    extra_data: String,
    #[serde(rename = "mixHash")]
    mix_hash: String,
    nonce: String,
    alloc: HashMap<String, AllocEntry>,
}

#[derive(Debug, Deserialize)]
struct AllocEntry {
    balance: String,
}

fn strip_0x(s: &str) -> &str {
    s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s)
}

fn parse_hex_bytes(field: &str, s: &str) -> Result<Vec<u8>, NodeError> {
    hex::decode(strip_0x(s)).map_err(|error| {
        tracing::warn!(%field, %error, "malformed hex in genesis file");
        NodeError::Hex(error)
    })
}

fn parse_hex_u256(field: &str, s: &str) -> Result<U256, NodeError> {
    let bytes = parse_hex_bytes(field, s)?;
    if bytes.len() > 32 {
        return Err(NodeError::Genesis(format!("field {field} overflows u256")));
    }
    Ok(U256::from_big_endian(&bytes))
}

fn parse_hex_u64(field: &str, s: &str) -> Result<u64, NodeError> {
    let bytes = parse_hex_bytes(field, s)?;
    if bytes.len() > 8 {
        return Err(NodeError::Genesis(format!("field {field} overflows u64")));
    }
    let mut buf = [0u8; 8];
    buf[8 - bytes.len()..].copy_from_slice(&bytes);
    Ok(u64::from_be_bytes(buf))
}

fn parse_hex_address(field: &str, s: &str) -> Result<Address, NodeError> {
    let bytes = parse_hex_bytes(field, s)?;
    Address::try_from(bytes.as_slice()).map_err(|_| NodeError::Genesis(format!("field {field} must be 20 bytes")))
}

fn parse_hex_hash(field: &str, s: &str) -> Result<Hash, NodeError> {
    let bytes = parse_hex_bytes(field, s)?;
    Hash::try_from(bytes.as_slice()).map_err(|_| NodeError::Genesis(format!("field {field} must be 32 bytes")))
}

fn parse_hex_nonce(field: &str, s: &str) -> Result<[u8; 8], NodeError> {
    let bytes = parse_hex_bytes(field, s)?;
    <[u8; 8]>::try_from(bytes.as_slice()).map_err(|_| NodeError::Genesis(format!("field {field} must be 8 bytes")))
}

/// Parses the genesis JSON, builds a real initial state trie over `alloc`,
/// and returns block 0 with a genuine MPT `state_root`.
pub fn build_genesis_block(raw: &[u8], store: Arc<dyn KeyValueStore>, account_start_nonce: u64) -> Result<Block, NodeError> {
    let file: GenesisFile = serde_json::from_slice(raw)?;

    let coinbase = parse_hex_address("coinbase", &file.coinbase)?;
    let difficulty = parse_hex_u256("difficulty", &file.difficulty)?;
    let gas_limit = parse_hex_u64("gasLimit", &file.gas_limit)?;
    let timestamp = parse_hex_u64("timestamp", &file.timestamp)?;
    let extra_data = parse_hex_bytes("extraData", &file.extra_data)?;
    let mix_hash = parse_hex_hash("mixHash", &file.mix_hash)?;
    let nonce = parse_hex_nonce("nonce", &file.nonce)?;

    let mut trie = Trie::new(store);
    for (address_hex, entry) in &file.alloc {
        let address = parse_hex_address("alloc key", address_hex)?;
        let balance = U256::from_dec_str(&entry.balance)
            .map_err(|_| NodeError::Genesis(format!("alloc balance for {address_hex} is not a decimal integer")))?;
        let account = Account { nonce: account_start_nonce, balance, ..Account::empty() };
        trie.put(&address, account.encode())?;
    }
    let state_root = trie.root_hash();

    let header = BlockHeader {
        parent_hash: [0u8; 32],
        ommers_hash: ledger::validation::compute_ommers_hash(&[]),
        beneficiary: coinbase,
        state_root,
        transactions_root: ledger::validation::compute_transactions_root(&[])?,
        receipts_root: ledger::validation::compute_receipts_root(&[])?,
        logs_bloom: [0u8; 256],
        difficulty,
        number: 0,
        gas_limit,
        gas_used: 0,
        timestamp,
        extra_data,
        mix_hash,
        nonce,
    };
    Ok(Block { header, transactions: vec![], ommers: vec![] })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kv_store::InMemoryKVStore;

    const SAMPLE: &str = r#"{
        "coinbase": "0x0000000000000000000000000000000000000000",
        "difficulty": "0x400000",
        "gasLimit": "0x1388",
        "timestamp": "0x00",
        "extraData": "0x",
        "mixHash": "0x0000000000000000000000000000000000000000000000000000000000000000",
        "nonce": "0x0000000000000042",
        "alloc": {
            "000d836201318ec6899a67540690382780743280": { "balance": "200000000000000000000" }
        }
    }"#;

    #[test]
    fn parses_well_formed_genesis_and_builds_a_nonzero_state_root() {
        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryKVStore::new());
        let block = build_genesis_block(SAMPLE.as_bytes(), store, 0).unwrap();
        assert_eq!(block.header.number, 0);
        assert_eq!(block.header.gas_limit, 0x1388);
        assert_ne!(block.header.state_root, shared_types::EMPTY_TRIE_ROOT);
    }

    #[test]
    fn two_allocations_produce_an_order_independent_root() {
        let alloc_a = r#"{"coinbase":"0x0000000000000000000000000000000000000000","difficulty":"0x1","gasLimit":"0x1388","timestamp":"0x0","extraData":"0x","mixHash":"0x0000000000000000000000000000000000000000000000000000000000000000","nonce":"0x0000000000000000","alloc":{
            "1000000000000000000000000000000000000001":{"balance":"1"},
            "2000000000000000000000000000000000000002":{"balance":"2"}
        }}"#;
        let alloc_b = r#"{"coinbase":"0x0000000000000000000000000000000000000000","difficulty":"0x1","gasLimit":"0x1388","timestamp":"0x0","extraData":"0x","mixHash":"0x0000000000000000000000000000000000000000000000000000000000000000","nonce":"0x0000000000000000","alloc":{
            "2000000000000000000000000000000000000002":{"balance":"2"},
            "1000000000000000000000000000000000000001":{"balance":"1"}
        }}"#;
        let store_a: Arc<dyn KeyValueStore> = Arc::new(InMemoryKVStore::new());
        let store_b: Arc<dyn KeyValueStore> = Arc::new(InMemoryKVStore::new());
        let block_a = build_genesis_block(alloc_a.as_bytes(), store_a, 0).unwrap();
        let block_b = build_genesis_block(alloc_b.as_bytes(), store_b, 0).unwrap();
        assert_eq!(block_a.header.state_root, block_b.header.state_root);
    }

    #[test]
    fn rejects_a_non_decimal_balance() {
        let bad = SAMPLE.replace("200000000000000000000", "0xnotdecimal");
        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryKVStore::new());
        assert!(build_genesis_block(bad.as_bytes(), store, 0).is_err());
    }
}
