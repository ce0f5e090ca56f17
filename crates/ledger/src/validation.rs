//! Header, body, ommer, transaction, and receipt validators (SPEC_FULL.md
//! §4.7), plus the transactions/receipts/ommers root helpers the body and
//! receipt validators (and `execution.rs`'s post-execution check) share.

use crate::config::BlockchainConfig;
use crate::errors::{LedgerError, ValidationError};
use kv_store::{InMemoryKVStore, KeyValueStore};
use shared_crypto::ecdsa::{is_low_s, recover_address, SECP256K1_N};
use shared_types::bloom::LogBloom;
use shared_types::rlp::{self, Item};
use shared_types::{keccak256, keccak512, Account, Address, Block, BlockHeader, Hash, Receipt, SignedTransaction};
use state_trie::Trie;
use std::collections::HashSet;
use std::sync::Arc;

const MINIMUM_GAS_LIMIT: u64 = 125_000;
const MINIMUM_DIFFICULTY: u128 = 131_072;

/// Homestead/Frontier difficulty formula with the difficulty-bomb term,
/// evaluated for a child block with `number = parent.number + 1`.
#[must_use]
pub fn expected_difficulty(config: &BlockchainConfig, parent: &BlockHeader, child_number: u64, child_timestamp: u64) -> shared_types::U256 {
    use shared_types::U256;

    let homestead_active = child_number >= config.fork_schedule.homestead_block;
    let time_delta = child_timestamp.saturating_sub(parent.timestamp) as i64;

    let sign: i64 = if homestead_active {
        std::cmp::max(1 - time_delta / 10, -99)
    } else if time_delta < 13 {
        1
    } else {
        -1
    };

    let adjustment = parent.difficulty / U256::from(2048u64) * U256::from(sign.unsigned_abs());
    let mut difficulty = if sign >= 0 {
        parent.difficulty + adjustment
    } else {
        parent.difficulty.saturating_sub(adjustment)
    };

    let minimum = U256::from(MINIMUM_DIFFICULTY);
    if difficulty < minimum {
        difficulty = minimum;
    }

    let effective_number = bomb_effective_number(config, child_number);
    if effective_number >= 200_000 {
        let epoch = effective_number / 100_000;
        let mut bomb = U256::one();
        for _ in 0..(epoch - 2) {
            bomb = bomb * U256::from(2u64);
        }
        difficulty = difficulty + bomb;
    }

    difficulty
}

/// Maps a real block number to the "fake" number the difficulty bomb sees,
/// per the pause/continue configuration (ECIP-1041-style bomb defusion).
fn bomb_effective_number(config: &BlockchainConfig, number: u64) -> u64 {
    match (config.difficulty_bomb_pause_block, config.difficulty_bomb_continue_block) {
        (Some(pause), Some(resume)) if number >= resume => number - (resume - pause),
        (Some(pause), _) if number >= pause => pause,
        _ => number,
    }
}

/// `kec256(kec512(kec256(encode_without_nonce) || nonce_le) || mix_hash)`
/// interpreted as a big-endian integer, checked against `2^256 / difficulty`.
/// Simplified per SPEC_FULL.md §9: no Ethash DAG/cache, hash-against-target only.
pub fn check_proof_of_work(header: &BlockHeader) -> Result<(), ValidationError> {
    if header.difficulty.is_zero() {
        return Err(ValidationError::InsufficientWork);
    }
    let header_hash = keccak256(&header.encode_without_nonce());
    let mut nonce_le = header.nonce;
    nonce_le.reverse();

    let mut seed_input = Vec::with_capacity(header_hash.len() + nonce_le.len());
    seed_input.extend_from_slice(&header_hash);
    seed_input.extend_from_slice(&nonce_le);
    let seed = keccak512(&seed_input);

    let mut digest_input = Vec::with_capacity(seed.len() + header.mix_hash.len());
    digest_input.extend_from_slice(&seed);
    digest_input.extend_from_slice(&header.mix_hash);
    let digest = keccak256(&digest_input);

    let value = shared_types::U256::from_big_endian(&digest);
    let target = shared_types::U256::max_value() / header.difficulty;
    if value <= target {
        Ok(())
    } else {
        Err(ValidationError::InsufficientWork)
    }
}

/// Validates a header against its parent: everything in SPEC_FULL.md §4.7
/// except the ommer set, which needs chain lookups the header alone can't
/// provide (see `validate_ommers`).
pub fn validate_header(config: &BlockchainConfig, header: &BlockHeader, parent: &BlockHeader) -> Result<(), ValidationError> {
    if header.extra_data.len() > 32 {
        return Err(ValidationError::ExtraDataTooLarge(header.extra_data.len()));
    }
    if header.timestamp <= parent.timestamp {
        return Err(ValidationError::TimestampNotIncreasing {
            timestamp: header.timestamp,
            parent_timestamp: parent.timestamp,
        });
    }
    if header.number != parent.number + 1 {
        return Err(ValidationError::NumberNotSequential {
            number: header.number,
            parent_number: parent.number,
        });
    }
    if header.gas_limit < MINIMUM_GAS_LIMIT {
        return Err(ValidationError::GasLimitBelowMinimum(header.gas_limit));
    }
    let bound = parent.gas_limit / 1024;
    let lower = parent.gas_limit.saturating_sub(bound);
    let upper = parent.gas_limit + bound;
    if header.gas_limit < lower || header.gas_limit > upper {
        return Err(ValidationError::GasLimitOutOfBounds {
            gas_limit: header.gas_limit,
            parent_gas_limit: parent.gas_limit,
        });
    }
    if header.gas_used > header.gas_limit {
        return Err(ValidationError::GasUsedExceedsLimit {
            gas_used: header.gas_used,
            gas_limit: header.gas_limit,
        });
    }

    let expected = expected_difficulty(config, parent, header.number, header.timestamp);
    if header.difficulty != expected {
        return Err(ValidationError::WrongDifficulty {
            expected: format!("{expected:x?}"),
            actual: format!("{:x?}", header.difficulty),
        });
    }

    check_proof_of_work(header)
}

/// At most 2 ommers, no duplicates, none already canonical, each at most 6
/// generations behind this block with a known, matching parent. `get_ancestor`
/// maps a block number to that ancestor's hash along the chain being
/// extended; `is_known_ommer_or_block` reports whether a hash is already
/// part of the canonical chain or a previously accepted ommer.
pub fn validate_ommers(
    header: &BlockHeader,
    ommers: &[BlockHeader],
    get_ancestor: impl Fn(u64) -> Option<Hash>,
    is_known_ommer_or_block: impl Fn(&Hash) -> bool,
) -> Result<(), ValidationError> {
    if ommers.len() > 2 {
        return Err(ValidationError::TooManyOmmers(ommers.len()));
    }
    let mut seen = HashSet::new();
    for ommer in ommers {
        let ommer_hash = ommer.hash();
        if !seen.insert(ommer_hash) {
            return Err(ValidationError::DuplicateOmmer);
        }
        if is_known_ommer_or_block(&ommer_hash) {
            return Err(ValidationError::OmmerInChain);
        }
        let distance = header.number.saturating_sub(ommer.number);
        if distance == 0 || distance > 6 {
            return Err(ValidationError::OmmerTooOld);
        }
        match get_ancestor(ommer.number.saturating_sub(1)) {
            Some(ancestor_hash) if ancestor_hash == ommer.parent_hash => {}
            _ => return Err(ValidationError::OmmerParentUnknown),
        }
    }
    Ok(())
}

/// `transactions_root`/`ommers_hash` against the block body.
pub fn validate_body(block: &Block) -> Result<(), LedgerError> {
    let transactions_root = compute_transactions_root(&block.transactions)?;
    if transactions_root != block.header.transactions_root {
        return Err(ValidationError::WrongTransactionsRoot.into());
    }
    let ommers_hash = compute_ommers_hash(&block.ommers);
    if ommers_hash != block.header.ommers_hash {
        return Err(ValidationError::WrongOmmersHash.into());
    }
    Ok(())
}

/// `receipts_root`/`logs_bloom`/`gas_used` against the executed receipts.
pub fn validate_receipts(header: &BlockHeader, receipts: &[Receipt]) -> Result<(), LedgerError> {
    let receipts_root = compute_receipts_root(receipts)?;
    if receipts_root != header.receipts_root {
        return Err(ValidationError::WrongReceiptsRoot.into());
    }
    let logs_bloom = compute_logs_bloom(receipts);
    if logs_bloom != header.logs_bloom {
        return Err(ValidationError::WrongLogsBloom.into());
    }
    let gas_used = receipts.last().map_or(0, |r| r.cumulative_gas_used);
    if gas_used != header.gas_used {
        return Err(ValidationError::WrongGasUsed.into());
    }
    Ok(())
}

/// Recovers the sender, checking signature range, Homestead low-s, and
/// EIP-155 chain-id gating along the way.
pub fn recover_sender(tx: &SignedTransaction, config: &BlockchainConfig, block_number: u64) -> Result<Address, ValidationError> {
    let evm_config = config.fork_schedule.config_at(block_number);
    let chain_id = tx.chain_id();

    match chain_id {
        Some(id) => {
            if !evm_config.fee_schedule.eip155_active || id != config.chain_id {
                return Err(ValidationError::InvalidSignature);
            }
        }
        None => {
            if tx.v != 27 && tx.v != 28 {
                return Err(ValidationError::InvalidSignature);
            }
        }
    }

    if evm_config.fee_schedule.homestead_active && !is_low_s(tx.s) {
        return Err(ValidationError::HighS);
    }
    if tx.r.is_zero() || tx.r >= SECP256K1_N {
        return Err(ValidationError::InvalidSignature);
    }

    let message_hash = tx.signing_hash(chain_id);
    recover_address(&message_hash, tx.r, tx.s, tx.y_parity()).map_err(|_| ValidationError::InvalidSignature)
}

/// Nonce match, up-front balance, and intrinsic gas, against the sender's
/// account as it stood before this transaction.
pub fn validate_transaction_economics(tx: &SignedTransaction, sender: &Account) -> Result<(), ValidationError> {
    if tx.nonce != sender.nonce {
        return Err(ValidationError::NonceMismatch { got: tx.nonce, expected: sender.nonce });
    }
    if tx.up_front_cost() > sender.balance {
        return Err(ValidationError::InsufficientFunds);
    }
    let intrinsic = tx.intrinsic_gas();
    if tx.gas_limit < intrinsic {
        return Err(ValidationError::IntrinsicGasTooLow { gas_limit: tx.gas_limit, intrinsic });
    }
    Ok(())
}

pub fn validate_total_gas_limit(transactions: &[SignedTransaction], block_gas_limit: u64) -> Result<(), ValidationError> {
    let mut sum: u64 = 0;
    for tx in transactions {
        sum = sum.saturating_add(tx.gas_limit);
    }
    if sum > block_gas_limit {
        return Err(ValidationError::BlockGasLimitExceeded { sum, gas_limit: block_gas_limit });
    }
    Ok(())
}

pub fn compute_transactions_root(transactions: &[SignedTransaction]) -> Result<Hash, LedgerError> {
    let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryKVStore::new());
    let mut trie = Trie::new(store);
    for (index, tx) in transactions.iter().enumerate() {
        let key = rlp::encode(&Item::uint(index as u64));
        trie.put(&key, tx.encode())?;
    }
    Ok(trie.root_hash())
}

pub fn compute_receipts_root(receipts: &[Receipt]) -> Result<Hash, LedgerError> {
    let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryKVStore::new());
    let mut trie = Trie::new(store);
    for (index, receipt) in receipts.iter().enumerate() {
        let key = rlp::encode(&Item::uint(index as u64));
        trie.put(&key, receipt.encode())?;
    }
    Ok(trie.root_hash())
}

#[must_use]
pub fn compute_ommers_hash(ommers: &[BlockHeader]) -> Hash {
    keccak256(&rlp::encode(&Item::list(ommers.iter().map(BlockHeader::to_item).collect())))
}

#[must_use]
pub fn compute_logs_bloom(receipts: &[Receipt]) -> LogBloom {
    let mut bloom = [0u8; 256];
    for receipt in receipts {
        shared_types::bloom::or_into(&mut bloom, &receipt.logs_bloom);
    }
    bloom
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(number: u64, parent_hash: Hash, timestamp: u64, difficulty: u128) -> BlockHeader {
        BlockHeader {
            parent_hash,
            ommers_hash: compute_ommers_hash(&[]),
            beneficiary: [0u8; 20],
            state_root: [0u8; 32],
            transactions_root: [0u8; 32],
            receipts_root: [0u8; 32],
            logs_bloom: [0u8; 256],
            difficulty: shared_types::U256::from(difficulty),
            number,
            gas_limit: 5_000_000,
            gas_used: 0,
            timestamp,
            extra_data: vec![],
            mix_hash: [0u8; 32],
            nonce: [0u8; 8],
        }
    }

    #[test]
    fn extra_data_over_32_bytes_is_rejected() {
        let config = BlockchainConfig::etc_mainnet();
        let parent = header(0, [0u8; 32], 1000, 131_072);
        let mut child = header(1, parent.hash(), 1020, 131_072);
        child.extra_data = vec![0u8; 33];
        let err = validate_header(&config, &child, &parent).unwrap_err();
        assert!(matches!(err, ValidationError::ExtraDataTooLarge(33)));
    }

    #[test]
    fn timestamp_must_strictly_increase() {
        let config = BlockchainConfig::etc_mainnet();
        let parent = header(0, [0u8; 32], 1000, 131_072);
        let child = header(1, parent.hash(), 1000, 131_072);
        let err = validate_header(&config, &child, &parent).unwrap_err();
        assert!(matches!(err, ValidationError::TimestampNotIncreasing { .. }));
    }

    #[test]
    fn gas_limit_below_minimum_is_rejected() {
        let config = BlockchainConfig::etc_mainnet();
        let parent = header(0, [0u8; 32], 1000, 131_072);
        let mut child = header(1, parent.hash(), 1020, 131_072);
        child.gas_limit = 100;
        let err = validate_header(&config, &child, &parent).unwrap_err();
        assert!(matches!(err, ValidationError::GasLimitBelowMinimum(100)));
    }

    #[test]
    fn difficulty_floors_at_the_minimum() {
        let config = BlockchainConfig::etc_mainnet();
        let parent = header(0, [0u8; 32], 1000, 131_072);
        let difficulty = expected_difficulty(&config, &parent, 1, 1013);
        assert_eq!(difficulty, shared_types::U256::from(MINIMUM_DIFFICULTY));
    }

    #[test]
    fn ommers_hash_of_empty_list_matches_rlp_empty_list_hash() {
        let hash = compute_ommers_hash(&[]);
        assert_eq!(hash, keccak256(&rlp::encode(&Item::list(vec![]))));
    }

    #[test]
    fn too_many_ommers_is_rejected() {
        let parent = header(0, [0u8; 32], 1000, 131_072);
        let child = header(1, parent.hash(), 1020, 131_072);
        let ommers = vec![
            header(0, [1u8; 32], 900, 100),
            header(0, [2u8; 32], 900, 100),
            header(0, [3u8; 32], 900, 100),
        ];
        let err = validate_ommers(&child, &ommers, |_| None, |_| false).unwrap_err();
        assert!(matches!(err, ValidationError::TooManyOmmers(3)));
    }
}
