//! Error types for world-state access, block validation, and execution.

use shared_types::{Address, Hash};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("trie error: {0}")]
    Trie(#[from] state_trie::TrieError),

    #[error("storage backend error: {0}")]
    Store(#[from] kv_store::KVStoreError),

    #[error("rlp error: {0}")]
    Rlp(#[from] shared_types::RlpError),

    #[error("signature error: {0}")]
    Crypto(#[from] shared_crypto::CryptoError),

    #[error("evm error: {0}")]
    Vm(#[from] evm::VmError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("resulting state root {actual:x?} does not match expected {expected:x?}")]
    StateRootMismatch { expected: Hash, actual: Hash },

    #[error("insufficient balance for account {0:?}")]
    InsufficientBalance(Address),

    #[error("block queue rejected the header: {0:?}")]
    BlockQueueRejected(block_queue::RejectReason),

    #[error("referenced block {0:?} is not known to this ledger")]
    UnknownBlock(Hash),
}

/// Rejections raised while validating a header, body, transaction, or
/// receipt set against its parent / against itself, per SPEC_FULL.md §4.7.
/// A validation failure means "reject this block, black-list its source,
/// keep the node running" — never a fatal error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("extra_data is {0} bytes, more than the 32-byte limit")]
    ExtraDataTooLarge(usize),

    #[error("timestamp {timestamp} does not exceed parent timestamp {parent_timestamp}")]
    TimestampNotIncreasing { timestamp: u64, parent_timestamp: u64 },

    #[error("gas limit {gas_limit} is outside the allowed range of parent {parent_gas_limit}")]
    GasLimitOutOfBounds { gas_limit: u64, parent_gas_limit: u64 },

    #[error("gas limit {0} is below the protocol minimum of 125000")]
    GasLimitBelowMinimum(u64),

    #[error("gas used {gas_used} exceeds gas limit {gas_limit}")]
    GasUsedExceedsLimit { gas_used: u64, gas_limit: u64 },

    #[error("block number {number} is not parent number {parent_number} + 1")]
    NumberNotSequential { number: u64, parent_number: u64 },

    #[error("difficulty {actual:x?} does not match the expected value {expected:x?}")]
    WrongDifficulty { expected: String, actual: String },

    #[error("proof of work does not meet the difficulty target")]
    InsufficientWork,

    #[error("block has {0} ommers, more than the limit of 2")]
    TooManyOmmers(usize),

    #[error("duplicate ommer in the same block")]
    DuplicateOmmer,

    #[error("ommer is already present in the canonical chain")]
    OmmerInChain,

    #[error("ommer is more than 6 generations removed from this block")]
    OmmerTooOld,

    #[error("ommer's parent is not a known ancestor")]
    OmmerParentUnknown,

    #[error("transactions_root does not match the block body")]
    WrongTransactionsRoot,

    #[error("ommers_hash does not match the block body")]
    WrongOmmersHash,

    #[error("receipts_root does not match the computed receipts")]
    WrongReceiptsRoot,

    #[error("logs_bloom does not match the OR of receipt blooms")]
    WrongLogsBloom,

    #[error("state_root does not match the post-execution world state")]
    WrongStateRoot,

    #[error("block gas_used does not match the sum of receipt gas used")]
    WrongGasUsed,

    #[error("transaction signature component out of range")]
    InvalidSignature,

    #[error("transaction uses a post-Homestead high-s signature")]
    HighS,

    #[error("transaction nonce {got} does not match account nonce {expected}")]
    NonceMismatch { got: u64, expected: u64 },

    #[error("sender cannot cover gas_limit*gas_price + value")]
    InsufficientFunds,

    #[error("transaction gas_limit {gas_limit} is below its intrinsic gas {intrinsic}")]
    IntrinsicGasTooLow { gas_limit: u64, intrinsic: u64 },

    #[error("sum of transaction gas limits {sum} exceeds block gas_limit {gas_limit}")]
    BlockGasLimitExceeded { sum: u64, gas_limit: u64 },
}
