//! Block execution, world-state proxy, validators, and chain import/reorg
//! logic — the node's consensus-critical core.
//!
//! Grounded on `qc-11-smart-contracts`'s layering (ports, value objects,
//! a synchronous state-transition core) generalised from a single
//! PoS-validator-set state transition to SPEC_FULL.md §4.3-4.8's full
//! account/EVM/block/chain model.

pub mod chain;
pub mod config;
pub mod errors;
pub mod execution;
pub mod reward;
pub mod validation;
pub mod world_state;

pub use chain::{
    load_body, load_header_by_hash, load_number_mapping, load_total_difficulty, persist_block, BranchResolution,
    ImportOutcome, Ledger,
};
pub use config::{BlockchainConfig, MonetaryPolicy};
pub use errors::{LedgerError, ValidationError};
pub use execution::{execute_block, execute_transaction, TransactionOutcome};
pub use world_state::{derive_contract_address, WorldStateProxy};
