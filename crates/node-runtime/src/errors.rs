//! Startup-boundary error type. Everything below this crate returns a typed
//! `Result` (SPEC_FULL.md §7); `main` collapses into `anyhow` only here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("genesis file error: {0}")]
    Genesis(String),

    #[error("malformed hex in genesis file: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("malformed genesis JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage backend error: {0}")]
    Store(#[from] kv_store::KVStoreError),

    #[error("trie error: {0}")]
    Trie(#[from] state_trie::TrieError),

    #[error("ledger error: {0}")]
    Ledger(#[from] ledger::LedgerError),

    #[error("sync engine error: {0}")]
    Sync(#[from] sync_engine::SyncError),
}
