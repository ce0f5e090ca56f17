//! Error types for peer I/O, wire decoding, and the sync drivers.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("ledger error: {0}")]
    Ledger(#[from] ledger::LedgerError),

    #[error("rlp error: {0}")]
    Rlp(#[from] shared_types::RlpError),

    #[error("trie error: {0}")]
    Trie(#[from] state_trie::TrieError),

    #[error("storage backend error: {0}")]
    Store(#[from] kv_store::KVStoreError),

    #[error("no handshaked, non-blacklisted peers are available")]
    NoPeers,

    #[error("peer {0} did not respond within the configured timeout")]
    PeerTimeout(String),

    #[error("peer {0} disconnected before completing the request")]
    PeerTerminated(String),

    #[error("malformed wire message: {0}")]
    Protocol(String),

    #[error("state node {0:x?} hash does not match its advertised key")]
    StateNodeHashMismatch(shared_types::Hash),
}
