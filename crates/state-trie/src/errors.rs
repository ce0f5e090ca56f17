use shared_types::Hash;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrieError {
    #[error("trie node missing from store: {0:x?}")]
    MissingNode(Hash),
    #[error("malformed trie node encoding: {0}")]
    Malformed(String),
    #[error("underlying store error: {0}")]
    Store(#[from] kv_store::KVStoreError),
}
