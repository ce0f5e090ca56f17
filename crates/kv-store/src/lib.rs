//! # KV Store
//!
//! The lowest storage layer: a namespaced byte-oriented key-value port that
//! the world-state trie and the ledger's chain index are built on top of.
//!
//! Grounded on `qc-02-block-storage/src/ports/outbound.rs`'s `KeyValueStore`
//! trait and `InMemoryKVStore` adapter. The teacher's checksum/filesystem/
//! serializer ports and its CRC32C-verified block-assembly pipeline are
//! dropped here: this crate only needs the storage primitive, since
//! integrity and chunk-reassembly duties don't apply to a trie/account
//! store addressed by content hash.

pub mod memory;
pub mod namespace;
#[cfg(feature = "rocksdb-backend")]
pub mod rocksdb_store;
pub mod store;

pub use memory::InMemoryKVStore;
pub use namespace::Namespace;
#[cfg(feature = "rocksdb-backend")]
pub use rocksdb_store::RocksDbStore;
pub use store::{BatchOperation, KVStoreError, KeyValueStore};
