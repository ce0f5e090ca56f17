//! The storage port every adapter in this crate implements.

use crate::namespace::Namespace;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KVStoreError {
    #[error("storage backend I/O error: {message}")]
    Io { message: String },
    #[error("batch write failed, no operations were applied: {message}")]
    BatchFailed { message: String },
}

/// An atomic batch operation scoped to a single namespace.
#[derive(Debug, Clone)]
pub enum BatchOperation {
    Put {
        namespace: Namespace,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    Delete {
        namespace: Namespace,
        key: Vec<u8>,
    },
}

impl BatchOperation {
    #[must_use]
    pub fn put(namespace: Namespace, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Put {
            namespace,
            key: key.into(),
            value: value.into(),
        }
    }

    #[must_use]
    pub fn delete(namespace: Namespace, key: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Delete {
            namespace,
            key: key.into(),
        }
    }
}

/// Namespaced byte-oriented key-value storage. The trie, the chain index,
/// and the fast-sync queue all address this store through their own
/// namespace rather than sharing a flat keyspace.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, namespace: Namespace, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError>;

    fn put(&self, namespace: Namespace, key: &[u8], value: &[u8]) -> Result<(), KVStoreError>;

    fn delete(&self, namespace: Namespace, key: &[u8]) -> Result<(), KVStoreError>;

    /// Either every operation in `operations` lands, or none do.
    fn atomic_batch_write(&self, operations: Vec<BatchOperation>) -> Result<(), KVStoreError>;

    fn exists(&self, namespace: Namespace, key: &[u8]) -> Result<bool, KVStoreError> {
        Ok(self.get(namespace, key)?.is_some())
    }

    fn prefix_scan(
        &self,
        namespace: Namespace,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KVStoreError>;
}
