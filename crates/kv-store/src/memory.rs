//! In-process backend used by tests and by `NodeConfig::db.backend = "memory"`.

use crate::namespace::Namespace;
use crate::store::{BatchOperation, KVStoreError, KeyValueStore};
use std::collections::HashMap;
use std::sync::RwLock;

/// Namespace-prefixed `HashMap` guarded by a single `RwLock`. Batch writes
/// are atomic because the whole map is locked for the duration of the
/// write; there is no partial-application window for readers to observe.
#[derive(Default)]
pub struct InMemoryKVStore {
    data: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

impl InMemoryKVStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for InMemoryKVStore {
    fn get(&self, namespace: Namespace, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError> {
        let data = self.data.read().expect("kv-store lock poisoned");
        Ok(data.get(&namespace.prefix(key)).cloned())
    }

    fn put(&self, namespace: Namespace, key: &[u8], value: &[u8]) -> Result<(), KVStoreError> {
        let mut data = self.data.write().expect("kv-store lock poisoned");
        data.insert(namespace.prefix(key), value.to_vec());
        Ok(())
    }

    fn delete(&self, namespace: Namespace, key: &[u8]) -> Result<(), KVStoreError> {
        let mut data = self.data.write().expect("kv-store lock poisoned");
        data.remove(&namespace.prefix(key));
        Ok(())
    }

    fn atomic_batch_write(&self, operations: Vec<BatchOperation>) -> Result<(), KVStoreError> {
        let mut data = self.data.write().expect("kv-store lock poisoned");
        for op in operations {
            match op {
                BatchOperation::Put {
                    namespace,
                    key,
                    value,
                } => {
                    data.insert(namespace.prefix(&key), value);
                }
                BatchOperation::Delete { namespace, key } => {
                    data.remove(&namespace.prefix(&key));
                }
            }
        }
        Ok(())
    }

    fn prefix_scan(
        &self,
        namespace: Namespace,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KVStoreError> {
        let data = self.data.read().expect("kv-store lock poisoned");
        let namespace_prefix = namespace.prefix(&[]);
        let full_prefix: Vec<u8> = namespace_prefix
            .iter()
            .chain(prefix.iter())
            .copied()
            .collect();
        let results = data
            .iter()
            .filter(|(k, _)| k.starts_with(&full_prefix))
            .map(|(k, v)| (k[namespace_prefix.len()..].to_vec(), v.clone()))
            .collect();
        Ok(results)
    }
}
