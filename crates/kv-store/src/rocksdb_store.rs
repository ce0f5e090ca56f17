//! Production backend, enabled by the `rocksdb-backend` feature.

use crate::namespace::Namespace;
use crate::store::{BatchOperation, KVStoreError, KeyValueStore};
use rocksdb::{ColumnFamilyDescriptor, Options, WriteBatch, DB};
use std::path::Path;
use std::sync::Arc;

pub struct RocksDbStore {
    db: Arc<DB>,
}

impl RocksDbStore {
    /// Open (creating if absent) a database at `path` with one column
    /// family per [`Namespace`].
    ///
    /// # Errors
    ///
    /// Returns `KVStoreError::Io` if the database cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, KVStoreError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = Namespace::ALL
            .iter()
            .map(|ns| ColumnFamilyDescriptor::new(ns.as_str(), Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)
            .map_err(|e| KVStoreError::Io {
                message: e.to_string(),
            })?;

        tracing::info!("opened rocksdb store with {} column families", Namespace::ALL.len());
        Ok(Self { db: Arc::new(db) })
    }

    fn cf_handle(&self, namespace: Namespace) -> Result<&rocksdb::ColumnFamily, KVStoreError> {
        self.db.cf_handle(namespace.as_str()).ok_or_else(|| KVStoreError::Io {
            message: format!("missing column family: {}", namespace.as_str()),
        })
    }
}

impl KeyValueStore for RocksDbStore {
    fn get(&self, namespace: Namespace, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError> {
        let cf = self.cf_handle(namespace)?;
        self.db
            .get_cf(cf, key)
            .map_err(|e| KVStoreError::Io {
                message: e.to_string(),
            })
    }

    fn put(&self, namespace: Namespace, key: &[u8], value: &[u8]) -> Result<(), KVStoreError> {
        let cf = self.cf_handle(namespace)?;
        self.db.put_cf(cf, key, value).map_err(|e| KVStoreError::Io {
            message: e.to_string(),
        })
    }

    fn delete(&self, namespace: Namespace, key: &[u8]) -> Result<(), KVStoreError> {
        let cf = self.cf_handle(namespace)?;
        self.db.delete_cf(cf, key).map_err(|e| KVStoreError::Io {
            message: e.to_string(),
        })
    }

    fn atomic_batch_write(&self, operations: Vec<BatchOperation>) -> Result<(), KVStoreError> {
        let mut batch = WriteBatch::default();
        for op in operations {
            match op {
                BatchOperation::Put { namespace, key, value } => {
                    let cf = self.cf_handle(namespace)?;
                    batch.put_cf(cf, key, value);
                }
                BatchOperation::Delete { namespace, key } => {
                    let cf = self.cf_handle(namespace)?;
                    batch.delete_cf(cf, key);
                }
            }
        }
        self.db.write(batch).map_err(|e| KVStoreError::BatchFailed {
            message: e.to_string(),
        })
    }

    fn prefix_scan(
        &self,
        namespace: Namespace,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KVStoreError> {
        let cf = self.cf_handle(namespace)?;
        let iter = self.db.prefix_iterator_cf(cf, prefix);
        let mut results = Vec::new();
        for item in iter {
            let (key, value) = item.map_err(|e| KVStoreError::Io {
                message: e.to_string(),
            })?;
            if !key.starts_with(prefix) {
                break;
            }
            results.push((key.to_vec(), value.to_vec()));
        }
        Ok(results)
    }
}
