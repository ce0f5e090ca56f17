//! Fixed column-family-like namespaces multiplexed onto a single keyspace.

/// Logical partitions of the node's persistent state. Each maps to a
/// RocksDB column family in the production backend and to a key prefix
/// in the in-memory backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Block header RLP, keyed by block hash.
    BlockHeaders,
    /// Block body (ommers + transactions) RLP, keyed by block hash.
    BlockBodies,
    /// Transaction receipts, keyed by block hash.
    Receipts,
    /// Trie nodes, keyed by `kec256(RLP(node))`.
    Nodes,
    /// Contract bytecode, keyed by `kec256(code)`.
    EvmCode,
    /// Cumulative total difficulty, keyed by block hash.
    TotalDifficulty,
    /// Canonical block-number to block-hash mapping.
    BlockNumberMapping,
    /// Transaction hash to `(block hash, index)` mapping.
    TransactionMapping,
    /// Node-runtime application state (head pointer, chain config snapshot).
    AppState,
    /// Fast-sync pivot and queue progress, survives a restart mid-sync.
    FastSyncState,
}

impl Namespace {
    /// All namespaces, used to pre-create RocksDB column families.
    pub const ALL: [Namespace; 10] = [
        Namespace::BlockHeaders,
        Namespace::BlockBodies,
        Namespace::Receipts,
        Namespace::Nodes,
        Namespace::EvmCode,
        Namespace::TotalDifficulty,
        Namespace::BlockNumberMapping,
        Namespace::TransactionMapping,
        Namespace::AppState,
        Namespace::FastSyncState,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::BlockHeaders => "block_headers",
            Namespace::BlockBodies => "block_bodies",
            Namespace::Receipts => "receipts",
            Namespace::Nodes => "nodes",
            Namespace::EvmCode => "evm_code",
            Namespace::TotalDifficulty => "total_difficulty",
            Namespace::BlockNumberMapping => "block_number_mapping",
            Namespace::TransactionMapping => "transaction_mapping",
            Namespace::AppState => "app_state",
            Namespace::FastSyncState => "fast_sync_state",
        }
    }

    /// Prefix this namespace's byte onto `key`, used by the in-memory
    /// adapter to emulate column-family isolation on a flat map.
    #[must_use]
    pub fn prefix(&self, key: &[u8]) -> Vec<u8> {
        let mut prefixed = Vec::with_capacity(key.len() + 1);
        prefixed.push(self.tag());
        prefixed.extend_from_slice(key);
        prefixed
    }

    fn tag(&self) -> u8 {
        match self {
            Namespace::BlockHeaders => 0,
            Namespace::BlockBodies => 1,
            Namespace::Receipts => 2,
            Namespace::Nodes => 3,
            Namespace::EvmCode => 4,
            Namespace::TotalDifficulty => 5,
            Namespace::BlockNumberMapping => 6,
            Namespace::TransactionMapping => 7,
            Namespace::AppState => 8,
            Namespace::FastSyncState => 9,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_are_distinct_per_namespace() {
        let key = b"same-key";
        let a = Namespace::BlockHeaders.prefix(key);
        let b = Namespace::Receipts.prefix(key);
        assert_ne!(a, b);
        assert_eq!(&a[1..], key);
    }

    #[test]
    fn all_lists_every_variant_once() {
        let names: std::collections::HashSet<_> =
            Namespace::ALL.iter().map(Namespace::as_str).collect();
        assert_eq!(names.len(), Namespace::ALL.len());
    }
}
