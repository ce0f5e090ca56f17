//! Chain import and branch resolution (SPEC_FULL.md §4.5, §4.8): the
//! `Ledger` owns the canonical-chain index in storage, delegates
//! non-canonical headers to a `block_queue::BlockQueue`, and drives
//! `execution::execute_block` to extend or reorganise the chain.
//!
//! Grounded on `block_queue::BlockQueue` for the pending-branch graph and on
//! `qc-08-consensus`'s fork-choice/reorg pattern (heaviest-total-difficulty
//! branch wins, replayed from the last common ancestor's own state root,
//! which stays reachable because trie nodes are content-addressed and never
//! rewritten in place).

use crate::config::BlockchainConfig;
use crate::errors::LedgerError;
use crate::execution;
use crate::world_state::WorldStateProxy;
use block_queue::{BlockQueue, InsertOutcome, RejectReason};
use kv_store::{BatchOperation, KeyValueStore, Namespace};
use shared_types::rlp::{self, Item};
use shared_types::{Block, BlockHeader, Hash, Receipt, SignedTransaction, U256};
use std::collections::HashMap;
use std::sync::Arc;

/// What `import_block` did with a freshly-arrived block.
pub enum ImportOutcome {
    ImportedToTop(U256),
    ChainReorganised { old_branch: Vec<BlockHeader>, new_branch: Vec<BlockHeader> },
    Enqueued,
    Duplicate,
    ImportFailed(LedgerError),
}

/// What a batch of headers from a peer looks like relative to the local chain.
pub enum BranchResolution {
    NewBetterBranch { old_branch: Vec<BlockHeader> },
    NoChainSwitch,
    UnknownBranch,
    InvalidBranch,
}

/// The chain-import side of the ledger: canonical-chain storage plus the
/// non-canonical pending-block graph.
pub struct Ledger {
    store: Arc<dyn KeyValueStore>,
    config: BlockchainConfig,
    queue: BlockQueue,
    pending_bodies: HashMap<Hash, Block>,
    best_number: u64,
    best_hash: Hash,
    best_td: U256,
    state_root: Hash,
}

impl Ledger {
    /// Opens a ledger on `genesis`, persisting it as block 0 if storage is
    /// empty. `queue_ahead`/`queue_behind` bound the non-canonical window, as
    /// for `BlockQueue::new`.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        config: BlockchainConfig,
        genesis: Block,
        queue_ahead: u64,
        queue_behind: u64,
    ) -> Result<Self, LedgerError> {
        let genesis_hash = genesis.hash();
        let mut queue = BlockQueue::new(queue_ahead, queue_behind);

        if load_number_mapping(&store, 0)?.is_some() {
            let best_number = load_best_number(&store)?.unwrap_or(0);
            let best_hash = load_number_mapping(&store, best_number)?.ok_or(LedgerError::UnknownBlock(genesis_hash))?;
            let best_header = load_header_by_hash(&store, &best_hash)?.ok_or(LedgerError::UnknownBlock(best_hash))?;
            let best_td = load_total_difficulty(&store, &best_hash)?.unwrap_or(best_header.difficulty);
            queue.set_best_number(best_number);
            queue.seed_known_block(best_hash, best_td);
            return Ok(Self {
                store,
                config,
                queue,
                pending_bodies: HashMap::new(),
                best_number,
                best_hash,
                best_td,
                state_root: best_header.state_root,
            });
        }

        let genesis_td = genesis.header.difficulty;
        persist_block(&store, &genesis.header, &genesis, &[], genesis_td)?;
        queue.seed_known_block(genesis_hash, genesis_td);

        Ok(Self {
            store,
            config,
            queue,
            pending_bodies: HashMap::new(),
            best_number: 0,
            best_hash: genesis_hash,
            best_td: genesis_td,
            state_root: genesis.header.state_root,
        })
    }

    #[must_use]
    pub fn best_number(&self) -> u64 {
        self.best_number
    }

    #[must_use]
    pub fn best_hash(&self) -> Hash {
        self.best_hash
    }

    #[must_use]
    pub fn best_total_difficulty(&self) -> U256 {
        self.best_td
    }

    #[must_use]
    pub fn state_root(&self) -> Hash {
        self.state_root
    }

    pub fn header_by_hash(&self, hash: &Hash) -> Result<Option<BlockHeader>, LedgerError> {
        load_header_by_hash(&self.store, hash)
    }

    pub fn header_by_number(&self, number: u64) -> Result<Option<BlockHeader>, LedgerError> {
        let Some(hash) = load_number_mapping(&self.store, number)? else {
            return Ok(None);
        };
        load_header_by_hash(&self.store, &hash)
    }

    /// Imports one block: extends the canonical tip directly, triggers a
    /// reorg if a queued branch now outweighs it, enqueues it as a
    /// non-canonical candidate, or reports it as already known / invalid.
    pub fn import_block(&mut self, block: Block) -> ImportOutcome {
        let hash = block.hash();
        if hash == self.best_hash || self.header_by_hash(&hash).ok().flatten().is_some() {
            return ImportOutcome::Duplicate;
        }

        if block.header.parent_hash == self.best_hash {
            let parent = match self.header_by_hash(&self.best_hash) {
                Ok(Some(header)) => header,
                Ok(None) => return ImportOutcome::ImportFailed(LedgerError::UnknownBlock(self.best_hash)),
                Err(error) => return ImportOutcome::ImportFailed(error),
            };
            return match self.extend_canonical(&block, &parent) {
                Ok(td) => ImportOutcome::ImportedToTop(td),
                Err(error) => ImportOutcome::ImportFailed(error),
            };
        }

        self.pending_bodies.insert(hash, block.clone());
        match self.queue.insert(block.header.clone()) {
            InsertOutcome::Rejected(RejectReason::Duplicate) => ImportOutcome::Duplicate,
            InsertOutcome::Rejected(reason) => ImportOutcome::ImportFailed(LedgerError::BlockQueueRejected(reason)),
            InsertOutcome::Enqueued => ImportOutcome::Enqueued,
            InsertOutcome::TdUpdated { best_leaf, best_td } => {
                if best_td <= self.best_td {
                    return ImportOutcome::Enqueued;
                }
                match self.reorganise_to(best_leaf) {
                    Ok(outcome) => outcome,
                    Err(error) => ImportOutcome::ImportFailed(error),
                }
            }
        }
    }

    /// Compares `headers` (a contiguous batch starting at some ancestor)
    /// against the local chain, without importing anything.
    #[must_use]
    pub fn resolve_branch(&self, headers: &[BlockHeader]) -> BranchResolution {
        let Some(root) = headers.first() else {
            return BranchResolution::InvalidBranch;
        };
        for pair in headers.windows(2) {
            if pair[1].parent_hash != pair[0].hash() || pair[1].number != pair[0].number + 1 {
                return BranchResolution::InvalidBranch;
            }
        }

        let Ok(Some(parent)) = self.header_by_hash(&root.parent_hash) else {
            return BranchResolution::UnknownBranch;
        };
        if parent.number + 1 != root.number {
            return BranchResolution::InvalidBranch;
        }

        let mut candidate_td = match load_total_difficulty(&self.store, &root.parent_hash) {
            Ok(Some(td)) => td,
            _ => return BranchResolution::UnknownBranch,
        };
        for header in headers {
            candidate_td = candidate_td + header.difficulty;
        }

        if candidate_td <= self.best_td {
            return BranchResolution::NoChainSwitch;
        }

        let fork_point = parent.number;
        let Ok(old_branch) = self.canonical_suffix_after(fork_point) else {
            return BranchResolution::InvalidBranch;
        };
        BranchResolution::NewBetterBranch { old_branch }
    }

    fn extend_canonical(&mut self, block: &Block, parent: &BlockHeader) -> Result<U256, LedgerError> {
        let mut state = WorldStateProxy::new(self.store.clone(), self.state_root, block.header.number)
            .with_account_start_nonce(self.config.account_start_nonce);
        let receipts = execution::execute_block(&mut state, &self.config, block, parent)?;

        let new_td = self.best_td + block.header.difficulty;
        persist_block(&self.store, &block.header, block, &receipts, new_td)?;

        let hash = block.hash();
        self.best_number = block.header.number;
        self.best_hash = hash;
        self.best_td = new_td;
        self.state_root = block.header.state_root;
        self.queue.set_best_number(self.best_number);
        self.queue.seed_known_block(hash, new_td);
        self.pending_bodies.remove(&hash);
        Ok(new_td)
    }

    /// Replays the queued branch ending at `leaf` from its fork point,
    /// switching the canonical chain to it if every block validates.
    fn reorganise_to(&mut self, leaf: Hash) -> Result<ImportOutcome, LedgerError> {
        let Some(new_headers) = self.queue.get_branch(leaf, true) else {
            return Ok(ImportOutcome::ImportFailed(LedgerError::UnknownBlock(leaf)));
        };
        let Some(root) = new_headers.first() else {
            return Ok(ImportOutcome::ImportFailed(LedgerError::UnknownBlock(leaf)));
        };
        let Some(fork_parent) = self.header_by_hash(&root.parent_hash)? else {
            return Ok(ImportOutcome::ImportFailed(LedgerError::UnknownBlock(root.parent_hash)));
        };

        let old_branch = self.canonical_suffix_after(fork_parent.number)?;

        let mut state_root = fork_parent.state_root;
        let mut parent = fork_parent.clone();
        let mut total_difficulty = load_total_difficulty(&self.store, &root.parent_hash)?.unwrap_or(fork_parent.difficulty);
        let mut persisted = Vec::with_capacity(new_headers.len());
        for header in &new_headers {
            let hash = header.hash();
            let block = self
                .pending_bodies
                .remove(&hash)
                .or_else(|| load_body(&self.store, header.clone()).ok().flatten())
                .ok_or(LedgerError::UnknownBlock(hash))?;

            let mut state = WorldStateProxy::new(self.store.clone(), state_root, header.number)
                .with_account_start_nonce(self.config.account_start_nonce);
            let receipts = execution::execute_block(&mut state, &self.config, &block, &parent)?;
            total_difficulty = total_difficulty + header.difficulty;
            persisted.push((header.clone(), block, receipts, total_difficulty));
            state_root = header.state_root;
            parent = header.clone();
        }

        for (header, block, receipts, td) in &persisted {
            persist_block(&self.store, header, block, receipts, *td)?;
        }
        for stale in &old_branch {
            self.store.delete(Namespace::BlockNumberMapping, &stale.number.to_be_bytes())?;
        }

        let tip = new_headers.last().cloned().unwrap_or(fork_parent.clone());
        self.best_number = tip.number;
        self.best_hash = tip.hash();
        self.best_td = total_difficulty;
        self.state_root = tip.state_root;
        self.queue.set_best_number(self.best_number);
        self.queue.seed_known_block(self.best_hash, self.best_td);

        Ok(ImportOutcome::ChainReorganised { old_branch, new_branch: new_headers })
    }

    fn canonical_suffix_after(&self, fork_point: u64) -> Result<Vec<BlockHeader>, LedgerError> {
        let mut suffix = Vec::new();
        for number in (fork_point + 1)..=self.best_number {
            let Some(header) = self.header_by_number(number)? else {
                break;
            };
            suffix.push(header);
        }
        Ok(suffix)
    }
}

/// Reads a header by hash directly from storage. Exposed beyond this crate
/// so the sync engine can walk a downloaded header chain against what is
/// already persisted without going through a `Ledger` instance.
pub fn load_header_by_hash(store: &Arc<dyn KeyValueStore>, hash: &Hash) -> Result<Option<BlockHeader>, LedgerError> {
    match store.get(Namespace::BlockHeaders, hash)? {
        Some(bytes) => Ok(Some(BlockHeader::decode(&bytes)?)),
        None => Ok(None),
    }
}

pub fn load_number_mapping(store: &Arc<dyn KeyValueStore>, number: u64) -> Result<Option<Hash>, LedgerError> {
    Ok(store.get(Namespace::BlockNumberMapping, &number.to_be_bytes())?.map(|bytes| to_hash(&bytes)))
}

fn load_best_number(store: &Arc<dyn KeyValueStore>) -> Result<Option<u64>, LedgerError> {
    Ok(store.get(Namespace::AppState, b"best_number")?.map(|bytes| {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&bytes);
        u64::from_be_bytes(buf)
    }))
}

pub fn load_total_difficulty(store: &Arc<dyn KeyValueStore>, hash: &Hash) -> Result<Option<U256>, LedgerError> {
    Ok(store.get(Namespace::TotalDifficulty, hash)?.map(|bytes| U256::from_big_endian(&bytes)))
}

pub fn load_body(store: &Arc<dyn KeyValueStore>, header: BlockHeader) -> Result<Option<Block>, LedgerError> {
    let hash = header.hash();
    match store.get(Namespace::BlockBodies, &hash)? {
        Some(bytes) => Ok(Some(decode_body(header, &bytes)?)),
        None => Ok(None),
    }
}

/// Writes a block (header, body, receipts, and the chain-index entries
/// derived from them) into storage under the ledger's namespacing, without
/// going through block execution. Used both by ordinary import and by
/// fast-sync, which has already verified the block some other way (its
/// receipts root against a downloaded header, its state root against a
/// hash-verified trie) and only needs the result persisted.
pub fn persist_block(
    store: &Arc<dyn KeyValueStore>,
    header: &BlockHeader,
    block: &Block,
    receipts: &[Receipt],
    total_difficulty: U256,
) -> Result<(), LedgerError> {
    let hash = header.hash();
    let mut td_bytes = [0u8; 32];
    total_difficulty.to_big_endian(&mut td_bytes);

    let mut operations = vec![
        BatchOperation::put(Namespace::BlockHeaders, hash.to_vec(), header.encode()),
        BatchOperation::put(Namespace::BlockBodies, hash.to_vec(), encode_body(block)?),
        BatchOperation::put(Namespace::TotalDifficulty, hash.to_vec(), td_bytes.to_vec()),
        BatchOperation::put(Namespace::BlockNumberMapping, header.number.to_be_bytes().to_vec(), hash.to_vec()),
        BatchOperation::put(Namespace::AppState, b"best_number".to_vec(), header.number.to_be_bytes().to_vec()),
    ];
    for (index, receipt) in receipts.iter().enumerate() {
        let mut key = hash.to_vec();
        key.extend_from_slice(&(index as u64).to_be_bytes());
        operations.push(BatchOperation::put(Namespace::Receipts, key, receipt.encode()));
    }
    for tx in &block.transactions {
        let mut value = hash.to_vec();
        value.extend_from_slice(&0u64.to_be_bytes());
        operations.push(BatchOperation::put(Namespace::TransactionMapping, tx.hash().to_vec(), value));
    }

    store.atomic_batch_write(operations)?;
    Ok(())
}

fn encode_body(block: &Block) -> Result<Vec<u8>, LedgerError> {
    let mut tx_items = Vec::with_capacity(block.transactions.len());
    for tx in &block.transactions {
        tx_items.push(rlp::decode(&tx.encode())?);
    }
    let ommer_items = block.ommers.iter().map(BlockHeader::to_item).collect();
    let item = Item::list(vec![Item::list(tx_items), Item::list(ommer_items)]);
    Ok(rlp::encode(&item))
}

fn decode_body(header: BlockHeader, bytes: &[u8]) -> Result<Block, LedgerError> {
    let item = rlp::decode(bytes)?;
    let fields = item.as_list()?;
    if fields.len() != 2 {
        return Err(shared_types::RlpError::ArityMismatch.into());
    }
    let mut transactions = Vec::new();
    for tx_item in fields[0].as_list()? {
        transactions.push(SignedTransaction::decode(&rlp::encode(tx_item))?);
    }
    let mut ommers = Vec::new();
    for ommer_item in fields[1].as_list()? {
        ommers.push(BlockHeader::decode(&rlp::encode(ommer_item))?);
    }
    Ok(Block { header, transactions, ommers })
}

fn to_hash(bytes: &[u8]) -> Hash {
    let mut hash = [0u8; 32];
    hash.copy_from_slice(bytes);
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use kv_store::InMemoryKVStore;
    use shared_types::EMPTY_TRIE_ROOT;

    fn header(number: u64, parent_hash: Hash, difficulty: u64, state_root: Hash) -> BlockHeader {
        BlockHeader {
            parent_hash,
            ommers_hash: crate::validation::compute_ommers_hash(&[]),
            beneficiary: [0u8; 20],
            state_root,
            transactions_root: crate::validation::compute_transactions_root(&[]).unwrap(),
            receipts_root: crate::validation::compute_receipts_root(&[]).unwrap(),
            logs_bloom: [0u8; 256],
            difficulty: U256::from(difficulty),
            number,
            gas_limit: 8_000_000,
            gas_used: 0,
            timestamp: 1000 + number,
            extra_data: vec![],
            mix_hash: [0u8; 32],
            nonce: [0u8; 8],
        }
    }

    fn block(number: u64, parent_hash: Hash, difficulty: u64, state_root: Hash) -> Block {
        Block { header: header(number, parent_hash, difficulty, state_root), transactions: vec![], ommers: vec![] }
    }

    fn genesis() -> Block {
        let mut block = block(0, [0u8; 32], 131_072, EMPTY_TRIE_ROOT);
        block.header.gas_limit = 8_000_000;
        block
    }

    #[test]
    fn genesis_is_persisted_as_the_initial_head() {
        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryKVStore::new());
        let ledger = Ledger::new(store, BlockchainConfig::etc_mainnet(), genesis(), 1000, 1000).unwrap();
        assert_eq!(ledger.best_number(), 0);
        assert_eq!(ledger.best_hash(), genesis().hash());
    }

    #[test]
    fn reopening_an_existing_store_resumes_from_the_persisted_head() {
        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryKVStore::new());
        Ledger::new(store.clone(), BlockchainConfig::etc_mainnet(), genesis(), 1000, 1000).unwrap();
        let reopened = Ledger::new(store, BlockchainConfig::etc_mainnet(), genesis(), 1000, 1000).unwrap();
        assert_eq!(reopened.best_number(), 0);
        assert_eq!(reopened.best_hash(), genesis().hash());
    }

    #[test]
    fn an_unrelated_block_is_enqueued_rather_than_imported() {
        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryKVStore::new());
        let mut ledger = Ledger::new(store, BlockchainConfig::etc_mainnet(), genesis(), 1000, 1000).unwrap();
        let orphan = block(5, [0xffu8; 32], 100, [0u8; 32]);
        assert!(matches!(ledger.import_block(orphan), ImportOutcome::Enqueued));
    }
}
