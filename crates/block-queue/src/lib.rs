//! The pending-block graph that sits between the sync engine and the ledger:
//! headers whose parent is not (yet) the canonical chain tip, keyed by hash,
//! with total-difficulty propagation down the tree as ancestors resolve.
//!
//! Grounded on `qc-08-consensus/src/domain/fork_choice.rs`'s `LMDGhostStore`:
//! the same dual-hash-map graph shape (`blocks`, `children`) and cache
//! invalidation discipline, but the per-validator stake-weighted GHOST vote
//! tally is replaced by plain total-difficulty accumulation, and the
//! recursive heaviest-child walk at query time is replaced by tracking the
//! maximum-td leaf directly as blocks are inserted.

use shared_types::{BlockHeader, Hash, U256};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    TooFarAhead,
    TooFarBehind,
    Duplicate,
}

/// Outcome of inserting a header into the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Rejected(RejectReason),
    /// Accepted, but the parent's total difficulty is not yet known — the
    /// block sits in the queue until an ancestor resolves it.
    Enqueued,
    /// Accepted, and total difficulty was propagated to at least one leaf;
    /// `best_leaf`/`best_td` are the maximum-td leaf found during that walk,
    /// a candidate for a canonical-chain switch.
    TdUpdated { best_leaf: Hash, best_td: U256 },
}

/// Bounded pending-block graph. See the component design notes for the
/// ahead/behind eviction window and td-propagation rule.
pub struct BlockQueue {
    blocks: HashMap<Hash, BlockHeader>,
    total_difficulty: HashMap<Hash, U256>,
    children: HashMap<Hash, Vec<Hash>>,
    best_number: u64,
    ahead: u64,
    behind: u64,
}

impl BlockQueue {
    #[must_use]
    pub fn new(ahead: u64, behind: u64) -> Self {
        Self {
            blocks: HashMap::new(),
            total_difficulty: HashMap::new(),
            children: HashMap::new(),
            best_number: 0,
            ahead,
            behind,
        }
    }

    /// Updates the local notion of "best block number", used to judge which
    /// queued entries are stale. Called by the sync controller whenever the
    /// canonical chain advances.
    pub fn set_best_number(&mut self, number: u64) {
        self.best_number = number;
        self.evict_stale();
    }

    #[must_use]
    pub fn contains(&self, hash: &Hash) -> bool {
        self.blocks.contains_key(hash)
    }

    #[must_use]
    pub fn get(&self, hash: &Hash) -> Option<&BlockHeader> {
        self.blocks.get(hash)
    }

    #[must_use]
    pub fn total_difficulty_of(&self, hash: &Hash) -> Option<U256> {
        self.total_difficulty.get(hash).copied()
    }

    /// Registers a block's total difficulty without going through `insert`,
    /// for the canonical-chain tip the queue is anchored to (it is not itself
    /// "queued", but its td must be visible so its queued children can
    /// resolve against it).
    pub fn seed_known_block(&mut self, hash: Hash, total_difficulty: U256) {
        self.total_difficulty.insert(hash, total_difficulty);
    }

    /// Inserts a header. If the header's parent total difficulty is already
    /// known (either seeded or itself present in the queue), propagates td
    /// down through every already-queued descendant and reports the
    /// maximum-td leaf found.
    pub fn insert(&mut self, header: BlockHeader) -> InsertOutcome {
        let hash = header.hash();

        if header.number > self.best_number + self.ahead {
            return InsertOutcome::Rejected(RejectReason::TooFarAhead);
        }
        if header.number + self.behind < self.best_number {
            return InsertOutcome::Rejected(RejectReason::TooFarBehind);
        }
        if self.blocks.contains_key(&hash) {
            return InsertOutcome::Rejected(RejectReason::Duplicate);
        }

        let parent_hash = header.parent_hash;
        let difficulty = header.difficulty;
        self.children.entry(parent_hash).or_default().push(hash);
        self.blocks.insert(hash, header);
        self.evict_stale();

        if !self.blocks.contains_key(&hash) {
            // Evicted immediately as stale (e.g. the window moved under it
            // while we were building the insert).
            return InsertOutcome::Enqueued;
        }

        let Some(parent_td) = self.total_difficulty.get(&parent_hash).copied() else {
            return InsertOutcome::Enqueued;
        };
        let own_td = parent_td + difficulty;
        self.total_difficulty.insert(hash, own_td);

        let (best_leaf, best_td) = self.propagate_from(hash);
        InsertOutcome::TdUpdated { best_leaf, best_td }
    }

    /// BFS down from `root` (whose own td is already recorded), computing
    /// td for every descendant and returning the maximum-td leaf.
    fn propagate_from(&mut self, root: Hash) -> (Hash, U256) {
        let mut best = (root, self.total_difficulty[&root]);
        let mut frontier = vec![root];

        while let Some(current) = frontier.pop() {
            let current_td = self.total_difficulty[&current];
            let children = self.children.get(&current).cloned().unwrap_or_default();
            if children.is_empty() {
                if current_td > best.1 {
                    best = (current, current_td);
                }
                continue;
            }
            for child in children {
                let Some(header) = self.blocks.get(&child) else {
                    continue;
                };
                let child_td = current_td + header.difficulty;
                self.total_difficulty.insert(child, child_td);
                frontier.push(child);
            }
        }

        best
    }

    /// Evicts every queued header outside the `[best - behind, best + ahead]`
    /// window, and any block-queue bookkeeping that referenced it.
    fn evict_stale(&mut self) {
        let min_number = self.best_number.saturating_sub(self.behind);
        let max_number = self.best_number + self.ahead;
        let stale: Vec<Hash> = self
            .blocks
            .iter()
            .filter(|(_, header)| header.number < min_number || header.number > max_number)
            .map(|(hash, _)| *hash)
            .collect();
        for hash in stale {
            self.remove_single(hash);
        }
    }

    fn remove_single(&mut self, hash: Hash) {
        if let Some(header) = self.blocks.remove(&hash) {
            if let Some(siblings) = self.children.get_mut(&header.parent_hash) {
                siblings.retain(|h| *h != hash);
                if siblings.is_empty() {
                    self.children.remove(&header.parent_hash);
                }
            }
        }
        self.total_difficulty.remove(&hash);
        self.children.remove(&hash);
    }

    /// Returns the root-to-leaf chain ending at `leaf`. The root is the
    /// earliest ancestor still present in the queue (its parent is either
    /// outside the queue or the canonical tip). If `dequeue`, every header on
    /// the path that has no child outside this path is removed from the
    /// queue — i.e. entries private to this branch.
    pub fn get_branch(&mut self, leaf: Hash, dequeue: bool) -> Option<Vec<BlockHeader>> {
        let mut chain = Vec::new();
        let mut current = leaf;
        loop {
            let header = self.blocks.get(&current)?.clone();
            let parent = header.parent_hash;
            chain.push(header);
            if !self.blocks.contains_key(&parent) {
                break;
            }
            current = parent;
        }
        chain.reverse();

        if dequeue {
            for header in &chain {
                let hash = header.hash();
                let exclusively_on_path = self
                    .children
                    .get(&hash)
                    .map(|kids| kids.iter().all(|k| chain_contains(&chain, k)))
                    .unwrap_or(true);
                if exclusively_on_path {
                    self.remove_single(hash);
                }
            }
        }

        Some(chain)
    }

    /// Deletes `ancestor` and every block transitively rooted at it, used
    /// when a queued ancestor turns out to fail validation or execution.
    pub fn remove_subtree(&mut self, ancestor: Hash) {
        let mut stack = vec![ancestor];
        let mut to_remove = HashSet::new();
        while let Some(hash) = stack.pop() {
            if !to_remove.insert(hash) {
                continue;
            }
            if let Some(kids) = self.children.get(&hash) {
                stack.extend(kids.iter().copied());
            }
        }
        for hash in to_remove {
            self.remove_single(hash);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

fn chain_contains(chain: &[BlockHeader], hash: &Hash) -> bool {
    chain.iter().any(|h| h.hash() == *hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(number: u64, parent: Hash, difficulty: u64, salt: u8) -> BlockHeader {
        BlockHeader {
            parent_hash: parent,
            ommers_hash: [0u8; 32],
            beneficiary: [0u8; 20],
            state_root: [0u8; 32],
            transactions_root: [0u8; 32],
            receipts_root: [0u8; 32],
            logs_bloom: [0u8; 256],
            difficulty: U256::from(difficulty),
            number,
            gas_limit: 8_000_000,
            gas_used: 0,
            timestamp: 1000 + number,
            extra_data: vec![salt],
            mix_hash: [0u8; 32],
            nonce: [0u8; 8],
        }
    }

    #[test]
    fn td_propagates_once_parent_is_known() {
        let mut queue = BlockQueue::new(1000, 1000);
        let genesis_hash = [0u8; 32];
        queue.seed_known_block(genesis_hash, U256::from(100));

        let h1 = header(1, genesis_hash, 10, 1);
        let h1_hash = h1.hash();
        let outcome = queue.insert(h1);
        assert_eq!(
            outcome,
            InsertOutcome::TdUpdated { best_leaf: h1_hash, best_td: U256::from(110) }
        );
    }

    #[test]
    fn out_of_order_insert_enqueues_until_parent_resolves() {
        let mut queue = BlockQueue::new(1000, 1000);
        let genesis_hash = [0u8; 32];

        let h1 = header(1, genesis_hash, 10, 1);
        let h1_hash = h1.hash();
        let h2 = header(2, h1_hash, 20, 2);
        let h2_hash = h2.hash();

        assert_eq!(queue.insert(h2), InsertOutcome::Enqueued);

        queue.seed_known_block(genesis_hash, U256::from(100));
        let outcome = queue.insert(h1);
        assert_eq!(
            outcome,
            InsertOutcome::TdUpdated { best_leaf: h2_hash, best_td: U256::from(130) }
        );
    }

    #[test]
    fn too_far_ahead_or_behind_is_rejected() {
        let mut queue = BlockQueue::new(5, 5);
        queue.set_best_number(100);
        assert_eq!(
            queue.insert(header(200, [9u8; 32], 1, 0)),
            InsertOutcome::Rejected(RejectReason::TooFarAhead)
        );
        assert_eq!(
            queue.insert(header(10, [9u8; 32], 1, 0)),
            InsertOutcome::Rejected(RejectReason::TooFarBehind)
        );
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let mut queue = BlockQueue::new(1000, 1000);
        let h1 = header(1, [0u8; 32], 10, 1);
        queue.insert(h1.clone());
        assert_eq!(queue.insert(h1), InsertOutcome::Rejected(RejectReason::Duplicate));
    }

    #[test]
    fn get_branch_returns_root_to_leaf_chain() {
        let mut queue = BlockQueue::new(1000, 1000);
        let genesis_hash = [0u8; 32];
        queue.seed_known_block(genesis_hash, U256::zero());

        let h1 = header(1, genesis_hash, 10, 1);
        let h1_hash = h1.hash();
        let h2 = header(2, h1_hash, 10, 2);
        let h2_hash = h2.hash();
        queue.insert(h1);
        queue.insert(h2);

        let branch = queue.get_branch(h2_hash, false).unwrap();
        assert_eq!(branch.len(), 2);
        assert_eq!(branch[0].number, 1);
        assert_eq!(branch[1].number, 2);
    }

    #[test]
    fn get_branch_with_dequeue_removes_private_entries() {
        let mut queue = BlockQueue::new(1000, 1000);
        let genesis_hash = [0u8; 32];
        queue.seed_known_block(genesis_hash, U256::zero());

        let h1 = header(1, genesis_hash, 10, 1);
        let h1_hash = h1.hash();
        queue.insert(h1);

        let branch = queue.get_branch(h1_hash, true).unwrap();
        assert_eq!(branch.len(), 1);
        assert!(!queue.contains(&h1_hash));
    }

    #[test]
    fn remove_subtree_deletes_ancestor_and_descendants() {
        let mut queue = BlockQueue::new(1000, 1000);
        let genesis_hash = [0u8; 32];
        let h1 = header(1, genesis_hash, 10, 1);
        let h1_hash = h1.hash();
        let h2 = header(2, h1_hash, 10, 2);
        let h2_hash = h2.hash();
        queue.insert(h1);
        queue.insert(h2);

        queue.remove_subtree(h1_hash);
        assert!(!queue.contains(&h1_hash));
        assert!(!queue.contains(&h2_hash));
    }
}
