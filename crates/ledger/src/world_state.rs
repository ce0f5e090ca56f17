//! The world-state proxy: an in-memory overlay of dirty accounts, code, and
//! per-account storage sitting in front of the persistent account trie, per
//! SPEC_FULL.md §4.3.
//!
//! Grounded on `qc-11-smart-contracts/src/adapters/state_adapter.rs`'s
//! `InMemoryState` (overlay-of-maps shape, default-zero storage reads,
//! default-empty code reads) generalised from a flat test double into a
//! real trie-backed proxy with checkpoint/revert and content-addressed
//! code storage. The teacher's adapter is `async` throughout (it was built
//! to cross an IPC boundary to a separate state subsystem); this proxy
//! calls `state_trie::Trie` directly in the same process, so it is plain
//! synchronous code, consistent with `evm::StateAccess` being a synchronous
//! trait.

use crate::errors::LedgerError;
use evm::state::{StateAccess, TransferError};
use kv_store::{KeyValueStore, Namespace};
use shared_types::rlp::Item;
use shared_types::{keccak256, rlp, Account, Address, Hash, EMPTY_CODE_HASH, EMPTY_TRIE_ROOT, U256};
use state_trie::Trie;
use std::collections::HashMap;
use std::sync::Arc;

/// One entry in the undo log backing `checkpoint`/`revert_to_checkpoint`.
/// Each records exactly enough to put the overlay back the way it was;
/// `None` for "previous" means the key was absent from the overlay before
/// this write, so reverting removes it again (falling through to the trie).
enum UndoEntry {
    Account {
        address: Address,
        previous: Option<Option<Account>>,
    },
    Storage {
        address: Address,
        key: U256,
        previous: Option<U256>,
    },
    StorageCleared {
        address: Address,
        previous: HashMap<U256, U256>,
    },
    SelfDestruct,
}

/// Overlay-based world state for one block's execution, rooted at a given
/// account trie and backed by `store` for trie nodes, code, and the
/// block-number-to-hash mapping `BLOCKHASH` needs.
pub struct WorldStateProxy {
    store: Arc<dyn KeyValueStore>,
    trie: Trie,
    current_number: u64,
    account_start_nonce: u64,
    accounts: HashMap<Address, Option<Account>>,
    storage: HashMap<Address, HashMap<U256, U256>>,
    code_overlay: HashMap<Hash, Vec<u8>>,
    self_destructs: Vec<(Address, Address)>,
    undo_log: Vec<UndoEntry>,
}

impl WorldStateProxy {
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, state_root: Hash, current_number: u64) -> Self {
        Self {
            trie: Trie::at_root(store.clone(), state_root),
            store,
            current_number,
            account_start_nonce: 0,
            accounts: HashMap::new(),
            storage: HashMap::new(),
            code_overlay: HashMap::new(),
            self_destructs: Vec::new(),
            undo_log: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_account_start_nonce(mut self, nonce: u64) -> Self {
        self.account_start_nonce = nonce;
        self
    }

    #[must_use]
    pub fn root_hash(&self) -> Hash {
        self.trie.root_hash()
    }

    /// Drain the accounts `SELFDESTRUCT` scheduled for deletion during the
    /// transaction just executed, for the ledger to actually delete once the
    /// transaction's frame has fully committed.
    pub fn take_self_destructs(&mut self) -> Vec<(Address, Address)> {
        std::mem::take(&mut self.self_destructs)
    }

    fn raw_account(&self, address: &Address) -> Result<Option<Account>, LedgerError> {
        match self.trie.get(address)? {
            Some(bytes) => Ok(Some(Account::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn account_overlay_or_trie(&self, address: &Address) -> Option<Account> {
        match self.accounts.get(address) {
            Some(overlay) => overlay.clone(),
            None => self.raw_account(address).ok().flatten(),
        }
    }

    fn set_account_overlay(&mut self, address: Address, value: Option<Account>) {
        let previous = self.accounts.insert(address, value);
        self.undo_log.push(UndoEntry::Account { address, previous });
    }

    /// Apply all dirty per-account storage into each account's storage
    /// sub-trie, folding the new storage root into the account overlay, then
    /// apply the account overlay into the main trie. Returns the new root.
    pub fn persist_state(&mut self) -> Result<Hash, LedgerError> {
        let touched: Vec<Address> = self.storage.keys().copied().collect();
        for address in touched {
            let slots = self.storage.remove(&address).unwrap_or_default();
            let mut account = self
                .account_overlay_or_trie(&address)
                .unwrap_or_else(|| Account::empty().with_nonce(self.account_start_nonce));
            let mut storage_trie = Trie::at_root(self.store.clone(), account.storage_root);
            for (key, value) in slots {
                let key_bytes = u256_to_bytes(key);
                if value.is_zero() {
                    storage_trie.delete(&key_bytes)?;
                } else {
                    storage_trie.put(&key_bytes, rlp::encode(&Item::u256(value)))?;
                }
            }
            account.storage_root = storage_trie.root_hash();
            self.accounts.insert(address, Some(account));
        }

        let dirty: Vec<Address> = self.accounts.keys().copied().collect();
        for address in dirty {
            match self.accounts.remove(&address).flatten() {
                Some(account) => {
                    self.trie.put(&address, account.encode())?;
                }
                None => {
                    self.trie.delete(&address)?;
                }
            }
        }

        for (hash, code) in self.code_overlay.drain() {
            self.store.put(Namespace::EvmCode, &hash, &code)?;
        }

        self.undo_log.clear();
        Ok(self.trie.root_hash())
    }

    /// Commit only if the resulting root matches `expected` (a block's
    /// declared `state_root`); trie-node writes are content-addressed and
    /// harmless to leave behind either way, so a mismatch need not be undone,
    /// only reported.
    pub fn persist_if_hash_matches(&mut self, expected: Hash) -> Result<Hash, LedgerError> {
        let actual = self.persist_state()?;
        if actual != expected {
            return Err(LedgerError::StateRootMismatch { expected, actual });
        }
        Ok(actual)
    }
}

fn u256_to_bytes(value: U256) -> [u8; 32] {
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    buf
}

/// `kec256(RLP([creator, nonce]))[12..]`, per SPEC_FULL.md §4.3. Shared by
/// `StateAccess::create_address` (which also bumps the creator's nonce, for
/// nested `CREATE`s executed from inside the EVM) and top-level
/// contract-creation transactions, which derive the address from the
/// sender's nonce as it stood when the transaction was submitted, before
/// that nonce's own per-transaction increment.
#[must_use]
pub fn derive_contract_address(creator: &Address, nonce: u64) -> Address {
    let item = Item::list(vec![Item::bytes(creator.to_vec()), Item::uint(nonce)]);
    let hash = keccak256(&rlp::encode(&item));
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    address
}

trait AccountExt {
    fn with_nonce(self, nonce: u64) -> Self;
}

impl AccountExt for Account {
    fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = nonce;
        self
    }
}

impl StateAccess for WorldStateProxy {
    type Checkpoint = usize;

    fn checkpoint(&mut self) -> Self::Checkpoint {
        self.undo_log.len()
    }

    fn revert_to_checkpoint(&mut self, checkpoint: Self::Checkpoint) {
        while self.undo_log.len() > checkpoint {
            match self.undo_log.pop().expect("checked by loop condition") {
                UndoEntry::Account { address, previous } => match previous {
                    Some(value) => {
                        self.accounts.insert(address, value);
                    }
                    None => {
                        self.accounts.remove(&address);
                    }
                },
                UndoEntry::Storage { address, key, previous } => {
                    let slots = self.storage.entry(address).or_default();
                    match previous {
                        Some(value) => {
                            slots.insert(key, value);
                        }
                        None => {
                            slots.remove(&key);
                        }
                    }
                }
                UndoEntry::StorageCleared { address, previous } => {
                    if previous.is_empty() {
                        self.storage.remove(&address);
                    } else {
                        self.storage.insert(address, previous);
                    }
                }
                UndoEntry::SelfDestruct => {
                    self.self_destructs.pop();
                }
            }
        }
    }

    fn get_account(&self, address: &Address) -> Option<Account> {
        self.account_overlay_or_trie(address)
    }

    fn save_account(&mut self, address: Address, account: Account) {
        self.set_account_overlay(address, Some(account));
    }

    fn delete_account(&mut self, address: &Address) {
        self.set_account_overlay(*address, None);
        if let Some(previous) = self.storage.remove(address) {
            self.undo_log.push(UndoEntry::StorageCleared {
                address: *address,
                previous,
            });
        }
    }

    fn get_code(&self, code_hash: &Hash) -> Vec<u8> {
        if *code_hash == EMPTY_CODE_HASH {
            return Vec::new();
        }
        if let Some(code) = self.code_overlay.get(code_hash) {
            return code.clone();
        }
        self.store
            .get(Namespace::EvmCode, code_hash)
            .ok()
            .flatten()
            .unwrap_or_default()
    }

    fn save_code(&mut self, code: &[u8]) -> Hash {
        let hash = keccak256(code);
        if hash != EMPTY_CODE_HASH {
            self.code_overlay.insert(hash, code.to_vec());
        }
        hash
    }

    fn get_storage(&self, address: &Address, key: &U256) -> U256 {
        if let Some(slots) = self.storage.get(address) {
            if let Some(value) = slots.get(key) {
                return *value;
            }
        }
        let Some(account) = self.account_overlay_or_trie(address) else {
            return U256::zero();
        };
        let storage_trie = Trie::at_root(self.store.clone(), account.storage_root);
        let key_bytes = u256_to_bytes(*key);
        match storage_trie.get(&key_bytes) {
            Ok(Some(bytes)) => rlp::decode(&bytes)
                .ok()
                .and_then(|item| item.as_u256().ok())
                .unwrap_or_default(),
            _ => U256::zero(),
        }
    }

    fn save_storage(&mut self, address: Address, key: U256, value: U256) {
        let slots = self.storage.entry(address).or_default();
        let previous = slots.insert(key, value);
        self.undo_log.push(UndoEntry::Storage {
            address,
            key,
            previous,
        });
    }

    fn get_block_hash(&self, number: u64) -> Option<Hash> {
        if self.current_number == 0 || number >= self.current_number {
            return None;
        }
        if self.current_number - number > 256 {
            return None;
        }
        let bytes = self
            .store
            .get(Namespace::BlockNumberMapping, &number.to_be_bytes())
            .ok()
            .flatten()?;
        if bytes.len() != 32 {
            return None;
        }
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&bytes);
        Some(hash)
    }

    fn transfer(&mut self, from: &Address, to: &Address, value: U256) -> Result<(), TransferError> {
        if value.is_zero() {
            // Touching `to` with a zero-value transfer still materialises an
            // empty account, per the yellow paper's definition of "touched".
            if self.account_overlay_or_trie(to).is_none() {
                self.new_empty_account(*to);
            }
            return Ok(());
        }
        let mut sender = self.account_overlay_or_trie(from).unwrap_or_default_account(self.account_start_nonce);
        if sender.balance < value {
            return Err(TransferError);
        }
        sender.balance = sender.balance.overflowing_sub(value).0;
        self.save_account(*from, sender);

        let mut recipient = self
            .account_overlay_or_trie(to)
            .unwrap_or_default_account(self.account_start_nonce);
        recipient.balance = recipient.balance.overflowing_add(value).0;
        self.save_account(*to, recipient);
        Ok(())
    }

    fn create_address(&mut self, creator: &Address) -> Address {
        let mut account = self
            .account_overlay_or_trie(creator)
            .unwrap_or_default_account(self.account_start_nonce);
        let nonce_before = account.nonce;
        account.nonce += 1;
        self.save_account(*creator, account);
        derive_contract_address(creator, nonce_before)
    }

    fn new_empty_account(&mut self, address: Address) {
        let balance = self
            .account_overlay_or_trie(&address)
            .map(|a| a.balance)
            .unwrap_or_default();
        let mut account = Account::empty();
        account.balance = balance;
        account.nonce = self.account_start_nonce;
        self.set_account_overlay(address, Some(account));
        if let Some(previous) = self.storage.remove(&address) {
            self.undo_log.push(UndoEntry::StorageCleared { address, previous });
        }
    }

    fn schedule_self_destruct(&mut self, address: Address, beneficiary: Address) {
        self.self_destructs.push((address, beneficiary));
        self.undo_log.push(UndoEntry::SelfDestruct);
    }
}

trait OptionAccountExt {
    fn unwrap_or_default_account(self, start_nonce: u64) -> Account;
}

impl OptionAccountExt for Option<Account> {
    fn unwrap_or_default_account(self, start_nonce: u64) -> Account {
        self.unwrap_or_else(|| {
            let mut account = Account::empty();
            account.nonce = start_nonce;
            account
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kv_store::InMemoryKVStore;

    fn proxy() -> WorldStateProxy {
        WorldStateProxy::new(Arc::new(InMemoryKVStore::new()), EMPTY_TRIE_ROOT, 10)
    }

    #[test]
    fn unknown_account_reads_as_none() {
        let state = proxy();
        assert!(state.get_account(&[1u8; 20]).is_none());
    }

    #[test]
    fn save_then_persist_then_reopen_round_trips() {
        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryKVStore::new());
        let mut state = WorldStateProxy::new(store.clone(), EMPTY_TRIE_ROOT, 1);
        let address = [7u8; 20];
        state.save_account(address, Account {
            nonce: 3,
            balance: U256::from(500u64),
            storage_root: EMPTY_TRIE_ROOT,
            code_hash: EMPTY_CODE_HASH,
        });
        let root = state.persist_state().unwrap();

        let reopened = WorldStateProxy::new(store, root, 2);
        let account = reopened.get_account(&address).unwrap();
        assert_eq!(account.nonce, 3);
        assert_eq!(account.balance, U256::from(500u64));
    }

    #[test]
    fn storage_write_then_read_back_before_persist() {
        let mut state = proxy();
        let address = [2u8; 20];
        state.save_storage(address, U256::from(1u64), U256::from(42u64));
        assert_eq!(state.get_storage(&address, &U256::from(1u64)), U256::from(42u64));
        assert_eq!(state.get_storage(&address, &U256::from(2u64)), U256::zero());
    }

    #[test]
    fn storage_survives_persist_and_reload() {
        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryKVStore::new());
        let mut state = WorldStateProxy::new(store.clone(), EMPTY_TRIE_ROOT, 1);
        let address = [3u8; 20];
        state.save_account(address, Account::empty());
        state.save_storage(address, U256::from(9u64), U256::from(99u64));
        let root = state.persist_state().unwrap();

        let reopened = WorldStateProxy::new(store, root, 2);
        assert_eq!(reopened.get_storage(&address, &U256::from(9u64)), U256::from(99u64));
    }

    #[test]
    fn checkpoint_and_revert_undoes_account_and_storage_writes() {
        let mut state = proxy();
        let address = [4u8; 20];
        state.save_account(address, Account { nonce: 1, ..Account::empty() });
        let checkpoint = state.checkpoint();
        state.save_account(address, Account { nonce: 2, ..Account::empty() });
        state.save_storage(address, U256::zero(), U256::from(5u64));
        state.revert_to_checkpoint(checkpoint);

        assert_eq!(state.get_account(&address).unwrap().nonce, 1);
        assert_eq!(state.get_storage(&address, &U256::zero()), U256::zero());
    }

    #[test]
    fn transfer_moves_balance_between_accounts() {
        let mut state = proxy();
        let from = [5u8; 20];
        let to = [6u8; 20];
        state.save_account(from, Account { balance: U256::from(100u64), ..Account::empty() });
        state.transfer(&from, &to, U256::from(40u64)).unwrap();
        assert_eq!(state.get_account(&from).unwrap().balance, U256::from(60u64));
        assert_eq!(state.get_account(&to).unwrap().balance, U256::from(40u64));
    }

    #[test]
    fn transfer_rejects_insufficient_balance() {
        let mut state = proxy();
        let from = [5u8; 20];
        let to = [6u8; 20];
        let result = state.transfer(&from, &to, U256::from(1u64));
        assert!(result.is_err());
    }

    #[test]
    fn create_address_increments_creator_nonce_and_is_deterministic() {
        let mut state = proxy();
        let creator = [8u8; 20];
        let first = state.create_address(&creator);
        let second = state.create_address(&creator);
        assert_ne!(first, second);
        assert_eq!(state.get_account(&creator).unwrap().nonce, 2);
    }

    #[test]
    fn new_empty_account_clears_storage_but_keeps_balance() {
        let mut state = proxy();
        let address = [9u8; 20];
        state.save_account(address, Account { balance: U256::from(77u64), nonce: 4, ..Account::empty() });
        state.save_storage(address, U256::zero(), U256::from(1u64));
        state.new_empty_account(address);

        let account = state.get_account(&address).unwrap();
        assert_eq!(account.balance, U256::from(77u64));
        assert_eq!(account.nonce, 0);
        assert_eq!(state.get_storage(&address, &U256::zero()), U256::zero());
    }

    #[test]
    fn block_hash_is_none_outside_the_256_block_window() {
        let state = WorldStateProxy::new(Arc::new(InMemoryKVStore::new()), EMPTY_TRIE_ROOT, 500);
        assert!(state.get_block_hash(500).is_none()); // current block itself
        assert!(state.get_block_hash(200).is_none()); // 300 blocks back
    }

    #[test]
    fn self_destructs_are_drained_once() {
        let mut state = proxy();
        state.schedule_self_destruct([1u8; 20], [2u8; 20]);
        let drained = state.take_self_destructs();
        assert_eq!(drained, vec![([1u8; 20], [2u8; 20])]);
        assert!(state.take_self_destructs().is_empty());
    }
}
