//! Capability interfaces the interpreter calls into the world-state proxy
//! through, per SPEC_FULL.md §9's "polymorphism over EVM world-state and
//! storage" redesign note: `StateAccess` covers accounts/code/storage/value
//! transfer, `AccessList` covers per-transaction EIP-2929 cold/warm tracking.
//! `ledger`'s `WorldStateProxy` is the production implementation; tests in
//! this crate use a plain in-memory stand-in.

use shared_types::{Account, Address, Hash, U256};

/// Whatever the interpreter needs from the account/code/storage/environment
/// surface of the world-state proxy. Mirrors `qc-11-smart-contracts`'s
/// `ports::outbound::StateAccess`, generalised from its PoS-era environment
/// fields (`validator_set`, `epoch`) to SPEC_FULL.md §4.3's ETC account model.
pub trait StateAccess {
    /// Opaque marker for `checkpoint`/`revert_to_checkpoint`, letting a call
    /// frame that errors out undo exactly its own overlay writes (SPEC_FULL.md
    /// §4.5: "revert everything except the nonce bump and the gas payment").
    type Checkpoint: Copy;

    /// Snapshot the current overlay depth.
    fn checkpoint(&mut self) -> Self::Checkpoint;
    /// Discard every write made since `checkpoint`.
    fn revert_to_checkpoint(&mut self, checkpoint: Self::Checkpoint);

    fn get_account(&self, address: &Address) -> Option<Account>;
    fn save_account(&mut self, address: Address, account: Account);
    fn delete_account(&mut self, address: &Address);

    fn get_code(&self, code_hash: &Hash) -> Vec<u8>;
    fn save_code(&mut self, code: &[u8]) -> Hash;

    fn get_storage(&self, address: &Address, key: &U256) -> U256;
    fn save_storage(&mut self, address: Address, key: U256, value: U256);

    /// `None` unless `number` is one of the last 256 blocks below the one
    /// currently executing, per the `BLOCKHASH` opcode's validity window.
    fn get_block_hash(&self, number: u64) -> Option<Hash>;

    fn transfer(&mut self, from: &Address, to: &Address, value: U256) -> Result<(), TransferError>;

    /// Derives the next contract address for `creator` and bumps its nonce.
    fn create_address(&mut self, creator: &Address) -> Address;

    fn new_empty_account(&mut self, address: Address);

    /// Marks `address` for deletion at the end of the enclosing transaction
    /// (`SELFDESTRUCT`), per SPEC_FULL.md §4.5's self-destruct set.
    fn schedule_self_destruct(&mut self, address: Address, beneficiary: Address);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferError;

/// Whether an access-list slot was already touched this transaction
/// (EIP-2929 cold/warm distinction).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessStatus {
    Cold,
    Warm,
}

/// Per-transaction access-list tracking for `BALANCE`/`SLOAD`/`EXTCODE*`/
/// `CALL`-family gas metering.
pub trait AccessList {
    /// Marks `address` as touched, returning whether it was cold before.
    fn access_address(&mut self, address: Address) -> AccessStatus;

    /// Marks `(address, key)` as touched, returning whether it was cold before.
    fn access_storage_slot(&mut self, address: Address, key: U256) -> AccessStatus;
}

/// A minimal in-memory `AccessList`, the natural default for a fresh
/// transaction frame and for tests.
#[derive(Debug, Default)]
pub struct InMemoryAccessList {
    addresses: std::collections::HashSet<Address>,
    storage_slots: std::collections::HashSet<(Address, U256)>,
}

impl InMemoryAccessList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl AccessList for InMemoryAccessList {
    fn access_address(&mut self, address: Address) -> AccessStatus {
        if self.addresses.insert(address) {
            AccessStatus::Cold
        } else {
            AccessStatus::Warm
        }
    }

    fn access_storage_slot(&mut self, address: Address, key: U256) -> AccessStatus {
        if self.storage_slots.insert((address, key)) {
            AccessStatus::Cold
        } else {
            AccessStatus::Warm
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_touch_is_cold_subsequent_touches_are_warm() {
        let mut list = InMemoryAccessList::new();
        let addr = [1u8; 20];
        assert_eq!(list.access_address(addr), AccessStatus::Cold);
        assert_eq!(list.access_address(addr), AccessStatus::Warm);
    }

    #[test]
    fn storage_slots_are_tracked_per_address() {
        let mut list = InMemoryAccessList::new();
        let addr = [1u8; 20];
        assert_eq!(list.access_storage_slot(addr, U256::zero()), AccessStatus::Cold);
        assert_eq!(list.access_storage_slot(addr, U256::one()), AccessStatus::Cold);
        assert_eq!(list.access_storage_slot(addr, U256::zero()), AccessStatus::Warm);
    }
}
