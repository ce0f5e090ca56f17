//! Block reward and DAO-fork balance drain, applied after a block's
//! transactions have all executed (SPEC_FULL.md §4.5 step 5).

use crate::config::{BlockchainConfig, MonetaryPolicy};
use crate::world_state::WorldStateProxy;
use evm::state::StateAccess;
use shared_types::{Account, BlockHeader, U256};

/// Credits the beneficiary `era_base + era_base * ommer_count / 32` and each
/// listed ommer's own miner `era_base * (8 - distance) / 8`, where `distance`
/// is how many blocks behind the importing block the ommer sits.
pub fn apply_block_reward(state: &mut WorldStateProxy, header: &BlockHeader, ommers: &[BlockHeader], policy: &MonetaryPolicy) {
    let era_base = policy.block_reward_at(header.number);
    let ommer_count = U256::from(ommers.len() as u64);
    let beneficiary_reward = era_base + era_base * ommer_count / U256::from(32u64);
    credit(state, &header.beneficiary, beneficiary_reward);

    for ommer in ommers {
        let distance = header.number.saturating_sub(ommer.number);
        let factor = 8u64.saturating_sub(distance);
        let ommer_reward = era_base * U256::from(factor) / U256::from(8u64);
        credit(state, &ommer.beneficiary, ommer_reward);
    }
}

/// If `block_number` is this chain's configured DAO-fork height, move every
/// drain-list account's entire balance into the refund contract.
pub fn apply_dao_fork_drain(state: &mut WorldStateProxy, config: &BlockchainConfig, block_number: u64) {
    if config.dao_fork_block_number != Some(block_number) {
        return;
    }
    let mut drained = U256::zero();
    for address in &config.dao_fork_drain_list {
        let Some(mut account) = state.get_account(address) else {
            continue;
        };
        drained = drained + account.balance;
        account.balance = U256::zero();
        state.save_account(*address, account);
    }
    if drained.is_zero() {
        return;
    }
    let mut refund_account = state
        .get_account(&config.dao_fork_refund_contract)
        .unwrap_or_else(Account::empty);
    refund_account.balance = refund_account.balance + drained;
    state.save_account(config.dao_fork_refund_contract, refund_account);
}

fn credit(state: &mut WorldStateProxy, address: &shared_types::Address, amount: U256) {
    let mut account = state.get_account(address).unwrap_or_else(Account::empty);
    account.balance = account.balance + amount;
    state.save_account(*address, account);
}

#[cfg(test)]
mod tests {
    use super::*;
    use kv_store::InMemoryKVStore;
    use shared_types::EMPTY_TRIE_ROOT;
    use std::sync::Arc;

    fn state() -> WorldStateProxy {
        WorldStateProxy::new(Arc::new(InMemoryKVStore::new()), EMPTY_TRIE_ROOT, 10)
    }

    fn header(number: u64, beneficiary: shared_types::Address) -> BlockHeader {
        BlockHeader {
            parent_hash: [0u8; 32],
            ommers_hash: [0u8; 32],
            beneficiary,
            state_root: [0u8; 32],
            transactions_root: [0u8; 32],
            receipts_root: [0u8; 32],
            logs_bloom: [0u8; 256],
            difficulty: U256::from(1u64),
            number,
            gas_limit: 8_000_000,
            gas_used: 0,
            timestamp: 0,
            extra_data: vec![],
            mix_hash: [0u8; 32],
            nonce: [0u8; 8],
        }
    }

    #[test]
    fn reward_with_two_ommers_five_blocks_behind() {
        let mut state = state();
        let policy = MonetaryPolicy {
            era_duration: u64::MAX,
            reward_reduction_numerator: 4,
            reward_reduction_denominator: 5,
            first_era_block_reward: U256::from(5_000_000_000_000_000_000u64),
        };
        let beneficiary = [1u8; 20];
        let first_ommer_miner = [2u8; 20];
        let second_ommer_miner = [3u8; 20];
        let block = header(10, beneficiary);
        let ommers = [header(5, first_ommer_miner), header(5, second_ommer_miner)];

        apply_block_reward(&mut state, &block, &ommers, &policy);

        let beneficiary_balance = state.get_account(&beneficiary).unwrap().balance;
        assert_eq!(beneficiary_balance, U256::from(5_312_500_000_000_000_000u64));

        for miner in [first_ommer_miner, second_ommer_miner] {
            let ommer_balance = state.get_account(&miner).unwrap().balance;
            assert_eq!(ommer_balance, U256::from(1_875_000_000_000_000_000u64));
        }
    }

    #[test]
    fn dao_fork_drain_moves_balance_to_refund_contract() {
        let mut state = state();
        let drained_account = [3u8; 20];
        let refund_contract = [4u8; 20];
        state.save_account(drained_account, Account { balance: U256::from(1_000u64), ..Account::empty() });

        let config = BlockchainConfig::etc_mainnet().with_test_dao_fork(
            1_920_000,
            refund_contract,
            vec![drained_account],
        );
        apply_dao_fork_drain(&mut state, &config, 1_920_000);

        assert_eq!(state.get_account(&drained_account).unwrap().balance, U256::zero());
        assert_eq!(state.get_account(&refund_contract).unwrap().balance, U256::from(1_000u64));
    }

    #[test]
    fn drain_is_a_no_op_outside_the_configured_block() {
        let mut state = state();
        let drained_account = [3u8; 20];
        state.save_account(drained_account, Account { balance: U256::from(1_000u64), ..Account::empty() });

        let config = BlockchainConfig::etc_mainnet().with_test_dao_fork(1_920_000, [4u8; 20], vec![drained_account]);
        apply_dao_fork_drain(&mut state, &config, 1_920_001);

        assert_eq!(state.get_account(&drained_account).unwrap().balance, U256::from(1_000u64));
    }
}
