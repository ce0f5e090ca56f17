//! Chain-wide configuration: fork schedule, DAO fork parameters, and
//! monetary policy, layered around `evm::ForkSchedule` rather than
//! duplicating it.
//!
//! Grounded on `qc-11-smart-contracts/src/domain/value_objects.rs`'s
//! fork-config shape (see `evm::config`) extended with the DAO-fork and
//! block-reward fields SPEC_FULL.md §6 lists under "Blockchain" config.

use evm::ForkSchedule;
use shared_types::{Address, U256};

/// Everything the ledger needs to know about the chain it is executing,
/// beyond what `evm::EvmConfig` resolves per-block.
#[derive(Clone, Debug)]
pub struct BlockchainConfig {
    pub chain_id: u64,
    pub fork_schedule: ForkSchedule,
    /// Block number the difficulty bomb's exponential term is frozen at
    /// (`None` if never paused for this chain).
    pub difficulty_bomb_pause_block: Option<u64>,
    /// Block number the bomb resumes counting from after a pause, shifting
    /// its effective epoch back by `continue_block - pause_block`.
    pub difficulty_bomb_continue_block: Option<u64>,
    /// Block number the DAO-fork balance drain happens at, if this chain
    /// performs one. ETC's defining decision was to reject the DAO fork, so
    /// `etc_mainnet` leaves this `None`.
    pub dao_fork_block_number: Option<u64>,
    pub dao_fork_refund_contract: Address,
    pub dao_fork_drain_list: Vec<Address>,
    /// Nonce a brand-new account starts at. 0 pre-EIP-161, conventionally
    /// still 0 for ETC (EIP-161 state-clearing applies to emptiness, not to
    /// the starting nonce value itself).
    pub account_start_nonce: u64,
    pub monetary_policy: MonetaryPolicy,
}

impl BlockchainConfig {
    /// Ethereum Classic mainnet: the DAO fork never happened here, by design.
    #[must_use]
    pub fn etc_mainnet() -> Self {
        Self {
            chain_id: 61,
            fork_schedule: ForkSchedule::etc_mainnet(),
            difficulty_bomb_pause_block: Some(3_000_000),
            difficulty_bomb_continue_block: Some(5_000_000),
            dao_fork_block_number: None,
            dao_fork_refund_contract: [0u8; 20],
            dao_fork_drain_list: Vec::new(),
            account_start_nonce: 0,
            monetary_policy: MonetaryPolicy::ecip1017(),
        }
    }

    /// A configuration exercising the DAO-fork drain mechanism (never used
    /// on ETC mainnet, but the mechanism itself is chain-agnostic and is
    /// exercised by tests replaying the scenario it was built for).
    #[must_use]
    pub fn with_test_dao_fork(mut self, block_number: u64, refund_contract: Address, drain_list: Vec<Address>) -> Self {
        self.dao_fork_block_number = Some(block_number);
        self.dao_fork_refund_contract = refund_contract;
        self.dao_fork_drain_list = drain_list;
        self
    }

    #[must_use]
    pub fn evm_config(&self, number: u64) -> evm::EvmConfig {
        self.fork_schedule.config_at(number)
    }
}

/// Block-reward schedule. The reduction rate is kept as a numerator /
/// denominator pair rather than a float, so `block_reward_at` stays exact
/// `U256` arithmetic all the way down.
#[derive(Clone, Copy, Debug)]
pub struct MonetaryPolicy {
    pub era_duration: u64,
    pub reward_reduction_numerator: u64,
    pub reward_reduction_denominator: u64,
    pub first_era_block_reward: U256,
}

impl MonetaryPolicy {
    /// ECIP-1017: reward shrinks by a factor of 4/5 every 5,000,000 blocks,
    /// starting at 5 ETC per block.
    #[must_use]
    pub fn ecip1017() -> Self {
        Self {
            era_duration: 5_000_000,
            reward_reduction_numerator: 4,
            reward_reduction_denominator: 5,
            first_era_block_reward: U256::from(5_000_000_000_000_000_000u64),
        }
    }

    #[must_use]
    pub fn era_of(&self, number: u64) -> u64 {
        number / self.era_duration
    }

    /// The base per-block reward at `number`'s era, before the ommer-count
    /// and ommer-distance adjustments `reward.rs` applies on top.
    #[must_use]
    pub fn block_reward_at(&self, number: u64) -> U256 {
        let era = self.era_of(number);
        let mut reward = self.first_era_block_reward;
        for _ in 0..era {
            reward = reward * U256::from(self.reward_reduction_numerator) / U256::from(self.reward_reduction_denominator);
        }
        reward
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reward_is_unreduced_within_the_first_era() {
        let policy = MonetaryPolicy::ecip1017();
        assert_eq!(policy.block_reward_at(0), policy.first_era_block_reward);
        assert_eq!(policy.block_reward_at(policy.era_duration - 1), policy.first_era_block_reward);
    }

    #[test]
    fn reward_shrinks_by_four_fifths_each_era() {
        let policy = MonetaryPolicy::ecip1017();
        let second_era = policy.block_reward_at(policy.era_duration);
        let expected = policy.first_era_block_reward * U256::from(4u64) / U256::from(5u64);
        assert_eq!(second_era, expected);
    }

    #[test]
    fn mainnet_rejects_the_dao_fork_by_having_no_fork_block() {
        let config = BlockchainConfig::etc_mainnet();
        assert!(config.dao_fork_block_number.is_none());
    }
}
