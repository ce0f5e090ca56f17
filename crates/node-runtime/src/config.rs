//! The node's configuration surface (SPEC_FULL.md §6, "Configuration
//! (recognised options)"): a struct-of-structs built in-process with
//! `Default` impls matching the recognised option list, one sub-struct per
//! subsystem. There is no TOML/argv loader here — that shell is excluded;
//! a deployment wires `NodeConfig` up however it likes and hands it to
//! [`crate::runtime::NodeRuntime::bootstrap`].
//!
//! Grounded on the teacher's `container/config.rs` struct-of-structs shape,
//! trimmed from its 17-subsystem plugin matrix down to the four subsystems
//! SPEC_FULL.md §6 actually lists, and with the Sync section delegated
//! straight to [`sync_engine::SyncConfig`] rather than re-declared field by
//! field.

use shared_types::Address;
use shared_types::U256;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct NetworkConfig {
    pub protocol_version: u64,
    pub network_id: u64,
    pub listen_port: u16,
    pub max_peers: usize,
    pub connect_retry_delay: Duration,
    pub handshake_timeout: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            protocol_version: 63,
            network_id: 1,
            listen_port: 30303,
            max_peers: 25,
            connect_retry_delay: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(5),
        }
    }
}

/// Mirrors [`ledger::MonetaryPolicy`]'s fields under the name SPEC_FULL.md
/// §6 lists (`reward_reduction_rate`) as a numerator/denominator pair, since
/// the ledger keeps the reduction exact rather than as a float.
#[derive(Clone, Copy, Debug)]
pub struct MonetaryPolicyConfig {
    pub era_duration: u64,
    pub reward_reduction_numerator: u64,
    pub reward_reduction_denominator: u64,
    pub first_era_block_reward: U256,
}

impl Default for MonetaryPolicyConfig {
    fn default() -> Self {
        let policy = ledger::MonetaryPolicy::ecip1017();
        Self {
            era_duration: policy.era_duration,
            reward_reduction_numerator: policy.reward_reduction_numerator,
            reward_reduction_denominator: policy.reward_reduction_denominator,
            first_era_block_reward: policy.first_era_block_reward,
        }
    }
}

/// `frontier_block_number` is always 0 downstream (frontier is the implicit
/// base case in `evm::ForkSchedule::config_at`'s dispatch, not a stored
/// transition height) but is kept here so the recognised-option name from
/// SPEC_FULL.md §6 round-trips through a loaded config file unchanged.
#[derive(Clone, Debug)]
pub struct BlockchainConfig {
    pub chain_id: u64,
    pub frontier_block_number: u64,
    pub homestead_block_number: u64,
    pub eip150_block_number: u64,
    pub eip155_block_number: u64,
    pub eip160_block_number: u64,
    pub difficulty_bomb_pause_block_number: Option<u64>,
    pub difficulty_bomb_continue_block_number: Option<u64>,
    pub dao_fork_block_number: Option<u64>,
    pub dao_fork_refund_contract: Address,
    pub dao_fork_drain_list: Vec<Address>,
    pub account_start_nonce: u64,
    pub monetary_policy: MonetaryPolicyConfig,
}

impl Default for BlockchainConfig {
    fn default() -> Self {
        let ledger_config = ledger::BlockchainConfig::etc_mainnet();
        Self {
            chain_id: ledger_config.chain_id,
            frontier_block_number: 0,
            homestead_block_number: ledger_config.fork_schedule.homestead_block,
            eip150_block_number: ledger_config.fork_schedule.eip150_block,
            eip155_block_number: ledger_config.fork_schedule.eip155_block,
            eip160_block_number: ledger_config.fork_schedule.eip160_block,
            difficulty_bomb_pause_block_number: ledger_config.difficulty_bomb_pause_block,
            difficulty_bomb_continue_block_number: ledger_config.difficulty_bomb_continue_block,
            dao_fork_block_number: ledger_config.dao_fork_block_number,
            dao_fork_refund_contract: ledger_config.dao_fork_refund_contract,
            dao_fork_drain_list: ledger_config.dao_fork_drain_list,
            account_start_nonce: ledger_config.account_start_nonce,
            monetary_policy: MonetaryPolicyConfig::default(),
        }
    }
}

impl BlockchainConfig {
    #[must_use]
    pub fn to_ledger_config(&self) -> ledger::BlockchainConfig {
        ledger::BlockchainConfig {
            chain_id: self.chain_id,
            fork_schedule: evm::ForkSchedule {
                homestead_block: self.homestead_block_number,
                eip150_block: self.eip150_block_number,
                eip155_block: self.eip155_block_number,
                eip160_block: self.eip160_block_number,
            },
            difficulty_bomb_pause_block: self.difficulty_bomb_pause_block_number,
            difficulty_bomb_continue_block: self.difficulty_bomb_continue_block_number,
            dao_fork_block_number: self.dao_fork_block_number,
            dao_fork_refund_contract: self.dao_fork_refund_contract,
            dao_fork_drain_list: self.dao_fork_drain_list.clone(),
            account_start_nonce: self.account_start_nonce,
            monetary_policy: ledger::MonetaryPolicy {
                era_duration: self.monetary_policy.era_duration,
                reward_reduction_numerator: self.monetary_policy.reward_reduction_numerator,
                reward_reduction_denominator: self.monetary_policy.reward_reduction_denominator,
                first_era_block_reward: self.monetary_policy.first_era_block_reward,
            },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DbBackend {
    RocksDb,
    InMemory,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PruningMode {
    Archive,
    Basic { history_depth: u64 },
}

#[derive(Clone, Debug)]
pub struct DbConfig {
    pub backend: DbBackend,
    pub path: PathBuf,
    pub write_batch_size: usize,
    pub pruning_mode: PruningMode,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            backend: DbBackend::RocksDb,
            path: PathBuf::from("./data/chaindata"),
            write_batch_size: 1000,
            pruning_mode: PruningMode::Archive,
        }
    }
}

#[derive(Clone, Debug)]
pub struct NodeConfig {
    pub network: NetworkConfig,
    pub sync: sync_engine::SyncConfig,
    pub blockchain: BlockchainConfig,
    pub db: DbConfig,
    /// Not itself a recognised option under SPEC_FULL.md §6 (it names where
    /// to find the genesis file, not a genesis field); kept at the config
    /// root since every other startup input flows through `NodeConfig` too.
    pub genesis_path: PathBuf,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            sync: sync_engine::SyncConfig::default(),
            blockchain: BlockchainConfig::default(),
            db: DbConfig::default(),
            genesis_path: PathBuf::from("./genesis.json"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_blockchain_config_matches_etc_mainnet_fork_heights() {
        let config = BlockchainConfig::default();
        assert_eq!(config.homestead_block_number, 1_150_000);
        assert_eq!(config.dao_fork_block_number, None);
    }

    #[test]
    fn to_ledger_config_round_trips_the_fork_schedule() {
        let config = BlockchainConfig::default();
        let ledger_config = config.to_ledger_config();
        assert_eq!(ledger_config.fork_schedule.eip155_block, config.eip155_block_number);
        assert_eq!(ledger_config.chain_id, config.chain_id);
    }

    #[test]
    fn default_db_config_uses_rocksdb_with_archive_pruning() {
        let config = DbConfig::default();
        assert_eq!(config.backend, DbBackend::RocksDb);
        assert_eq!(config.pruning_mode, PruningMode::Archive);
    }
}
