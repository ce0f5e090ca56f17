//! Fork-gated EVM configuration.
//!
//! Grounded on `qc-11-smart-contracts/src/domain/value_objects.rs`'s
//! `FeeSchedule`/hard-fork-selection shape, rewritten for SPEC_FULL.md §4.4's
//! fork ladder (Frontier -> Homestead -> EIP-150 -> EIP-155 -> EIP-160) rather
//! than the teacher's PoS-era (Shanghai/Cancun) fork names.

/// The fee schedule in force for a block, selected once at block-execution
/// start time and passed down to every nested call frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeeSchedule {
    /// EIP-150: 63/64 gas-forwarding rule and repriced IO-heavy opcodes.
    pub eip150_active: bool,
    /// EIP-155: chain id mixed into the transaction signature.
    pub eip155_active: bool,
    /// EIP-160: EXP repricing (10 -> 50 gas per exponent byte).
    pub eip160_active: bool,
    /// EIP-161: empty accounts are pruned after any call that touches them.
    pub eip161_active: bool,
    /// Homestead: DELEGATECALL, contract-creation fails (rather than
    /// succeeds with empty code) on out-of-gas during the init code run.
    pub homestead_active: bool,
    /// EIP-2929/2930-style cold/warm access-list gas metering. Carried as an
    /// ambient gas-metering capability (see SPEC_FULL.md's "Ambient stack"
    /// note) rather than gated to a specific historical fork block.
    pub access_list_active: bool,
}

impl FeeSchedule {
    #[must_use]
    pub const fn frontier() -> Self {
        Self {
            eip150_active: false,
            eip155_active: false,
            eip160_active: false,
            eip161_active: false,
            homestead_active: false,
            access_list_active: false,
        }
    }

    #[must_use]
    pub const fn homestead() -> Self {
        Self {
            homestead_active: true,
            ..Self::frontier()
        }
    }

    #[must_use]
    pub const fn eip150() -> Self {
        Self {
            eip150_active: true,
            ..Self::homestead()
        }
    }

    #[must_use]
    pub const fn eip155() -> Self {
        Self {
            eip155_active: true,
            ..Self::eip150()
        }
    }

    #[must_use]
    pub const fn eip160() -> Self {
        Self {
            eip160_active: true,
            eip161_active: true,
            ..Self::eip155()
        }
    }
}

/// The set of opcodes recognised at a given fork, layered on top of the
/// base Frontier set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OpCodes {
    pub has_delegatecall: bool,
    pub has_revert: bool,
    pub has_returndatasize: bool,
    pub has_staticcall: bool,
    pub has_extcodehash: bool,
    pub has_shift: bool,
}

impl OpCodes {
    #[must_use]
    pub const fn frontier() -> Self {
        Self {
            has_delegatecall: false,
            has_revert: false,
            has_returndatasize: false,
            has_staticcall: false,
            has_extcodehash: false,
            has_shift: false,
        }
    }

    #[must_use]
    pub const fn homestead() -> Self {
        Self {
            has_delegatecall: true,
            ..Self::frontier()
        }
    }

    /// Byzantium-equivalent opcode set (REVERT, RETURNDATA*, STATICCALL),
    /// which ETC activated alongside its EIP-160 marker.
    #[must_use]
    pub const fn eip160() -> Self {
        Self {
            has_revert: true,
            has_returndatasize: true,
            has_staticcall: true,
            has_extcodehash: true,
            has_shift: true,
            ..Self::homestead()
        }
    }
}

/// Block numbers at which each fork activates. `0` means "active from
/// genesis"; `None` means "never activates" (useful for test chains).
#[derive(Clone, Copy, Debug)]
pub struct ForkSchedule {
    pub homestead_block: u64,
    pub eip150_block: u64,
    pub eip155_block: u64,
    pub eip160_block: u64,
}

impl ForkSchedule {
    /// Ethereum Classic mainnet's historical fork heights.
    #[must_use]
    pub const fn etc_mainnet() -> Self {
        Self {
            homestead_block: 1_150_000,
            eip150_block: 2_500_000,
            eip155_block: 3_000_000,
            eip160_block: 3_000_000,
        }
    }

    /// The complete `EvmConfig` for executing a block at `number`, per
    /// SPEC_FULL.md §4.4: "the highest transition block <= current block wins."
    #[must_use]
    pub fn config_at(&self, number: u64) -> EvmConfig {
        if number >= self.eip160_block {
            EvmConfig {
                fee_schedule: FeeSchedule::eip160(),
                opcodes: OpCodes::eip160(),
            }
        } else if number >= self.eip155_block {
            EvmConfig {
                fee_schedule: FeeSchedule::eip155(),
                opcodes: OpCodes::homestead(),
            }
        } else if number >= self.eip150_block {
            EvmConfig {
                fee_schedule: FeeSchedule::eip150(),
                opcodes: OpCodes::homestead(),
            }
        } else if number >= self.homestead_block {
            EvmConfig {
                fee_schedule: FeeSchedule::homestead(),
                opcodes: OpCodes::homestead(),
            }
        } else {
            EvmConfig {
                fee_schedule: FeeSchedule::frontier(),
                opcodes: OpCodes::frontier(),
            }
        }
    }
}

/// The resolved fee schedule and opcode set for one block's execution.
#[derive(Clone, Copy, Debug)]
pub struct EvmConfig {
    pub fee_schedule: FeeSchedule,
    pub opcodes: OpCodes,
}

impl EvmConfig {
    #[must_use]
    pub const fn frontier() -> Self {
        Self {
            fee_schedule: FeeSchedule::frontier(),
            opcodes: OpCodes::frontier(),
        }
    }

    #[must_use]
    pub const fn latest() -> Self {
        Self {
            fee_schedule: FeeSchedule::eip160(),
            opcodes: OpCodes::eip160(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn highest_transition_block_at_or_below_number_wins() {
        let schedule = ForkSchedule::etc_mainnet();
        let genesis = schedule.config_at(0);
        assert!(!genesis.fee_schedule.homestead_active);

        let post_homestead = schedule.config_at(schedule.homestead_block);
        assert!(post_homestead.fee_schedule.homestead_active);
        assert!(!post_homestead.fee_schedule.eip150_active);

        let post_eip160 = schedule.config_at(schedule.eip160_block);
        assert!(post_eip160.fee_schedule.eip160_active);
        assert!(post_eip160.opcodes.has_staticcall);
    }

    #[test]
    fn one_block_before_a_fork_still_uses_the_prior_schedule() {
        let schedule = ForkSchedule::etc_mainnet();
        let just_before = schedule.config_at(schedule.homestead_block - 1);
        assert!(!just_before.fee_schedule.homestead_active);
    }
}
