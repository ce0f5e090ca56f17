//! Static and dynamic gas costs for bytecode execution.
//!
//! Cold/warm access-list pricing (EIP-2929) is carried as an ambient gas-metering
//! capability per the world-state proxy's access list, independent of which
//! historical fork introduced it upstream.

use shared_types::U256;

pub mod costs {
    pub const ZERO: u64 = 0;
    pub const BASE: u64 = 2;
    pub const VERY_LOW: u64 = 3;
    pub const LOW: u64 = 5;
    pub const MID: u64 = 8;
    pub const HIGH: u64 = 10;
    pub const JUMPDEST: u64 = 1;

    pub const TX_BASE: u64 = 21_000;
    pub const TX_CREATE: u64 = 32_000;
    pub const TX_DATA_NON_ZERO: u64 = 68;
    pub const TX_DATA_NON_ZERO_EIP2028: u64 = 16;
    pub const TX_DATA_ZERO: u64 = 4;

    pub const COPY: u64 = 3;

    pub const COLD_SLOAD: u64 = 2100;
    pub const WARM_SLOAD: u64 = 100;
    pub const COLD_ACCOUNT_ACCESS: u64 = 2600;
    pub const WARM_ACCOUNT_ACCESS: u64 = 100;
    pub const SLOAD_FRONTIER: u64 = 50;

    pub const SSTORE_RESET: u64 = 2900;
    pub const SSTORE_SET: u64 = 20_000;
    pub const SSTORE_CLEAR_REFUND: u64 = 4800;

    pub const CALL_VALUE: u64 = 9000;
    pub const CALL_NEW_ACCOUNT: u64 = 25_000;
    pub const CALL_STIPEND: u64 = 2300;
    pub const CALL_FRONTIER: u64 = 40;
    pub const CALL_EIP150: u64 = 700;

    pub const CREATE: u64 = 32_000;
    pub const CREATE_DATA_PER_BYTE: u64 = 200;
    pub const KECCAK256_WORD: u64 = 6;

    pub const LOG: u64 = 375;
    pub const LOG_TOPIC: u64 = 375;
    pub const LOG_DATA: u64 = 8;

    pub const KECCAK256: u64 = 30;
    pub const EXP: u64 = 10;
    pub const EXP_BYTE_FRONTIER: u64 = 10;
    pub const EXP_BYTE_EIP160: u64 = 50;
    pub const SELFDESTRUCT: u64 = 5000;
    pub const SELFDESTRUCT_NEW_ACCOUNT: u64 = 25_000;
    pub const BLOCKHASH: u64 = 20;
}

/// Marginal gas cost for the EXP opcode, depending on whether EIP-160 repricing
/// (10 -> 50 gas per exponent byte) applies at the executing block.
#[must_use]
pub fn exp_gas_cost(exponent: U256, eip160_active: bool) -> u64 {
    if exponent.is_zero() {
        return costs::EXP;
    }
    let byte_size = (256 - u64::from(exponent.leading_zeros())).div_ceil(8);
    let per_byte = if eip160_active {
        costs::EXP_BYTE_EIP160
    } else {
        costs::EXP_BYTE_FRONTIER
    };
    costs::EXP + per_byte * byte_size
}

#[must_use]
pub fn keccak256_gas_cost(data_size: usize) -> u64 {
    let word_size = data_size.div_ceil(32);
    costs::KECCAK256 + costs::KECCAK256_WORD * word_size as u64
}

#[must_use]
pub fn log_gas_cost(data_size: usize, topic_count: usize) -> u64 {
    costs::LOG + costs::LOG_TOPIC * topic_count as u64 + costs::LOG_DATA * data_size as u64
}

#[must_use]
pub fn copy_gas_cost(size: usize) -> u64 {
    let word_size = size.div_ceil(32);
    costs::COPY * word_size as u64
}

#[must_use]
pub fn create_gas_cost(init_code_size: usize) -> u64 {
    let word_size = init_code_size.div_ceil(32);
    costs::CREATE + costs::KECCAK256_WORD * word_size as u64
}

/// Intrinsic gas for a transaction: base cost, plus per-byte calldata cost,
/// plus contract-creation surcharge.
#[must_use]
pub fn intrinsic_gas(payload: &[u8], is_create: bool, eip2028_active: bool) -> u64 {
    let mut gas = costs::TX_BASE;
    if is_create {
        gas += costs::TX_CREATE;
    }
    let non_zero_cost = if eip2028_active {
        costs::TX_DATA_NON_ZERO_EIP2028
    } else {
        costs::TX_DATA_NON_ZERO
    };
    for &byte in payload {
        gas += if byte == 0 {
            costs::TX_DATA_ZERO
        } else {
            non_zero_cost
        };
    }
    gas
}

#[derive(Clone, Copy, Debug)]
pub struct CallGasParams {
    pub is_cold: bool,
    pub has_value: bool,
    pub is_empty: bool,
}

/// Static account-access component of a CALL-family opcode's gas cost. EIP-150
/// callers add a flat 700 pre-Tangerine-Whistle-equivalent surcharge instead of
/// the cold/warm split; pass `eip2929_active` to select which applies.
#[must_use]
pub fn call_gas_cost(params: &CallGasParams, eip2929_active: bool) -> u64 {
    let mut gas = if eip2929_active {
        if params.is_cold {
            costs::COLD_ACCOUNT_ACCESS
        } else {
            costs::WARM_ACCOUNT_ACCESS
        }
    } else {
        costs::CALL_EIP150
    };
    if params.has_value {
        gas += costs::CALL_VALUE;
        if params.is_empty {
            gas += costs::CALL_NEW_ACCOUNT;
        }
    }
    gas
}

/// Gas forwarded to a subcall under the 63/64 rule (EIP-150), plus the value
/// stipend when a transfer accompanies the call.
#[must_use]
pub fn calculate_call_gas(available_gas: u64, requested_gas: u64, has_value: bool) -> u64 {
    let max_gas = available_gas - (available_gas / 64);
    let mut gas = requested_gas.min(max_gas);
    if has_value {
        gas = gas.saturating_add(costs::CALL_STIPEND);
    }
    gas
}

pub const MAX_REFUND_PERCENT: u64 = 50;

/// Bounds the accumulated `gas_refund` to half of gas actually used.
#[must_use]
pub fn calculate_refund(gas_used: u64, refund: u64) -> u64 {
    let max_refund = gas_used / 2;
    refund.min(max_refund)
}

/// Static (pre-dynamic) gas cost per opcode. Cold/warm ops (BALANCE, SLOAD,
/// EXTCODE*, CALL family) carry zero here; their full cost is resolved against
/// the world-state proxy's access list at dispatch time.
#[rustfmt::skip]
pub const OPCODE_GAS: [u64; 256] = {
    let mut table = [0u64; 256];

    table[0x00] = 0;                    // STOP
    table[0x01] = costs::VERY_LOW;      // ADD
    table[0x02] = costs::LOW;           // MUL
    table[0x03] = costs::VERY_LOW;      // SUB
    table[0x04] = costs::LOW;           // DIV
    table[0x05] = costs::LOW;           // SDIV
    table[0x06] = costs::LOW;           // MOD
    table[0x07] = costs::LOW;           // SMOD
    table[0x08] = costs::MID;           // ADDMOD
    table[0x09] = costs::MID;           // MULMOD
    table[0x0A] = costs::EXP;           // EXP (dynamic added)
    table[0x0B] = costs::LOW;           // SIGNEXTEND

    table[0x10] = costs::VERY_LOW;      // LT
    table[0x11] = costs::VERY_LOW;      // GT
    table[0x12] = costs::VERY_LOW;      // SLT
    table[0x13] = costs::VERY_LOW;      // SGT
    table[0x14] = costs::VERY_LOW;      // EQ
    table[0x15] = costs::VERY_LOW;      // ISZERO
    table[0x16] = costs::VERY_LOW;      // AND
    table[0x17] = costs::VERY_LOW;      // OR
    table[0x18] = costs::VERY_LOW;      // XOR
    table[0x19] = costs::VERY_LOW;      // NOT
    table[0x1A] = costs::VERY_LOW;      // BYTE
    table[0x1B] = costs::VERY_LOW;      // SHL
    table[0x1C] = costs::VERY_LOW;      // SHR
    table[0x1D] = costs::VERY_LOW;      // SAR

    table[0x20] = costs::KECCAK256;     // KECCAK256 (dynamic added)

    table[0x30] = costs::BASE;          // ADDRESS
    table[0x31] = 0;                    // BALANCE (cold/warm)
    table[0x32] = costs::BASE;          // ORIGIN
    table[0x33] = costs::BASE;          // CALLER
    table[0x34] = costs::BASE;          // CALLVALUE
    table[0x35] = costs::VERY_LOW;      // CALLDATALOAD
    table[0x36] = costs::BASE;          // CALLDATASIZE
    table[0x37] = costs::VERY_LOW;      // CALLDATACOPY (dynamic added)
    table[0x38] = costs::BASE;          // CODESIZE
    table[0x39] = costs::VERY_LOW;      // CODECOPY (dynamic added)
    table[0x3A] = costs::BASE;          // GASPRICE
    table[0x3B] = 0;                    // EXTCODESIZE (cold/warm)
    table[0x3C] = 0;                    // EXTCODECOPY (cold/warm + copy)
    table[0x3D] = costs::BASE;          // RETURNDATASIZE
    table[0x3E] = costs::VERY_LOW;      // RETURNDATACOPY (dynamic added)
    table[0x3F] = 0;                    // EXTCODEHASH (cold/warm)

    table[0x40] = costs::BLOCKHASH;     // BLOCKHASH
    table[0x41] = costs::BASE;          // COINBASE
    table[0x42] = costs::BASE;          // TIMESTAMP
    table[0x43] = costs::BASE;          // NUMBER
    table[0x44] = costs::BASE;          // DIFFICULTY
    table[0x45] = costs::BASE;          // GASLIMIT

    table[0x50] = costs::BASE;          // POP
    table[0x51] = costs::VERY_LOW;      // MLOAD
    table[0x52] = costs::VERY_LOW;      // MSTORE
    table[0x53] = costs::VERY_LOW;      // MSTORE8
    table[0x54] = 0;                    // SLOAD (cold/warm)
    table[0x55] = 0;                    // SSTORE (dynamic)
    table[0x56] = costs::MID;           // JUMP
    table[0x57] = costs::HIGH;          // JUMPI
    table[0x58] = costs::BASE;          // PC
    table[0x59] = costs::BASE;          // MSIZE
    table[0x5A] = costs::BASE;          // GAS
    table[0x5B] = costs::JUMPDEST;      // JUMPDEST

    let mut i = 0x60;
    while i <= 0x7F {
        table[i] = costs::VERY_LOW;     // PUSH1..PUSH32
        i += 1;
    }
    i = 0x80;
    while i <= 0x8F {
        table[i] = costs::VERY_LOW;     // DUP1..DUP16
        i += 1;
    }
    i = 0x90;
    while i <= 0x9F {
        table[i] = costs::VERY_LOW;     // SWAP1..SWAP16
        i += 1;
    }

    table[0xA0] = costs::LOG;           // LOG0
    table[0xA1] = costs::LOG;           // LOG1
    table[0xA2] = costs::LOG;           // LOG2
    table[0xA3] = costs::LOG;           // LOG3
    table[0xA4] = costs::LOG;           // LOG4

    table[0xF0] = costs::CREATE;        // CREATE
    table[0xF1] = 0;                    // CALL (dynamic)
    table[0xF2] = 0;                    // CALLCODE (dynamic)
    table[0xF3] = 0;                    // RETURN
    table[0xF4] = 0;                    // DELEGATECALL (dynamic)
    table[0xF5] = costs::CREATE;        // CREATE2 (dynamic added)
    table[0xFA] = 0;                    // STATICCALL (dynamic)
    table[0xFD] = 0;                    // REVERT
    table[0xFE] = 0;                    // INVALID (consumes all gas)
    table[0xFF] = costs::SELFDESTRUCT;  // SELFDESTRUCT (dynamic added)

    table
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exp_gas_switches_per_byte_rate_at_eip160() {
        assert_eq!(exp_gas_cost(U256::from(256), false), costs::EXP + costs::EXP_BYTE_FRONTIER * 2);
        assert_eq!(exp_gas_cost(U256::from(256), true), costs::EXP + costs::EXP_BYTE_EIP160 * 2);
    }

    #[test]
    fn keccak256_gas_scales_with_words() {
        assert_eq!(keccak256_gas_cost(0), costs::KECCAK256);
        assert_eq!(keccak256_gas_cost(32), costs::KECCAK256 + costs::KECCAK256_WORD);
    }

    #[test]
    fn log_gas_charges_per_topic_and_byte() {
        let cost = log_gas_cost(64, 2);
        assert_eq!(cost, costs::LOG + costs::LOG_TOPIC * 2 + costs::LOG_DATA * 64);
    }

    #[test]
    fn intrinsic_gas_includes_create_surcharge_and_data_cost() {
        let payload = vec![0u8, 1u8, 2u8];
        let gas = intrinsic_gas(&payload, true, false);
        assert_eq!(
            gas,
            costs::TX_BASE + costs::TX_CREATE + costs::TX_DATA_ZERO + costs::TX_DATA_NON_ZERO * 2
        );
    }

    #[test]
    fn call_gas_cost_adds_value_and_new_account_surcharges() {
        let params = CallGasParams { is_cold: true, has_value: true, is_empty: true };
        assert_eq!(
            call_gas_cost(&params, true),
            costs::COLD_ACCOUNT_ACCESS + costs::CALL_VALUE + costs::CALL_NEW_ACCOUNT
        );
        assert_eq!(
            call_gas_cost(&params, false),
            costs::CALL_EIP150 + costs::CALL_VALUE + costs::CALL_NEW_ACCOUNT
        );
    }

    #[test]
    fn subcall_gas_follows_63_64_rule_and_adds_stipend() {
        let gas = calculate_call_gas(64_000, 50_000, false);
        assert!(gas <= 64_000 - 64_000 / 64);
        let gas_with_value = calculate_call_gas(64_000, 50_000, true);
        assert!(gas_with_value > gas);
    }

    #[test]
    fn refund_capped_at_half_gas_used() {
        assert_eq!(calculate_refund(1000, 600), 500);
        assert_eq!(calculate_refund(1000, 400), 400);
    }

    #[test]
    fn opcode_gas_table_matches_known_entries() {
        assert_eq!(OPCODE_GAS[0x01], costs::VERY_LOW);
        assert_eq!(OPCODE_GAS[0x60], costs::VERY_LOW);
        assert_eq!(OPCODE_GAS[0x80], costs::VERY_LOW);
    }
}
