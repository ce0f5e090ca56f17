//! Precompiled contracts dispatched at addresses `0x01`-`0x04`.

pub mod ecrecover;
pub mod identity;
pub mod ripemd160;
pub mod sha256;

use crate::errors::PrecompileError;
use shared_types::Address;

pub struct PrecompileOutput {
    pub gas_used: u64,
    pub output: Vec<u8>,
}

pub trait Precompile: Send + Sync {
    fn execute(&self, input: &[u8], gas_limit: u64) -> Result<PrecompileOutput, PrecompileError>;
}

/// Returns `true` for the four fixed addresses this fork range implements.
#[must_use]
pub fn is_precompile(address: &Address) -> bool {
    address[..19] == [0u8; 19] && (1..=4).contains(&address[19])
}

/// Dispatches to the fixed precompile at `address`, if any.
#[must_use]
pub fn execute_precompile(
    address: &Address,
    input: &[u8],
    gas_limit: u64,
) -> Option<Result<PrecompileOutput, PrecompileError>> {
    if !is_precompile(address) {
        return None;
    }
    Some(match address[19] {
        1 => ecrecover::Ecrecover.execute(input, gas_limit),
        2 => sha256::Sha256Precompile.execute(input, gas_limit),
        3 => ripemd160::Ripemd160Precompile.execute(input, gas_limit),
        4 => identity::Identity.execute(input, gas_limit),
        _ => unreachable!(),
    })
}
