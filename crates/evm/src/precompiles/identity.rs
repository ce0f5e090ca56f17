//! Identity precompile (0x04): returns its input verbatim.

use super::{Precompile, PrecompileOutput};
use crate::errors::PrecompileError;

const BASE_COST: u64 = 15;
const WORD_COST: u64 = 3;

pub struct Identity;

impl Precompile for Identity {
    fn execute(&self, input: &[u8], gas_limit: u64) -> Result<PrecompileOutput, PrecompileError> {
        let gas_used = BASE_COST + WORD_COST * input.len().div_ceil(32) as u64;
        if gas_used > gas_limit {
            return Err(PrecompileError::OutOfGas);
        }
        Ok(PrecompileOutput {
            gas_used,
            output: input.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echoes_input() {
        let result = Identity.execute(b"hello world", 100_000).unwrap();
        assert_eq!(result.output, b"hello world");
    }

    #[test]
    fn out_of_gas_below_base_cost() {
        assert!(matches!(
            Identity.execute(&[0u8; 100], 1),
            Err(PrecompileError::OutOfGas)
        ));
    }
}
