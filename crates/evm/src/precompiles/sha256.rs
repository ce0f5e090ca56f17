//! SHA-256 precompile (0x02).

use super::{Precompile, PrecompileOutput};
use crate::errors::PrecompileError;
use sha2::{Digest, Sha256};

const BASE_COST: u64 = 60;
const WORD_COST: u64 = 12;

pub struct Sha256Precompile;

impl Precompile for Sha256Precompile {
    fn execute(&self, input: &[u8], gas_limit: u64) -> Result<PrecompileOutput, PrecompileError> {
        let gas_used = BASE_COST + WORD_COST * input.len().div_ceil(32) as u64;
        if gas_used > gas_limit {
            return Err(PrecompileError::OutOfGas);
        }
        Ok(PrecompileOutput {
            gas_used,
            output: Sha256::digest(input).to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_the_empty_input() {
        let result = Sha256Precompile.execute(&[], 100_000).unwrap();
        assert_eq!(
            hex::encode(&result.output),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn out_of_gas_below_base_cost() {
        assert!(matches!(
            Sha256Precompile.execute(&[0u8; 100], 1),
            Err(PrecompileError::OutOfGas)
        ));
    }
}
