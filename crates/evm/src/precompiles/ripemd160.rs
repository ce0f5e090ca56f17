//! RIPEMD-160 precompile (0x03). Output is left-padded to 32 bytes, matching
//! every Ethereum-family client's convention for this precompile.

use super::{Precompile, PrecompileOutput};
use crate::errors::PrecompileError;
use ripemd::{Digest, Ripemd160};

const BASE_COST: u64 = 600;
const WORD_COST: u64 = 120;

pub struct Ripemd160Precompile;

impl Precompile for Ripemd160Precompile {
    fn execute(&self, input: &[u8], gas_limit: u64) -> Result<PrecompileOutput, PrecompileError> {
        let gas_used = BASE_COST + WORD_COST * input.len().div_ceil(32) as u64;
        if gas_used > gas_limit {
            return Err(PrecompileError::OutOfGas);
        }
        let digest = Ripemd160::digest(input);
        let mut output = vec![0u8; 32];
        output[12..].copy_from_slice(&digest);
        Ok(PrecompileOutput { gas_used, output })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_is_left_padded_to_32_bytes() {
        let result = Ripemd160Precompile.execute(b"hello", 100_000).unwrap();
        assert_eq!(result.output.len(), 32);
        assert_eq!(&result.output[..12], &[0u8; 12]);
    }

    #[test]
    fn out_of_gas_below_base_cost() {
        assert!(matches!(
            Ripemd160Precompile.execute(&[0u8; 100], 1),
            Err(PrecompileError::OutOfGas)
        ));
    }
}
