//! ECRECOVER precompile (0x01): recovers the signer address from a
//! `(hash, v, r, s)` tuple, returned left-padded to 32 bytes.
//!
//! Input format (128 bytes, right-zero-padded if short):
//! - bytes 0-31: message hash
//! - bytes 32-63: `v` (27 or 28, big-endian)
//! - bytes 64-95: `r`
//! - bytes 96-127: `s`

use super::{Precompile, PrecompileOutput};
use crate::errors::PrecompileError;
use shared_crypto::recover_address;
use shared_types::U256;

const ECRECOVER_GAS: u64 = 3000;

pub struct Ecrecover;

impl Precompile for Ecrecover {
    fn execute(&self, input: &[u8], gas_limit: u64) -> Result<PrecompileOutput, PrecompileError> {
        if ECRECOVER_GAS > gas_limit {
            return Err(PrecompileError::OutOfGas);
        }

        let mut padded = [0u8; 128];
        let len = input.len().min(128);
        padded[..len].copy_from_slice(&input[..len]);

        let mut hash = [0u8; 32];
        hash.copy_from_slice(&padded[0..32]);
        let v = padded[63];
        let r = U256::from_big_endian(&padded[64..96]);
        let s = U256::from_big_endian(&padded[96..128]);

        if v != 27 && v != 28 {
            return Ok(PrecompileOutput {
                gas_used: ECRECOVER_GAS,
                output: Vec::new(),
            });
        }

        match recover_address(&hash, r, s, v - 27) {
            Ok(address) => {
                let mut output = vec![0u8; 32];
                output[12..].copy_from_slice(&address);
                Ok(PrecompileOutput {
                    gas_used: ECRECOVER_GAS,
                    output,
                })
            }
            Err(_) => Ok(PrecompileOutput {
                gas_used: ECRECOVER_GAS,
                output: Vec::new(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_crypto::Secp256k1KeyPair;
    use shared_types::keccak256;

    #[test]
    fn recovers_the_signer_left_padded_to_32_bytes() {
        let keypair = Secp256k1KeyPair::from_bytes(&[3u8; 32]).unwrap();
        let hash = keccak256(b"precompile input");
        let (r, s, y_parity) = keypair.sign(&hash).unwrap();

        let mut input = [0u8; 128];
        input[0..32].copy_from_slice(&hash);
        input[63] = 27 + y_parity;
        r.to_big_endian(&mut input[64..96]);
        s.to_big_endian(&mut input[96..128]);

        let result = Ecrecover.execute(&input, 100_000).unwrap();
        assert_eq!(result.gas_used, ECRECOVER_GAS);
        assert_eq!(&result.output[..12], &[0u8; 12]);
        assert_eq!(&result.output[12..], &keypair.address());
    }

    #[test]
    fn invalid_v_returns_empty_output_not_an_error() {
        let mut input = [0u8; 128];
        input[63] = 30;
        let result = Ecrecover.execute(&input, 100_000).unwrap();
        assert!(result.output.is_empty());
    }

    #[test]
    fn insufficient_gas_is_rejected() {
        assert!(matches!(
            Ecrecover.execute(&[0u8; 128], 100),
            Err(PrecompileError::OutOfGas)
        ));
    }
}
