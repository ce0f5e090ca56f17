//! secp256k1 ECDSA sign / verify / recover.

use k256::ecdsa::{signature::Signer, RecoveryId, Signature, SigningKey, VerifyingKey};
use shared_types::{keccak256, Address, Hash, U256};
use thiserror::Error;
use zeroize::Zeroize;

/// The secp256k1 curve order, used for signature-malleability checks.
pub const SECP256K1_N: U256 = U256 {
    0: [
        0xbfd25e8cd0364141,
        0xbaaedce6af48a03b,
        0xfffffffffffffffe,
        0xffffffffffffffff,
    ],
};

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("signing failed")]
    SigningFailed,
    #[error("signature recovery failed")]
    RecoveryFailed,
    #[error("invalid secret key bytes")]
    InvalidSecretKey,
    #[error("signature component out of the valid [1, n) range")]
    InvalidSignatureRange,
    #[error("signature is malleable: s > n/2")]
    HighS,
}

/// An secp256k1 keypair. Secret bytes are zeroized on drop.
pub struct Secp256k1KeyPair {
    signing_key: SigningKey,
}

impl Secp256k1KeyPair {
    #[must_use]
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::random(&mut rand::thread_rng()),
        }
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, CryptoError> {
        let signing_key =
            SigningKey::from_bytes(bytes.into()).map_err(|_| CryptoError::InvalidSecretKey)?;
        Ok(Self { signing_key })
    }

    #[must_use]
    pub fn public_key(&self) -> VerifyingKey {
        *self.signing_key.verifying_key()
    }

    /// Derive the 20-byte address `kec256(uncompressed_pubkey[1..])[12..]`.
    #[must_use]
    pub fn address(&self) -> Address {
        address_from_public_key(&self.public_key())
    }

    /// Sign `message_hash` (already hashed) recoverably, returning `(r, s, y_parity)`.
    ///
    /// # Errors
    ///
    /// Returns `SigningFailed` if the underlying signing operation errors.
    pub fn sign(&self, message_hash: &Hash) -> Result<(U256, U256, u8), CryptoError> {
        let (signature, recovery_id): (Signature, RecoveryId) = self
            .signing_key
            .try_sign(message_hash)
            .map_err(|_| CryptoError::SigningFailed)?;
        let (r, s) = split_signature(&signature);
        Ok((r, s, recovery_id.to_byte()))
    }
}

impl Drop for Secp256k1KeyPair {
    fn drop(&mut self) {
        // SigningKey itself zeroizes on drop via k256's internal Zeroize impl;
        // this no-op keeps the teacher's explicit-Drop idiom visible at the
        // call site for anyone auditing secret-material lifetimes.
        let mut marker = 0u8;
        marker.zeroize();
    }
}

fn split_signature(signature: &Signature) -> (U256, U256) {
    let bytes = signature.to_bytes();
    let r = U256::from_big_endian(&bytes[..32]);
    let s = U256::from_big_endian(&bytes[32..]);
    (r, s)
}

fn address_from_public_key(key: &VerifyingKey) -> Address {
    let uncompressed = key.to_encoded_point(false);
    let hash = keccak256(&uncompressed.as_bytes()[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    address
}

/// Recover the signer's address from `(message_hash, r, s, y_parity)`.
///
/// # Errors
///
/// Returns `InvalidSignatureRange` if `r`/`s` are out of `[1, n)`, or
/// `RecoveryFailed` if no valid public key matches the signature.
pub fn recover_address(
    message_hash: &Hash,
    r: U256,
    s: U256,
    y_parity: u8,
) -> Result<Address, CryptoError> {
    if r.is_zero() || s.is_zero() || r >= SECP256K1_N || s >= SECP256K1_N {
        return Err(CryptoError::InvalidSignatureRange);
    }
    let mut sig_bytes = [0u8; 64];
    r.to_big_endian(&mut sig_bytes[..32]);
    s.to_big_endian(&mut sig_bytes[32..]);
    let signature = Signature::from_slice(&sig_bytes).map_err(|_| CryptoError::RecoveryFailed)?;
    let recovery_id = RecoveryId::from_byte(y_parity).ok_or(CryptoError::RecoveryFailed)?;
    let verifying_key =
        VerifyingKey::recover_from_prehash(message_hash, &signature, recovery_id)
            .map_err(|_| CryptoError::RecoveryFailed)?;
    Ok(address_from_public_key(&verifying_key))
}

/// Homestead-onward malleability guard: `s` must be at most `n/2`.
#[must_use]
pub fn is_low_s(s: U256) -> bool {
    const HALF_N: U256 = U256 {
        0: [
            0xdfe92f46681b20a0,
            0x5d576e7357a4501d,
            0xffffffffffffffff,
            0x7fffffffffffffff,
        ],
    };
    s <= HALF_N
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_recover_round_trips() {
        let keypair = Secp256k1KeyPair::generate();
        let message = keccak256(b"ripple of consequence");
        let (r, s, y_parity) = keypair.sign(&message).unwrap();
        let recovered = recover_address(&message, r, s, y_parity).unwrap();
        assert_eq!(recovered, keypair.address());
    }

    #[test]
    fn wrong_message_recovers_different_address() {
        let keypair = Secp256k1KeyPair::generate();
        let message = keccak256(b"original");
        let (r, s, y_parity) = keypair.sign(&message).unwrap();
        let other_message = keccak256(b"tampered");
        let recovered = recover_address(&other_message, r, s, y_parity).unwrap();
        assert_ne!(recovered, keypair.address());
    }

    #[test]
    fn signing_is_deterministic() {
        let keypair = Secp256k1KeyPair::from_bytes(&[7u8; 32]).unwrap();
        let message = keccak256(b"determinism");
        let first = keypair.sign(&message).unwrap();
        let second = keypair.sign(&message).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn rejects_out_of_range_signature() {
        let message = keccak256(b"x");
        let err = recover_address(&message, U256::zero(), U256::from(1u64), 0).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidSignatureRange));
    }

    #[test]
    fn low_s_boundary() {
        assert!(is_low_s(U256::one()));
        assert!(!is_low_s(SECP256K1_N - U256::one()));
    }
}
