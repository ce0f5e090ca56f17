//! # Shared Types Crate
//!
//! Domain entities shared by every crate in the workspace: hashes, addresses,
//! accounts, blocks, transactions, receipts, and the RLP codec they are all
//! serialised with. This is the single source of truth for cross-crate wire
//! and storage shapes.

pub mod bloom;
pub mod entities;
pub mod errors;
pub mod rlp;

pub use entities::*;
pub use errors::*;

/// A 32-byte Keccak-256 digest.
pub type Hash = [u8; 32];

/// A 20-byte account address.
pub type Address = [u8; 20];

/// 256-bit unsigned integer used throughout the EVM and account model.
pub type U256 = primitive_types::U256;

/// Keccak-256 of an empty byte string, `kec256("")`.
pub const EMPTY_CODE_HASH: Hash = [
    0xc5, 0xd2, 0x46, 0x01, 0x86, 0xf7, 0x23, 0x3c, 0x92, 0x7e, 0x7d, 0xb2, 0xdc, 0xc7, 0x03, 0xc0,
    0xe5, 0x00, 0xb6, 0x53, 0xca, 0x82, 0x27, 0x3b, 0x7b, 0xfa, 0xd8, 0x04, 0x5d, 0x85, 0xa4, 0x70,
];

/// Keccak-256 of the RLP encoding of the empty string, the root of an empty MPT.
pub const EMPTY_TRIE_ROOT: Hash = [
    0x56, 0xe8, 0x1f, 0x17, 0x1b, 0xcc, 0x55, 0xa6, 0xff, 0x83, 0x45, 0xe6, 0x92, 0xc0, 0xf8, 0x6e,
    0x5b, 0x48, 0xe0, 0x1b, 0x99, 0x6c, 0xad, 0xc0, 0x01, 0x62, 0x2f, 0xb5, 0xe3, 0x63, 0xb4, 0x21,
];

/// `kec256` of a byte slice.
#[must_use]
pub fn keccak256(data: &[u8]) -> Hash {
    use sha3::{Digest, Keccak256};
    let mut hasher = Keccak256::new();
    hasher.update(data);
    let out = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&out);
    hash
}

/// `kec512` of a byte slice (used by the simplified PoW check).
#[must_use]
pub fn keccak512(data: &[u8]) -> [u8; 64] {
    use sha3::{Digest, Keccak512};
    let mut hasher = Keccak512::new();
    hasher.update(data);
    let out = hasher.finalize();
    let mut hash = [0u8; 64];
    hash.copy_from_slice(&out);
    hash
}
