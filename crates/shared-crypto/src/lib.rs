//! Cryptographic primitives used by the ledger and sync engine: secp256k1
//! ECDSA signing/verification/recovery and the keccak hashing re-exported
//! from `shared_types`.
//!
//! Grounded on `shared-crypto/src/ecdsa.rs`'s keypair/signature shape and
//! `Drop`-zeroize discipline for secret material, extended with a
//! recoverable-signature path (`ecrecover`) that the teacher's crate lacked:
//! sender recovery is required by SPEC_FULL.md §4.7 but the teacher's
//! `Secp256k1Signature` stored only `r||s`, no recovery id.

pub mod ecdsa;

pub use ecdsa::*;
