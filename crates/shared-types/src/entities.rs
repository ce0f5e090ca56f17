//! Core ETC domain entities.
//!
//! Grounded on `shared-types/src/entities.rs`'s struct layout and serde
//! conventions, rewritten from the teacher's Ed25519/PoS fields (`PublicKey`,
//! `Validator`, `Attestation`, `ConsensusProof`) to ECDSA/secp256k1 + PoW
//! fields named in SPEC_FULL.md §3 (`difficulty`, `mix_hash`, 8-byte `nonce`,
//! `ommers_hash`, `logs_bloom`).

use crate::bloom::LogBloom;
use crate::errors::RlpError;
use crate::rlp::{self, Item};
use crate::{keccak256, Address, Hash, EMPTY_CODE_HASH, EMPTY_TRIE_ROOT, U256};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};

/// An account as stored in the world-state trie.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub nonce: u64,
    pub balance: U256,
    pub storage_root: Hash,
    pub code_hash: Hash,
}

impl Account {
    /// A freshly created, empty account per the yellow paper's `EMPTY` predicate.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            nonce: 0,
            balance: U256::zero(),
            storage_root: EMPTY_TRIE_ROOT,
            code_hash: EMPTY_CODE_HASH,
        }
    }

    /// True for nonce=0, balance=0, no code — the yellow paper's `DEAD` predicate
    /// (modulo storage, which does not affect emptiness).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nonce == 0 && self.balance.is_zero() && self.code_hash == EMPTY_CODE_HASH
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        rlp::encode(&Item::list(vec![
            Item::uint(self.nonce),
            Item::u256(self.balance),
            Item::bytes(self.storage_root.to_vec()),
            Item::bytes(self.code_hash.to_vec()),
        ]))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, RlpError> {
        let item = rlp::decode(bytes)?;
        let fields = item.as_list()?;
        if fields.len() != 4 {
            return Err(RlpError::ArityMismatch);
        }
        let storage_root = fields[2].as_bytes()?;
        let code_hash = fields[3].as_bytes()?;
        Ok(Self {
            nonce: fields[0].as_u64()?,
            balance: fields[1].as_u256()?,
            storage_root: to_hash(storage_root)?,
            code_hash: to_hash(code_hash)?,
        })
    }
}

fn to_hash(bytes: &[u8]) -> Result<Hash, RlpError> {
    let mut padded = [0u8; 32];
    if bytes.len() > 32 {
        return Err(RlpError::IntegerTooLarge);
    }
    padded[32 - bytes.len()..].copy_from_slice(bytes);
    Ok(padded)
}

/// A block header. Hash is `kec256(RLP(self))`.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub parent_hash: Hash,
    pub ommers_hash: Hash,
    pub beneficiary: Address,
    pub state_root: Hash,
    pub transactions_root: Hash,
    pub receipts_root: Hash,
    #[serde_as(as = "Bytes")]
    pub logs_bloom: LogBloom,
    pub difficulty: U256,
    pub number: u64,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub timestamp: u64,
    pub extra_data: Vec<u8>,
    pub mix_hash: Hash,
    pub nonce: [u8; 8],
}

impl BlockHeader {
    #[must_use]
    pub fn to_item(&self) -> Item {
        Item::list(vec![
            Item::bytes(self.parent_hash.to_vec()),
            Item::bytes(self.ommers_hash.to_vec()),
            Item::bytes(self.beneficiary.to_vec()),
            Item::bytes(self.state_root.to_vec()),
            Item::bytes(self.transactions_root.to_vec()),
            Item::bytes(self.receipts_root.to_vec()),
            Item::bytes(self.logs_bloom.to_vec()),
            Item::u256(self.difficulty),
            Item::uint(self.number),
            Item::uint(self.gas_limit),
            Item::uint(self.gas_used),
            Item::uint(self.timestamp),
            Item::bytes(self.extra_data.clone()),
            Item::bytes(self.mix_hash.to_vec()),
            Item::bytes(self.nonce.to_vec()),
        ])
    }

    /// RLP encoding omitting `mix_hash`/`nonce`, the PoW-mining input.
    #[must_use]
    pub fn encode_without_nonce(&self) -> Vec<u8> {
        let full = self.to_item();
        let fields = full.as_list().expect("header is always a list").to_vec();
        rlp::encode(&Item::list(fields[..13].to_vec()))
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        rlp::encode(&self.to_item())
    }

    /// `kec256(RLP(header))`, the canonical block hash.
    #[must_use]
    pub fn hash(&self) -> Hash {
        keccak256(&self.encode())
    }

    #[must_use]
    pub fn is_genesis(&self) -> bool {
        self.number == 0 && self.parent_hash == [0u8; 32]
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, RlpError> {
        let item = rlp::decode(bytes)?;
        let f = item.as_list()?;
        if f.len() != 15 {
            return Err(RlpError::ArityMismatch);
        }
        let mut logs_bloom = [0u8; 256];
        logs_bloom.copy_from_slice(f[6].as_bytes()?);
        let mut nonce = [0u8; 8];
        let nonce_bytes = f[14].as_bytes()?;
        nonce[8 - nonce_bytes.len()..].copy_from_slice(nonce_bytes);
        Ok(Self {
            parent_hash: to_hash(f[0].as_bytes()?)?,
            ommers_hash: to_hash(f[1].as_bytes()?)?,
            beneficiary: {
                let b = f[2].as_bytes()?;
                let mut addr = [0u8; 20];
                addr.copy_from_slice(b);
                addr
            },
            state_root: to_hash(f[3].as_bytes()?)?,
            transactions_root: to_hash(f[4].as_bytes()?)?,
            receipts_root: to_hash(f[5].as_bytes()?)?,
            logs_bloom,
            difficulty: f[7].as_u256()?,
            number: f[8].as_u64()?,
            gas_limit: f[9].as_u64()?,
            gas_used: f[10].as_u64()?,
            timestamp: f[11].as_u64()?,
            extra_data: f[12].as_bytes()?.to_vec(),
            mix_hash: to_hash(f[13].as_bytes()?)?,
            nonce,
        })
    }
}

/// A block body: transactions plus at most two ommer headers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<SignedTransaction>,
    pub ommers: Vec<BlockHeader>,
}

impl Block {
    #[must_use]
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }
}

/// Transaction signature plus payload, pre-signature-recovery.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub nonce: u64,
    pub gas_price: U256,
    pub gas_limit: u64,
    pub to: Option<Address>,
    pub value: U256,
    pub data: Vec<u8>,
    pub v: u64,
    pub r: U256,
    pub s: U256,
}

impl SignedTransaction {
    /// Is this a contract-creation transaction.
    #[must_use]
    pub fn is_create(&self) -> bool {
        self.to.is_none()
    }

    /// RLP item for the six unsigned fields, used both for the pre-image that
    /// gets signed and (with v/r/s appended) for the final wire encoding.
    fn unsigned_item(&self) -> Item {
        Item::list(vec![
            Item::uint(self.nonce),
            Item::u256(self.gas_price),
            Item::uint(self.gas_limit),
            match self.to {
                Some(addr) => Item::bytes(addr.to_vec()),
                None => Item::bytes(Vec::new()),
            },
            Item::u256(self.value),
            Item::bytes(self.data.clone()),
        ])
    }

    /// The EIP-155 chain id mixed into `v`, if this transaction uses it.
    #[must_use]
    pub fn chain_id(&self) -> Option<u64> {
        if self.v >= 35 {
            Some((self.v - 35) / 2)
        } else {
            None
        }
    }

    /// `y_parity` (0 or 1) recovered from `v`, independent of chain-id encoding.
    #[must_use]
    pub fn y_parity(&self) -> u8 {
        if self.v == 27 || self.v == 28 {
            (self.v - 27) as u8
        } else {
            // EIP-155: v = chain_id * 2 + 35 + y_parity
            ((self.v - 35) % 2) as u8
        }
    }

    /// The RLP pre-image that is signed: the unsigned fields, plus
    /// `(chain_id, 0, 0)` appended when EIP-155 is in effect.
    #[must_use]
    pub fn signing_hash(&self, eip155_chain_id: Option<u64>) -> Hash {
        let item = match eip155_chain_id {
            Some(chain_id) => {
                let mut fields = self.unsigned_item().as_list().unwrap().to_vec();
                fields.push(Item::uint(chain_id));
                fields.push(Item::uint(0));
                fields.push(Item::uint(0));
                Item::list(fields)
            }
            None => self.unsigned_item(),
        };
        keccak256(&rlp::encode(&item))
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut fields = self.unsigned_item().as_list().unwrap().to_vec();
        fields.push(Item::uint(self.v));
        fields.push(Item::u256(self.r));
        fields.push(Item::u256(self.s));
        rlp::encode(&Item::list(fields))
    }

    /// `kec256(RLP(self))`, the transaction's hash.
    #[must_use]
    pub fn hash(&self) -> Hash {
        keccak256(&self.encode())
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, RlpError> {
        let item = rlp::decode(bytes)?;
        let f = item.as_list()?;
        if f.len() != 9 {
            return Err(RlpError::ArityMismatch);
        }
        let to_bytes = f[3].as_bytes()?;
        let to = if to_bytes.is_empty() {
            None
        } else {
            let mut addr = [0u8; 20];
            addr.copy_from_slice(to_bytes);
            Some(addr)
        };
        Ok(Self {
            nonce: f[0].as_u64()?,
            gas_price: f[1].as_u256()?,
            gas_limit: f[2].as_u64()?,
            to,
            value: f[4].as_u256()?,
            data: f[5].as_bytes()?.to_vec(),
            v: f[6].as_u64()?,
            r: f[7].as_u256()?,
            s: f[8].as_u256()?,
        })
    }

    /// Intrinsic gas: `21000 + 32000 if create + 68/4 per non-zero/zero byte`.
    #[must_use]
    pub fn intrinsic_gas(&self) -> u64 {
        let mut gas = 21_000u64;
        if self.is_create() {
            gas += 32_000;
        }
        for byte in &self.data {
            gas += if *byte == 0 { 4 } else { 68 };
        }
        gas
    }

    /// `gas_limit * gas_price + value`, the balance needed up front.
    #[must_use]
    pub fn up_front_cost(&self) -> U256 {
        U256::from(self.gas_limit)
            .saturating_mul(self.gas_price)
            .saturating_add(self.value)
    }
}

/// A single EVM log entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    pub address: Address,
    pub topics: Vec<Hash>,
    pub data: Vec<u8>,
}

impl Log {
    #[must_use]
    pub fn to_item(&self) -> Item {
        Item::list(vec![
            Item::bytes(self.address.to_vec()),
            Item::list(self.topics.iter().map(|t| Item::bytes(t.to_vec())).collect()),
            Item::bytes(self.data.clone()),
        ])
    }

    #[must_use]
    pub fn bloom_contribution(&self) -> LogBloom {
        crate::bloom::log_bloom(&self.address, &self.topics)
    }
}

/// A transaction receipt.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub post_state_root: Hash,
    pub cumulative_gas_used: u64,
    #[serde_as(as = "Bytes")]
    pub logs_bloom: LogBloom,
    pub logs: Vec<Log>,
}

impl Receipt {
    #[must_use]
    pub fn to_item(&self) -> Item {
        Item::list(vec![
            Item::bytes(self.post_state_root.to_vec()),
            Item::uint(self.cumulative_gas_used),
            Item::bytes(self.logs_bloom.to_vec()),
            Item::list(self.logs.iter().map(Log::to_item).collect()),
        ])
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        rlp::encode(&self.to_item())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_account_matches_well_known_hashes() {
        let acc = Account::empty();
        assert_eq!(acc.storage_root, EMPTY_TRIE_ROOT);
        assert_eq!(acc.code_hash, EMPTY_CODE_HASH);
        assert!(acc.is_empty());
    }

    #[test]
    fn account_round_trips_through_rlp() {
        let acc = Account {
            nonce: 7,
            balance: U256::from(12345u64),
            storage_root: [0x11; 32],
            code_hash: [0x22; 32],
        };
        let decoded = Account::decode(&acc.encode()).unwrap();
        assert_eq!(acc, decoded);
    }

    #[test]
    fn header_round_trips_through_rlp() {
        let header = sample_header();
        let decoded = BlockHeader::decode(&header.encode()).unwrap();
        assert_eq!(header, decoded);
    }

    #[test]
    fn genesis_detection() {
        let mut header = sample_header();
        header.number = 0;
        header.parent_hash = [0u8; 32];
        assert!(header.is_genesis());
    }

    #[test]
    fn transaction_round_trips_through_rlp() {
        let tx = sample_tx();
        let decoded = SignedTransaction::decode(&tx.encode()).unwrap();
        assert_eq!(tx, decoded);
    }

    #[test]
    fn intrinsic_gas_accounts_for_create_and_payload() {
        let mut tx = sample_tx();
        tx.to = None;
        tx.data = vec![0x00, 0x01, 0x00];
        assert_eq!(tx.intrinsic_gas(), 21_000 + 32_000 + 4 + 68 + 4);
    }

    #[test]
    fn eip155_chain_id_extraction() {
        let mut tx = sample_tx();
        tx.v = 61; // chain_id 61 (ETC mainnet) * 2 + 35
        assert_eq!(tx.chain_id(), Some(61));
        tx.v = 27;
        assert_eq!(tx.chain_id(), None);
    }

    fn sample_header() -> BlockHeader {
        BlockHeader {
            parent_hash: [1u8; 32],
            ommers_hash: [2u8; 32],
            beneficiary: [3u8; 20],
            state_root: [4u8; 32],
            transactions_root: [5u8; 32],
            receipts_root: [6u8; 32],
            logs_bloom: [0u8; 256],
            difficulty: U256::from(131_072u64),
            number: 1,
            gas_limit: 5_000_000,
            gas_used: 0,
            timestamp: 1_438_269_988,
            extra_data: vec![],
            mix_hash: [7u8; 32],
            nonce: [0u8; 8],
        }
    }

    fn sample_tx() -> SignedTransaction {
        SignedTransaction {
            nonce: 0,
            gas_price: U256::from(20_000_000_000u64),
            gas_limit: 21_000,
            to: Some([9u8; 20]),
            value: U256::from(1_000_000_000_000_000_000u64),
            data: vec![],
            v: 27,
            r: U256::from(1u64),
            s: U256::from(1u64),
        }
    }
}
