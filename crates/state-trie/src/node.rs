//! The four node shapes of a Modified Merkle Patricia Trie.

use crate::errors::TrieError;
use crate::nibbles::Nibbles;
use shared_types::rlp::Item;
use shared_types::{keccak256, Hash};

/// Root hash of an empty trie: `kec256(RLP(""))`.
pub use shared_types::EMPTY_TRIE_ROOT;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    Empty,
    /// `[hex_prefix(path, leaf=true), value]`
    Leaf { path: Nibbles, value: Vec<u8> },
    /// `[hex_prefix(path, leaf=false), child_hash]`
    Extension { path: Nibbles, child: Hash },
    /// `[child_0, .., child_15, value]`, each child a 32-byte hash or empty string.
    Branch {
        children: Box<[Option<Hash>; 16]>,
        value: Option<Vec<u8>>,
    },
}

impl Node {
    #[must_use]
    pub fn rlp_encode(&self) -> Vec<u8> {
        match self {
            Node::Empty => vec![0x80],
            Node::Leaf { path, value } => {
                let item = Item::list(vec![
                    Item::bytes(path.encode_hex_prefix(true)),
                    Item::bytes(value.clone()),
                ]);
                shared_types::rlp::encode(&item)
            }
            Node::Extension { path, child } => {
                let item = Item::list(vec![
                    Item::bytes(path.encode_hex_prefix(false)),
                    Item::bytes(child.to_vec()),
                ]);
                shared_types::rlp::encode(&item)
            }
            Node::Branch { children, value } => {
                let mut items = Vec::with_capacity(17);
                for child in children.iter() {
                    items.push(match child {
                        Some(hash) => Item::bytes(hash.to_vec()),
                        None => Item::bytes(vec![]),
                    });
                }
                items.push(match value {
                    Some(v) => Item::bytes(v.clone()),
                    None => Item::bytes(vec![]),
                });
                shared_types::rlp::encode(&Item::list(items))
            }
        }
    }

    /// `kec256(RLP(node))`. Children below 32 bytes are not inlined: every
    /// reference is a full hash, trading the usual RLP-node space saving for
    /// a simpler, uniformly hash-addressed node store (see DESIGN.md).
    #[must_use]
    pub fn hash(&self) -> Hash {
        if matches!(self, Node::Empty) {
            return EMPTY_TRIE_ROOT;
        }
        keccak256(&self.rlp_encode())
    }

    /// Reconstruct a node from its stored RLP encoding.
    pub fn decode(data: &[u8]) -> Result<Node, TrieError> {
        let item = shared_types::rlp::decode(data)
            .map_err(|e| TrieError::Malformed(e.to_string()))?;
        let fields = match item {
            Item::List(fields) => fields,
            Item::Bytes(_) => return Err(TrieError::Malformed("node is not a list".into())),
        };

        match fields.len() {
            2 => {
                let path_bytes = fields[0]
                    .as_bytes()
                    .map_err(|e| TrieError::Malformed(e.to_string()))?;
                let (path, is_leaf) = Nibbles::decode_hex_prefix(path_bytes);
                if is_leaf {
                    let value = fields[1]
                        .as_bytes()
                        .map_err(|e| TrieError::Malformed(e.to_string()))?
                        .to_vec();
                    Ok(Node::Leaf { path, value })
                } else {
                    let child_bytes = fields[1]
                        .as_bytes()
                        .map_err(|e| TrieError::Malformed(e.to_string()))?;
                    let child = to_hash(child_bytes)?;
                    Ok(Node::Extension { path, child })
                }
            }
            17 => {
                let mut children: [Option<Hash>; 16] = [None; 16];
                for (i, field) in fields.iter().take(16).enumerate() {
                    let bytes = field
                        .as_bytes()
                        .map_err(|e| TrieError::Malformed(e.to_string()))?;
                    if !bytes.is_empty() {
                        children[i] = Some(to_hash(bytes)?);
                    }
                }
                let value = match fields[16]
                    .as_bytes()
                    .map_err(|e| TrieError::Malformed(e.to_string()))?
                {
                    b if b.is_empty() => None,
                    b => Some(b.to_vec()),
                };
                Ok(Node::Branch {
                    children: Box::new(children),
                    value,
                })
            }
            n => Err(TrieError::Malformed(format!(
                "node list has unexpected arity {n}"
            ))),
        }
    }
}

fn to_hash(bytes: &[u8]) -> Result<Hash, TrieError> {
    if bytes.len() != 32 {
        return Err(TrieError::Malformed(format!(
            "expected 32-byte hash, got {} bytes",
            bytes.len()
        )));
    }
    let mut hash = [0u8; 32];
    hash.copy_from_slice(bytes);
    Ok(hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_hash_is_deterministic_and_not_empty_root() {
        let leaf = Node::Leaf {
            path: Nibbles(vec![1, 2, 3, 4]),
            value: vec![0xAB, 0xCD],
        };
        assert_eq!(leaf.hash(), leaf.hash());
        assert_ne!(leaf.hash(), EMPTY_TRIE_ROOT);
    }

    #[test]
    fn empty_hashes_to_empty_trie_root() {
        assert_eq!(Node::Empty.hash(), EMPTY_TRIE_ROOT);
    }

    #[test]
    fn different_values_hash_differently() {
        let a = Node::Leaf {
            path: Nibbles(vec![1]),
            value: vec![1],
        };
        let b = Node::Leaf {
            path: Nibbles(vec![1]),
            value: vec![2],
        };
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn leaf_survives_encode_decode_round_trip() {
        let node = Node::Leaf {
            path: Nibbles(vec![1, 2, 3]),
            value: vec![0xDE, 0xAD, 0xBE, 0xEF],
        };
        let decoded = Node::decode(&node.rlp_encode()).unwrap();
        assert_eq!(decoded, node);
    }

    #[test]
    fn branch_survives_encode_decode_round_trip() {
        let mut children: [Option<Hash>; 16] = [None; 16];
        children[3] = Some([7u8; 32]);
        children[9] = Some([9u8; 32]);
        let node = Node::Branch {
            children: Box::new(children),
            value: Some(vec![1, 2]),
        };
        let decoded = Node::decode(&node.rlp_encode()).unwrap();
        assert_eq!(decoded, node);
    }

    #[test]
    fn extension_survives_encode_decode_round_trip() {
        let node = Node::Extension {
            path: Nibbles(vec![1, 2, 3, 4]),
            child: [5u8; 32],
        };
        let decoded = Node::decode(&node.rlp_encode()).unwrap();
        assert_eq!(decoded, node);
    }
}
