//! Wire messages exchanged with a peer (SPEC_FULL.md §6 "External
//! interfaces"): the opcode set and its RLP framing are in scope here; the
//! encrypted RLPx/DEVP2P transport that would carry these bytes between two
//! real processes is not — every message in this module is expressed
//! against the abstract [`crate::peer::PeerHandle`] port a transport
//! adapter would implement, not against a socket.
//!
//! Grounded on `shared_types::rlp`'s `Item` tree, the same codec the ledger
//! uses for headers, transactions, and trie nodes, so the wire format here
//! needs no encoder of its own.

use shared_types::rlp::{self, Item};
use shared_types::{Block, BlockHeader, Hash, Receipt, SignedTransaction, U256};

/// A query for `GetBlockHeaders`: the ETC/ETH wire protocol addresses the
/// starting point either by number or by hash.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HeaderQuery {
    Number(u64),
    Hash(Hash),
}

/// One wire message. Opcodes follow the base protocol (0x00-0x03) plus the
/// `eth`-style sub-protocol offset of +0x10 used by SPEC_FULL.md §6.
#[derive(Clone, Debug)]
pub enum Message {
    Hello { protocol_version: u64, network_id: u64, node_id: String },
    Disconnect { reason: String },
    Ping,
    Pong,
    Status { protocol_version: u64, network_id: u64, total_difficulty: U256, best_hash: Hash, genesis_hash: Hash },
    NewBlockHashes(Vec<(Hash, u64)>),
    Transactions(Vec<SignedTransaction>),
    GetBlockHeaders { start: HeaderQuery, max_headers: u64, skip: u64, reverse: bool },
    BlockHeaders(Vec<BlockHeader>),
    GetBlockBodies(Vec<Hash>),
    BlockBodies(Vec<Block>),
    NewBlock { block: Block, total_difficulty: U256 },
    GetNodeData(Vec<Hash>),
    NodeData(Vec<Vec<u8>>),
    GetReceipts(Vec<Hash>),
    Receipts(Vec<Vec<Receipt>>),
}

impl Message {
    #[must_use]
    pub fn opcode(&self) -> u8 {
        match self {
            Message::Hello { .. } => 0x00,
            Message::Disconnect { .. } => 0x01,
            Message::Ping => 0x02,
            Message::Pong => 0x03,
            Message::Status { .. } => 0x10,
            Message::NewBlockHashes(_) => 0x11,
            Message::Transactions(_) => 0x12,
            Message::GetBlockHeaders { .. } => 0x13,
            Message::BlockHeaders(_) => 0x14,
            Message::GetBlockBodies(_) => 0x15,
            Message::BlockBodies(_) => 0x16,
            Message::NewBlock { .. } => 0x17,
            Message::GetNodeData(_) => 0x18,
            Message::NodeData(_) => 0x19,
            Message::GetReceipts(_) => 0x1a,
            Message::Receipts(_) => 0x1b,
        }
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let payload = match self {
            Message::Hello { protocol_version, network_id, node_id } => Item::list(vec![
                Item::uint(*protocol_version),
                Item::uint(*network_id),
                Item::bytes(node_id.clone().into_bytes()),
            ]),
            Message::Disconnect { reason } => Item::list(vec![Item::bytes(reason.clone().into_bytes())]),
            Message::Ping | Message::Pong => Item::list(vec![]),
            Message::Status { protocol_version, network_id, total_difficulty, best_hash, genesis_hash } => {
                Item::list(vec![
                    Item::uint(*protocol_version),
                    Item::uint(*network_id),
                    Item::u256(*total_difficulty),
                    Item::bytes(best_hash.to_vec()),
                    Item::bytes(genesis_hash.to_vec()),
                ])
            }
            Message::NewBlockHashes(entries) => Item::list(
                entries.iter().map(|(hash, number)| Item::list(vec![Item::bytes(hash.to_vec()), Item::uint(*number)])).collect(),
            ),
            Message::Transactions(txs) => {
                Item::list(txs.iter().map(|tx| rlp::decode(&tx.encode()).expect("SignedTransaction::encode is valid rlp")).collect())
            }
            Message::GetBlockHeaders { start, max_headers, skip, reverse } => Item::list(vec![
                encode_header_query(start),
                Item::uint(*max_headers),
                Item::uint(*skip),
                Item::uint(if *reverse { 1 } else { 0 }),
            ]),
            Message::BlockHeaders(headers) => Item::list(headers.iter().map(BlockHeader::to_item).collect()),
            Message::GetBlockBodies(hashes) => Item::list(hashes.iter().map(|h| Item::bytes(h.to_vec())).collect()),
            Message::BlockBodies(blocks) => Item::list(blocks.iter().map(encode_body).collect()),
            Message::NewBlock { block, total_difficulty } => {
                Item::list(vec![encode_full_block(block), Item::u256(*total_difficulty)])
            }
            Message::GetNodeData(hashes) | Message::GetReceipts(hashes) => {
                Item::list(hashes.iter().map(|h| Item::bytes(h.to_vec())).collect())
            }
            Message::NodeData(blobs) => Item::list(blobs.iter().map(|b| Item::bytes(b.clone())).collect()),
            Message::Receipts(sets) => Item::list(
                sets.iter().map(|receipts| Item::list(receipts.iter().map(Receipt::to_item).collect())).collect(),
            ),
        };
        rlp::encode(&Item::list(vec![Item::uint(u64::from(self.opcode())), payload]))
    }

    pub fn decode(bytes: &[u8]) -> Result<Message, crate::errors::SyncError> {
        let item = rlp::decode(bytes).map_err(crate::errors::SyncError::Rlp)?;
        let fields = item.as_list().map_err(crate::errors::SyncError::Rlp)?;
        if fields.len() != 2 {
            return Err(crate::errors::SyncError::Protocol("message frame must be [opcode, payload]".into()));
        }
        let opcode = fields[0].as_u64().map_err(crate::errors::SyncError::Rlp)?;
        let payload = fields[1].as_list().map_err(crate::errors::SyncError::Rlp)?;

        let err = |msg: &str| crate::errors::SyncError::Protocol(msg.to_string());
        match opcode {
            0x00 => Ok(Message::Hello {
                protocol_version: payload[0].as_u64()?,
                network_id: payload[1].as_u64()?,
                node_id: String::from_utf8(payload[2].as_bytes()?.to_vec()).map_err(|_| err("node_id is not utf-8"))?,
            }),
            0x01 => Ok(Message::Disconnect {
                reason: String::from_utf8(payload[0].as_bytes()?.to_vec()).map_err(|_| err("reason is not utf-8"))?,
            }),
            0x02 => Ok(Message::Ping),
            0x03 => Ok(Message::Pong),
            0x10 => Ok(Message::Status {
                protocol_version: payload[0].as_u64()?,
                network_id: payload[1].as_u64()?,
                total_difficulty: payload[2].as_u256()?,
                best_hash: to_hash(payload[3].as_bytes()?)?,
                genesis_hash: to_hash(payload[4].as_bytes()?)?,
            }),
            0x11 => {
                let mut entries = Vec::with_capacity(payload.len());
                for entry in payload {
                    let fields = entry.as_list()?;
                    entries.push((to_hash(fields[0].as_bytes()?)?, fields[1].as_u64()?));
                }
                Ok(Message::NewBlockHashes(entries))
            }
            0x12 => {
                let mut txs = Vec::with_capacity(payload.len());
                for tx_item in payload {
                    txs.push(SignedTransaction::decode(&rlp::encode(tx_item))?);
                }
                Ok(Message::Transactions(txs))
            }
            0x13 => Ok(Message::GetBlockHeaders {
                start: decode_header_query(&payload[0])?,
                max_headers: payload[1].as_u64()?,
                skip: payload[2].as_u64()?,
                reverse: payload[3].as_u64()? != 0,
            }),
            0x14 => {
                let mut headers = Vec::with_capacity(payload.len());
                for header_item in payload {
                    headers.push(BlockHeader::decode(&rlp::encode(header_item))?);
                }
                Ok(Message::BlockHeaders(headers))
            }
            0x15 => Ok(Message::GetBlockBodies(decode_hash_list(payload)?)),
            0x16 => {
                let mut blocks = Vec::with_capacity(payload.len());
                for body_item in payload {
                    blocks.push(decode_body(body_item)?);
                }
                Ok(Message::BlockBodies(blocks))
            }
            0x17 => Ok(Message::NewBlock {
                block: decode_full_block(&payload[0])?,
                total_difficulty: payload[1].as_u256()?,
            }),
            0x18 => Ok(Message::GetNodeData(decode_hash_list(payload)?)),
            0x19 => Ok(Message::NodeData(payload.iter().map(|i| i.as_bytes().map(<[u8]>::to_vec)).collect::<Result<_, _>>()?)),
            0x1a => Ok(Message::GetReceipts(decode_hash_list(payload)?)),
            0x1b => {
                let mut sets = Vec::with_capacity(payload.len());
                for set_item in payload {
                    let mut receipts = Vec::new();
                    for receipt_item in set_item.as_list()? {
                        receipts.push(decode_receipt(receipt_item)?);
                    }
                    sets.push(receipts);
                }
                Ok(Message::Receipts(sets))
            }
            other => Err(err(&format!("unrecognised opcode {other:#x}"))),
        }
    }
}

fn encode_header_query(query: &HeaderQuery) -> Item {
    match query {
        HeaderQuery::Number(number) => Item::list(vec![Item::uint(0), Item::uint(*number)]),
        HeaderQuery::Hash(hash) => Item::list(vec![Item::uint(1), Item::bytes(hash.to_vec())]),
    }
}

fn decode_header_query(item: &Item) -> Result<HeaderQuery, crate::errors::SyncError> {
    let fields = item.as_list()?;
    match fields[0].as_u64()? {
        0 => Ok(HeaderQuery::Number(fields[1].as_u64()?)),
        1 => Ok(HeaderQuery::Hash(to_hash(fields[1].as_bytes()?)?)),
        other => Err(crate::errors::SyncError::Protocol(format!("unrecognised header query tag {other}"))),
    }
}

fn encode_body(block: &Block) -> Item {
    let tx_items = block.transactions.iter().map(|tx| rlp::decode(&tx.encode()).expect("valid rlp")).collect();
    let ommer_items = block.ommers.iter().map(BlockHeader::to_item).collect();
    Item::list(vec![Item::list(tx_items), Item::list(ommer_items), block.header.to_item()])
}

fn decode_body(item: &Item) -> Result<Block, crate::errors::SyncError> {
    let fields = item.as_list()?;
    if fields.len() != 3 {
        return Err(crate::errors::SyncError::Protocol("block body frame must be [txs, ommers, header]".into()));
    }
    let mut transactions = Vec::new();
    for tx_item in fields[0].as_list()? {
        transactions.push(SignedTransaction::decode(&rlp::encode(tx_item))?);
    }
    let mut ommers = Vec::new();
    for ommer_item in fields[1].as_list()? {
        ommers.push(BlockHeader::decode(&rlp::encode(ommer_item))?);
    }
    let header = BlockHeader::decode(&rlp::encode(&fields[2]))?;
    Ok(Block { header, transactions, ommers })
}

fn encode_full_block(block: &Block) -> Item {
    encode_body(block)
}

fn decode_full_block(item: &Item) -> Result<Block, crate::errors::SyncError> {
    decode_body(item)
}

fn decode_receipt(item: &Item) -> Result<Receipt, crate::errors::SyncError> {
    Receipt::decode(&rlp::encode(item)).map_err(Into::into)
}

fn decode_hash_list(items: &[Item]) -> Result<Vec<Hash>, crate::errors::SyncError> {
    items.iter().map(|i| to_hash(i.as_bytes()?)).collect()
}

fn to_hash(bytes: &[u8]) -> Result<Hash, crate::errors::SyncError> {
    if bytes.len() != 32 {
        return Err(crate::errors::SyncError::Protocol(format!("expected a 32-byte hash, got {} bytes", bytes.len())));
    }
    let mut hash = [0u8; 32];
    hash.copy_from_slice(bytes);
    Ok(hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_pong_round_trip() {
        let encoded = Message::Ping.encode();
        assert!(matches!(Message::decode(&encoded).unwrap(), Message::Ping));
    }

    #[test]
    fn status_round_trips_every_field() {
        let message = Message::Status {
            protocol_version: 63,
            network_id: 1,
            total_difficulty: U256::from(123_456u64),
            best_hash: [7u8; 32],
            genesis_hash: [9u8; 32],
        };
        let decoded = Message::decode(&message.encode()).unwrap();
        match decoded {
            Message::Status { protocol_version, network_id, total_difficulty, best_hash, genesis_hash } => {
                assert_eq!(protocol_version, 63);
                assert_eq!(network_id, 1);
                assert_eq!(total_difficulty, U256::from(123_456u64));
                assert_eq!(best_hash, [7u8; 32]);
                assert_eq!(genesis_hash, [9u8; 32]);
            }
            other => panic!("expected Status, got {other:?}"),
        }
    }

    #[test]
    fn get_block_headers_round_trips_a_number_query() {
        let message = Message::GetBlockHeaders { start: HeaderQuery::Number(42), max_headers: 192, skip: 0, reverse: false };
        let decoded = Message::decode(&message.encode()).unwrap();
        match decoded {
            Message::GetBlockHeaders { start, max_headers, skip, reverse } => {
                assert_eq!(start, HeaderQuery::Number(42));
                assert_eq!(max_headers, 192);
                assert_eq!(skip, 0);
                assert!(!reverse);
            }
            other => panic!("expected GetBlockHeaders, got {other:?}"),
        }
    }

    #[test]
    fn get_node_data_round_trips_a_hash_list() {
        let message = Message::GetNodeData(vec![[1u8; 32], [2u8; 32]]);
        let decoded = Message::decode(&message.encode()).unwrap();
        match decoded {
            Message::GetNodeData(hashes) => assert_eq!(hashes, vec![[1u8; 32], [2u8; 32]]),
            other => panic!("expected GetNodeData, got {other:?}"),
        }
    }
}
