//! Recursive Length Prefix (RLP) encoding and decoding.
//!
//! Grounded on the hand-rolled per-field `rlp_encode_*` helpers in the
//! teacher's state-management crate, generalised here into a full
//! encoder/decoder over an intermediate `Item` tree so every crate that needs
//! RLP (header hashing, trie nodes, transactions, receipts) shares one
//! implementation instead of re-deriving field-by-field encoders.

use crate::errors::RlpError;

/// An RLP value: either a byte string or a list of further items.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Item {
    Bytes(Vec<u8>),
    List(Vec<Item>),
}

impl Item {
    #[must_use]
    pub fn bytes(b: impl Into<Vec<u8>>) -> Self {
        Item::Bytes(b.into())
    }

    #[must_use]
    pub fn list(items: Vec<Item>) -> Self {
        Item::List(items)
    }

    /// Encode a `u64` as its minimal big-endian byte form (zero ⇒ empty string).
    #[must_use]
    pub fn uint(value: u64) -> Self {
        Item::Bytes(strip_leading_zeros(&value.to_be_bytes()))
    }

    /// Encode a 256-bit unsigned integer the same way.
    #[must_use]
    pub fn u256(value: primitive_types::U256) -> Self {
        let mut buf = [0u8; 32];
        value.to_big_endian(&mut buf);
        Item::Bytes(strip_leading_zeros(&buf))
    }

    pub fn as_bytes(&self) -> Result<&[u8], RlpError> {
        match self {
            Item::Bytes(b) => Ok(b),
            Item::List(_) => Err(RlpError::UnexpectedType),
        }
    }

    pub fn as_list(&self) -> Result<&[Item], RlpError> {
        match self {
            Item::List(items) => Ok(items),
            Item::Bytes(_) => Err(RlpError::UnexpectedType),
        }
    }

    pub fn as_u64(&self) -> Result<u64, RlpError> {
        let bytes = self.as_bytes()?;
        if bytes.len() > 8 {
            return Err(RlpError::IntegerTooLarge);
        }
        let mut buf = [0u8; 8];
        buf[8 - bytes.len()..].copy_from_slice(bytes);
        Ok(u64::from_be_bytes(buf))
    }

    pub fn as_u256(&self) -> Result<primitive_types::U256, RlpError> {
        let bytes = self.as_bytes()?;
        if bytes.len() > 32 {
            return Err(RlpError::IntegerTooLarge);
        }
        Ok(primitive_types::U256::from_big_endian(bytes))
    }
}

fn strip_leading_zeros(bytes: &[u8]) -> Vec<u8> {
    let first_nonzero = bytes.iter().position(|&b| b != 0);
    match first_nonzero {
        Some(idx) => bytes[idx..].to_vec(),
        None => Vec::new(),
    }
}

/// Encode an [`Item`] tree into its canonical RLP byte representation.
#[must_use]
pub fn encode(item: &Item) -> Vec<u8> {
    match item {
        Item::Bytes(bytes) => encode_bytes(bytes),
        Item::List(items) => {
            let mut payload = Vec::new();
            for child in items {
                payload.extend(encode(child));
            }
            encode_length(payload.len(), 0xc0, &payload)
        }
    }
}

fn encode_bytes(bytes: &[u8]) -> Vec<u8> {
    if bytes.len() == 1 && bytes[0] < 0x80 {
        return vec![bytes[0]];
    }
    encode_length(bytes.len(), 0x80, bytes)
}

fn encode_length(len: usize, offset: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(len + 9);
    if len < 56 {
        out.push(offset + len as u8);
    } else {
        let len_bytes = strip_leading_zeros(&(len as u64).to_be_bytes());
        out.push(offset + 55 + len_bytes.len() as u8);
        out.extend_from_slice(&len_bytes);
    }
    out.extend_from_slice(payload);
    out
}

/// Decode a complete RLP byte string into an [`Item`] tree.
pub fn decode(data: &[u8]) -> Result<Item, RlpError> {
    let (item, rest) = decode_one(data)?;
    if !rest.is_empty() {
        return Err(RlpError::TrailingBytes);
    }
    Ok(item)
}

fn decode_one(data: &[u8]) -> Result<(Item, &[u8]), RlpError> {
    let first = *data.first().ok_or(RlpError::UnexpectedEof)?;
    if first < 0x80 {
        Ok((Item::Bytes(vec![first]), &data[1..]))
    } else if first < 0xb8 {
        let len = (first - 0x80) as usize;
        let body = data.get(1..1 + len).ok_or(RlpError::UnexpectedEof)?;
        Ok((Item::Bytes(body.to_vec()), &data[1 + len..]))
    } else if first < 0xc0 {
        let len_of_len = (first - 0xb7) as usize;
        let len_bytes = data.get(1..1 + len_of_len).ok_or(RlpError::UnexpectedEof)?;
        let len = be_to_usize(len_bytes)?;
        let body = data
            .get(1 + len_of_len..1 + len_of_len + len)
            .ok_or(RlpError::UnexpectedEof)?;
        Ok((Item::Bytes(body.to_vec()), &data[1 + len_of_len + len..]))
    } else if first < 0xf8 {
        let len = (first - 0xc0) as usize;
        let body = data.get(1..1 + len).ok_or(RlpError::UnexpectedEof)?;
        Ok((Item::List(decode_list_body(body)?), &data[1 + len..]))
    } else {
        let len_of_len = (first - 0xf7) as usize;
        let len_bytes = data.get(1..1 + len_of_len).ok_or(RlpError::UnexpectedEof)?;
        let len = be_to_usize(len_bytes)?;
        let body = data
            .get(1 + len_of_len..1 + len_of_len + len)
            .ok_or(RlpError::UnexpectedEof)?;
        Ok((
            Item::List(decode_list_body(body)?),
            &data[1 + len_of_len + len..],
        ))
    }
}

fn decode_list_body(mut body: &[u8]) -> Result<Vec<Item>, RlpError> {
    let mut items = Vec::new();
    while !body.is_empty() {
        let (item, rest) = decode_one(body)?;
        items.push(item);
        body = rest;
    }
    Ok(items)
}

fn be_to_usize(bytes: &[u8]) -> Result<usize, RlpError> {
    if bytes.len() > 8 {
        return Err(RlpError::IntegerTooLarge);
    }
    let mut buf = [0u8; 8];
    buf[8 - bytes.len()..].copy_from_slice(bytes);
    Ok(u64::from_be_bytes(buf) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_empty_string_as_single_byte() {
        assert_eq!(encode(&Item::bytes(Vec::<u8>::new())), vec![0x80]);
    }

    #[test]
    fn encodes_single_small_byte_verbatim() {
        assert_eq!(encode(&Item::bytes(vec![0x01])), vec![0x01]);
        assert_eq!(encode(&Item::bytes(vec![0x7f])), vec![0x7f]);
    }

    #[test]
    fn encodes_short_string() {
        let dog = b"dog".to_vec();
        assert_eq!(encode(&Item::bytes(dog)), vec![0x83, b'd', b'o', b'g']);
    }

    #[test]
    fn encodes_empty_list() {
        assert_eq!(encode(&Item::list(vec![])), vec![0xc0]);
    }

    #[test]
    fn round_trips_nested_list() {
        let item = Item::list(vec![
            Item::bytes(vec![1, 2, 3]),
            Item::list(vec![Item::bytes(vec![]), Item::uint(1024)]),
        ]);
        let encoded = encode(&item);
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded, item);
    }

    #[test]
    fn round_trips_long_string() {
        let payload = vec![0x42u8; 100];
        let item = Item::bytes(payload.clone());
        let encoded = encode(&item);
        assert_eq!(decode(&encoded).unwrap(), item);
    }

    #[test]
    fn uint_zero_is_empty_string() {
        assert_eq!(Item::uint(0), Item::bytes(Vec::<u8>::new()));
    }

    #[test]
    fn rejects_trailing_bytes() {
        let mut bytes = encode(&Item::uint(5));
        bytes.push(0xff);
        assert!(decode(&bytes).is_err());
    }
}
