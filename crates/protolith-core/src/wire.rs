//! Protobuf wire format helpers.
//!
//! Generated code never states a field's wire type directly. It shows up
//! either as the full tag passed to a codec factory (`(number << 3) | wire`)
//! or as the raw tag bytes written ahead of a value. Both are decoded here.
//!
//! Wire types:
//! - 0: VARINT (int32, int64, uint32, uint64, sint32, sint64, bool, enum)
//! - 1: I64 (fixed64, sfixed64, double)
//! - 2: LEN (string, bytes, embedded messages, packed repeated fields)
//! - 5: I32 (fixed32, sfixed32, float)

use crate::error::{Error, Result};
use std::fmt;

/// Protobuf wire types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WireType {
    /// Variable-length integer
    Varint = 0,
    /// 64-bit fixed-width
    I64 = 1,
    /// Length-delimited (strings, bytes, embedded messages, packed repeated)
    Len = 2,
    /// Start group (deprecated)
    StartGroup = 3,
    /// End group (deprecated)
    EndGroup = 4,
    /// 32-bit fixed-width
    I32 = 5,
}

impl TryFrom<u8> for WireType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::I64),
            2 => Ok(WireType::Len),
            3 => Ok(WireType::StartGroup),
            4 => Ok(WireType::EndGroup),
            5 => Ok(WireType::I32),
            _ => Err(Error::invalid_tag(
                value as u64,
                format!("unknown wire type: {}", value),
            )),
        }
    }
}

/// Maximum valid protobuf field number (2^29 - 1)
pub const MAX_FIELD_NUMBER: u32 = 536_870_911;

/// Encode a value as a minimal little-endian base-128 varint.
///
/// Every byte but the last has its continuation bit set.
pub fn encode_varint(mut value: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(10);
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return out;
        }
        out.push(byte | 0x80);
    }
}

/// Decode a varint from the given bytes.
///
/// Returns the decoded value and the number of bytes consumed.
pub fn decode_varint(data: &[u8]) -> Result<(u64, usize)> {
    let mut result: u64 = 0;
    let mut shift = 0;

    for (i, &byte) in data.iter().enumerate() {
        if i >= 10 {
            // Varints are at most 10 bytes for a 64-bit value
            return Err(Error::varint_decode(i));
        }

        result |= ((byte & 0x7F) as u64) << shift;
        shift += 7;

        if byte & 0x80 == 0 {
            return Ok((result, i + 1));
        }
    }

    Err(Error::varint_decode(data.len()))
}

/// A decoded field tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
    /// Field number
    pub number: u32,
    /// Wire type of the encoded value
    pub wire_type: WireType,
}

impl Tag {
    /// Splits a raw tag value as passed to codec factories.
    ///
    /// The wire type is taken from the low three bits of the first varint
    /// byte of the encoded tag.
    pub fn from_raw(raw: u64) -> Result<Self> {
        let first = encode_varint(raw)[0];
        let wire_type = WireType::try_from(first & 0x07).map_err(|_| {
            Error::invalid_tag(raw, format!("unknown wire type {}", first & 0x07))
        })?;

        let number = raw >> 3;
        if number == 0 || number > MAX_FIELD_NUMBER as u64 {
            return Err(Error::invalid_tag(
                raw,
                format!("field number {} outside 1..={}", number, MAX_FIELD_NUMBER),
            ));
        }

        Ok(Self {
            number: number as u32,
            wire_type,
        })
    }

    /// Decodes a tag from raw tag bytes, returning it and the bytes consumed
    pub fn decode(data: &[u8]) -> Result<(Self, usize)> {
        let (raw, len) = decode_varint(data)?;
        Ok((Self::from_raw(raw)?, len))
    }

    /// Returns true if the tag announces length-delimited data
    pub fn is_length_delimited(&self) -> bool {
        self.wire_type == WireType::Len
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} ({:?})", self.number, self.wire_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_encode_varint_split() {
        assert_eq!(encode_varint(300), vec![0xAC, 0x02]);
        assert_eq!(encode_varint(1), vec![0x01]);
        assert_eq!(encode_varint(0), vec![0x00]);
        assert_eq!(encode_varint(127), vec![0x7F]);
        assert_eq!(encode_varint(128), vec![0x80, 0x01]);
    }

    #[test]
    fn test_decode_varint_multi_byte() {
        let data = [0xAC, 0x02]; // Value 300
        let (value, len) = decode_varint(&data).unwrap();
        assert_eq!(value, 300);
        assert_eq!(len, 2);
    }

    #[test]
    fn test_varint_max() {
        let data = encode_varint(u64::MAX);
        assert_eq!(data.len(), 10);
        assert_eq!(decode_varint(&data).unwrap(), (u64::MAX, 10));
    }

    #[test]
    fn test_decode_varint_truncated() {
        assert!(matches!(
            decode_varint(&[0x80, 0x80]),
            Err(Error::VarintDecode { position: 2 })
        ));
    }

    #[test]
    fn test_wire_type_conversion() {
        assert_eq!(WireType::try_from(0).unwrap(), WireType::Varint);
        assert_eq!(WireType::try_from(2).unwrap(), WireType::Len);
        assert_eq!(WireType::try_from(5).unwrap(), WireType::I32);
        assert!(WireType::try_from(6).is_err());
    }

    #[test]
    fn test_tag_from_raw() {
        // Field 2, packed repeated
        let tag = Tag::from_raw(18).unwrap();
        assert_eq!(tag.number, 2);
        assert!(tag.is_length_delimited());

        // Field 37, varint
        let tag = Tag::from_raw(296).unwrap();
        assert_eq!(tag.number, 37);
        assert_eq!(tag.wire_type, WireType::Varint);
    }

    #[test]
    fn test_tag_from_raw_rejects_invalid() {
        assert!(Tag::from_raw(2).is_err()); // field 0
        assert!(Tag::from_raw(14).is_err()); // wire type 6
    }

    #[test]
    fn test_tag_decode() {
        let (tag, len) = Tag::decode(&[0xA2, 0x06]).unwrap();
        assert_eq!(tag.number, 100);
        assert_eq!(tag.wire_type, WireType::Len);
        assert_eq!(len, 2);
    }
}
