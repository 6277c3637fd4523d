//! Primitive encode/decode of integers and length-prefixed byte strings.
//!
//! Fixed-width encoders write native byte order and never fail; decoders
//! consume a prefix of the input and leave the buffer untouched (by
//! returning `None`) if too short, rather than panicking.

use crate::error::{Result, StorageError};
use crate::utils::num::{u32_to_usize, u64_to_usize};

const VARINT_TAG_U16: u8 = 0xF1;
const VARINT_TAG_U32: u8 = 0xF2;
const VARINT_TAG_U64: u8 = 0xF3;
const VARINT_TAG_MIN: u8 = 0xF0;

pub fn encode_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_ne_bytes());
}

pub fn encode_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_ne_bytes());
}

/// Returns `None` if `data` is shorter than 4 bytes.
pub fn decode_u32(data: &[u8]) -> Option<(u32, &[u8])> {
    if data.len() < 4 {
        return None;
    }
    let (head, rest) = data.split_at(4);
    let mut arr = [0u8; 4];
    arr.copy_from_slice(head);
    Some((u32::from_ne_bytes(arr), rest))
}

/// Returns `None` if `data` is shorter than 8 bytes.
pub fn decode_u64(data: &[u8]) -> Option<(u64, &[u8])> {
    if data.len() < 8 {
        return None;
    }
    let (head, rest) = data.split_at(8);
    let mut arr = [0u8; 8];
    arr.copy_from_slice(head);
    Some((u64::from_ne_bytes(arr), rest))
}

/// Encodes `v` with a single leading byte discriminator:
/// - `v < 0xF0`: one byte `v`.
/// - `v <= 0xFFFF`: tag `0xF1` + 2 bytes little-endian.
/// - `v <= 0xFFFFFFFF`: tag `0xF2` + 4 bytes little-endian.
/// - otherwise: tag `0xF3` + 8 bytes little-endian.
pub fn encode_varint(buf: &mut Vec<u8>, v: u64) {
    if v < u64::from(VARINT_TAG_MIN) {
        buf.push(v as u8);
    } else if v <= u64::from(u16::MAX) {
        buf.push(VARINT_TAG_U16);
        buf.extend_from_slice(&(v as u16).to_le_bytes());
    } else if v <= u64::from(u32::MAX) {
        buf.push(VARINT_TAG_U32);
        buf.extend_from_slice(&(v as u32).to_le_bytes());
    } else {
        buf.push(VARINT_TAG_U64);
        buf.extend_from_slice(&v.to_le_bytes());
    }
}

/// Decodes a varint, returning the value and the remaining slice.
///
/// An unrecognized tag byte in `[0xF4, 0xFF]`, or a truncated payload, fails
/// with `StorageError::Corruption`.
pub fn decode_varint(data: &[u8]) -> Result<(u64, &[u8])> {
    let &tag = data
        .first()
        .ok_or_else(|| StorageError::corruption("varint: empty input"))?;
    if tag < VARINT_TAG_MIN {
        return Ok((u64::from(tag), &data[1..]));
    }
    let rest = &data[1..];
    match tag {
        VARINT_TAG_U16 => {
            if rest.len() < 2 {
                return Err(StorageError::corruption("varint: truncated u16 payload"));
            }
            let mut arr = [0u8; 2];
            arr.copy_from_slice(&rest[..2]);
            Ok((u64::from(u16::from_le_bytes(arr)), &rest[2..]))
        }
        VARINT_TAG_U32 => {
            if rest.len() < 4 {
                return Err(StorageError::corruption("varint: truncated u32 payload"));
            }
            let mut arr = [0u8; 4];
            arr.copy_from_slice(&rest[..4]);
            Ok((u64::from(u32::from_le_bytes(arr)), &rest[4..]))
        }
        VARINT_TAG_U64 => {
            if rest.len() < 8 {
                return Err(StorageError::corruption("varint: truncated u64 payload"));
            }
            let mut arr = [0u8; 8];
            arr.copy_from_slice(&rest[..8]);
            Ok((u64::from_le_bytes(arr), &rest[8..]))
        }
        _ => Err(StorageError::corruption(format!("varint: unrecognized tag {tag:#x}"))),
    }
}

pub fn encode_slice(buf: &mut Vec<u8>, s: &[u8]) {
    encode_u32(buf, s.len() as u32);
    buf.extend_from_slice(s);
}

pub fn decode_slice(data: &[u8]) -> Result<(&[u8], &[u8])> {
    let (len, rest) = decode_u32(data).ok_or_else(|| StorageError::corruption("slice: truncated length"))?;
    let len = u32_to_usize(len);
    if rest.len() < len {
        return Err(StorageError::corruption("slice: truncated payload"));
    }
    Ok((&rest[..len], &rest[len..]))
}

/// Convenience for varint-prefixed byte strings used in block entries.
pub fn decode_varint_slice(data: &[u8]) -> Result<(&[u8], &[u8])> {
    let (len, rest) = decode_varint(data)?;
    let len = u64_to_usize(len).ok_or_else(|| StorageError::corruption("varint slice: length overflows usize"))?;
    if rest.len() < len {
        return Err(StorageError::corruption("varint slice: truncated payload"));
    }
    Ok((&rest[..len], &rest[len..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_width_round_trip() {
        let mut buf = Vec::new();
        encode_u32(&mut buf, 0xdead_beef);
        encode_u64(&mut buf, 0x0123_4567_89ab_cdef);
        let (a, rest) = decode_u32(&buf).unwrap();
        assert_eq!(a, 0xdead_beef);
        let (b, rest) = decode_u64(rest).unwrap();
        assert_eq!(b, 0x0123_4567_89ab_cdef);
        assert!(rest.is_empty());
    }

    #[test]
    fn decode_u32_too_short_returns_none() {
        assert!(decode_u32(&[1, 2, 3]).is_none());
    }

    #[test]
    fn varint_boundaries_round_trip() {
        for v in [0u64, 1, 0xEF, 0xF0, 0xFFFF, 0x1_0000, u32::MAX as u64, u32::MAX as u64 + 1, u64::MAX] {
            let mut buf = Vec::new();
            encode_varint(&mut buf, v);
            let (decoded, rest) = decode_varint(&buf).unwrap();
            assert_eq!(decoded, v, "roundtrip failed for {v}");
            assert!(rest.is_empty());
        }
    }

    #[test]
    fn varint_tag_sizes_are_minimal() {
        let mut buf = Vec::new();
        encode_varint(&mut buf, 5);
        assert_eq!(buf.len(), 1);
        buf.clear();
        encode_varint(&mut buf, 0xFFFF);
        assert_eq!(buf.len(), 3);
        buf.clear();
        encode_varint(&mut buf, 0xFFFF_FFFF);
        assert_eq!(buf.len(), 5);
        buf.clear();
        encode_varint(&mut buf, u64::MAX);
        assert_eq!(buf.len(), 9);
    }

    #[test]
    fn unrecognized_tag_is_corruption() {
        let err = decode_varint(&[0xF4]).unwrap_err();
        assert!(matches!(err, StorageError::Corruption(_)));
    }

    #[test]
    fn slice_round_trip() {
        let mut buf = Vec::new();
        encode_slice(&mut buf, b"hello world");
        let (s, rest) = decode_slice(&buf).unwrap();
        assert_eq!(s, b"hello world");
        assert!(rest.is_empty());
    }
}
