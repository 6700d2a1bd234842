//! Byte layout of pack files.
//!
//! ```text
//! "EVMP" | version: u32 BE
//! record*: kind: u8 | raw_len: varint | packed_len: varint | crc32: u32 BE | zstd(bincode(payload))
//! "EVME" | blake3(every preceding byte): [u8; 32]
//! ```

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::entry::RecordKind;
use crate::error::{PackError, PackResult};

pub const MAGIC: &[u8; 4] = b"EVMP";
pub const TRAILER_MAGIC: &[u8; 4] = b"EVME";
pub const VERSION: u32 = 1;
pub const HEADER_LEN: usize = 8;
pub const CHECKSUM_LEN: usize = 32;
pub const TRAILER_LEN: usize = 4 + CHECKSUM_LEN;

const COMPRESSION_LEVEL: i32 = 3;

pub fn header() -> [u8; HEADER_LEN] {
    let mut out = [0u8; HEADER_LEN];
    out[..4].copy_from_slice(MAGIC);
    out[4..].copy_from_slice(&VERSION.to_be_bytes());
    out
}

/// Append `value` as a LEB128 varint.
pub(crate) fn put_varint(buf: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        buf.push((value as u8) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

/// Read a LEB128 varint from the front of `input`, advancing it.
pub(crate) fn take_varint(input: &mut &[u8]) -> Option<u64> {
    let mut value = 0u64;
    for (i, &byte) in input.iter().enumerate().take(10) {
        value |= u64::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            *input = &input[i + 1..];
            return Some(value);
        }
    }
    None
}

/// Serialize, compress and frame one record.
pub(crate) fn encode_record<T: Serialize>(kind: RecordKind, payload: &T) -> PackResult<Vec<u8>> {
    let raw = bincode::serialize(payload).map_err(|e| PackError::Serialization(e.to_string()))?;
    let packed = zstd::encode_all(raw.as_slice(), COMPRESSION_LEVEL)
        .map_err(|e| PackError::CompressionFailed(e.to_string()))?;

    let mut out = Vec::with_capacity(packed.len() + 16);
    out.push(kind.tag());
    put_varint(&mut out, raw.len() as u64);
    put_varint(&mut out, packed.len() as u64);
    out.extend_from_slice(&crc32fast::hash(&packed).to_be_bytes());
    out.extend_from_slice(&packed);
    Ok(out)
}

/// A framed record whose payload is still compressed.
#[derive(Clone, Debug)]
pub struct RawRecord {
    pub kind: RecordKind,
    /// Offset of the record in the pack file.
    pub offset: u64,
    pub raw_len: usize,
    pub packed: Bytes,
}

impl RawRecord {
    pub fn decode<T: DeserializeOwned>(&self) -> PackResult<T> {
        let raw = zstd::decode_all(self.packed.as_ref())
            .map_err(|e| PackError::DecompressionFailed(e.to_string()))?;
        if raw.len() != self.raw_len {
            return Err(PackError::CorruptRecord {
                offset: self.offset,
                reason: format!("size mismatch: expected {}, got {}", self.raw_len, raw.len()),
            });
        }
        bincode::deserialize(&raw).map_err(|e| PackError::Serialization(e.to_string()))
    }
}

/// Split the record area of a pack into records.
///
/// `body` holds everything between header and trailer and starts at file
/// offset `base`. Payloads are zero-copy slices of `body`.
pub(crate) fn split_records(body: &Bytes, base: u64) -> PackResult<Vec<RawRecord>> {
    let mut records = Vec::new();
    let mut pos = 0usize;
    while pos < body.len() {
        let offset = base + pos as u64;
        let corrupt = |reason: &str| PackError::CorruptRecord {
            offset,
            reason: reason.into(),
        };

        let mut cursor = &body[pos..];
        let (&tag, rest) = cursor.split_first().ok_or_else(|| corrupt("empty record"))?;
        cursor = rest;
        let kind = RecordKind::from_tag(tag)
            .ok_or_else(|| corrupt(&format!("unknown record kind {tag}")))?;
        let raw_len = take_varint(&mut cursor).ok_or_else(|| corrupt("truncated length"))?;
        let packed_len = take_varint(&mut cursor).ok_or_else(|| corrupt("truncated length"))?;
        if cursor.len() < 4 {
            return Err(corrupt("truncated checksum"));
        }
        let crc = u32::from_be_bytes([cursor[0], cursor[1], cursor[2], cursor[3]]);
        cursor = &cursor[4..];

        let packed_len = usize::try_from(packed_len).map_err(|_| corrupt("record too large"))?;
        let raw_len = usize::try_from(raw_len).map_err(|_| corrupt("record too large"))?;
        if cursor.len() < packed_len {
            return Err(corrupt("record extends beyond pack"));
        }
        let start = body.len() - cursor.len();
        let packed = body.slice(start..start + packed_len);
        if crc32fast::hash(&packed) != crc {
            return Err(PackError::CrcMismatch { offset });
        }

        records.push(RawRecord {
            kind,
            offset,
            raw_len,
            packed,
        });
        pos = start + packed_len;
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn varint(value: u64) -> Vec<u8> {
        let mut buf = Vec::new();
        put_varint(&mut buf, value);
        buf
    }

    #[test]
    fn varint_lengths() {
        assert_eq!(varint(0), vec![0]);
        assert_eq!(varint(127), vec![127]);
        assert_eq!(varint(128), vec![0x80, 0x01]);
        assert_eq!(varint(u64::MAX).len(), 10);
    }

    #[test]
    fn varint_advances_input() {
        let mut buf = varint(300);
        buf.push(0xAA);
        let mut input = buf.as_slice();
        assert_eq!(take_varint(&mut input), Some(300));
        assert_eq!(input, &[0xAA]);
    }

    #[test]
    fn varint_max() {
        let buf = varint(u64::MAX);
        assert_eq!(take_varint(&mut buf.as_slice()), Some(u64::MAX));
    }

    #[test]
    fn truncated_varint() {
        assert_eq!(take_varint(&mut &[0x80u8][..]), None);
        assert_eq!(take_varint(&mut &[][..]), None);
    }

    #[test]
    fn records_split_back() {
        let mut body = encode_record(RecordKind::Event, &vec![1u32, 2, 3]).unwrap();
        body.extend(encode_record(RecordKind::Metadata, &String::from("meta")).unwrap());
        let body = Bytes::from(body);

        let records = split_records(&body, HEADER_LEN as u64).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].kind, RecordKind::Event);
        assert_eq!(records[0].offset, HEADER_LEN as u64);
        assert_eq!(records[0].decode::<Vec<u32>>().unwrap(), vec![1, 2, 3]);
        assert_eq!(records[1].decode::<String>().unwrap(), "meta");
    }

    #[test]
    fn flipped_payload_byte_fails_crc() {
        let mut body = encode_record(RecordKind::Event, &vec![7u8; 64]).unwrap();
        let last = body.len() - 1;
        body[last] ^= 0xFF;
        let err = split_records(&Bytes::from(body), 0).unwrap_err();
        assert!(matches!(err, PackError::CrcMismatch { offset: 0 }));
    }

    #[test]
    fn truncated_record() {
        let mut body = encode_record(RecordKind::Event, &vec![7u8; 64]).unwrap();
        body.truncate(body.len() - 3);
        let err = split_records(&Bytes::from(body), 0).unwrap_err();
        assert!(matches!(err, PackError::CorruptRecord { .. }));
    }

    #[test]
    fn unknown_kind() {
        let mut body = encode_record(RecordKind::Event, &1u8).unwrap();
        body[0] = 9;
        let err = split_records(&Bytes::from(body), 0).unwrap_err();
        assert!(matches!(err, PackError::CorruptRecord { ref reason, .. } if reason.contains('9')));
    }
}
