//! TLV8: tag-length-value records, one byte tag, one byte length.
//!
//! Values over 255 bytes split into consecutive same-tag records; a
//! repeated tag separated by a different tag (or by the `0xFF`
//! separator record) becomes a list-valued entry instead of coalescing.

use hap_core::{Error, Result};
use std::collections::HashMap;

/// The reserved separator tag. Carries no value; ends a coalescing run
/// without itself becoming an entry.
pub const SEPARATOR: u8 = 0xFF;

/// A decoded TLV entry's value: either a single buffer, or (when the
/// same tag recurred across a separator/different tag) a list of
/// buffers in encounter order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlvItem {
    Value(Vec<u8>),
    List(Vec<Vec<u8>>),
}

impl TlvItem {
    /// The single buffer, if this entry is not a list.
    pub fn as_value(&self) -> Option<&[u8]> {
        match self {
            TlvItem::Value(v) => Some(v),
            TlvItem::List(_) => None,
        }
    }
}

/// An ordered collection of tag -> value, in first-occurrence order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tlv8 {
    entries: Vec<(u8, TlvItem)>,
}

impl Tlv8 {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a single-value entry.
    pub fn push(mut self, tag: u8, value: impl Into<Vec<u8>>) -> Self {
        self.entries.push((tag, TlvItem::Value(value.into())));
        self
    }

    /// Append a list-valued entry (encoded with `0xFF` separators
    /// between elements).
    pub fn push_list(mut self, tag: u8, values: Vec<Vec<u8>>) -> Self {
        self.entries.push((tag, TlvItem::List(values)));
        self
    }

    pub fn get(&self, tag: u8) -> Option<&TlvItem> {
        self.entries.iter().find(|(t, _)| *t == tag).map(|(_, v)| v)
    }

    /// Convenience accessor for the common case of a single-valued tag.
    pub fn get_value(&self, tag: u8) -> Option<&[u8]> {
        self.get(tag).and_then(TlvItem::as_value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(u8, TlvItem)> {
        self.entries.iter()
    }
}

fn encode_run(out: &mut Vec<u8>, tag: u8, value: &[u8]) {
    if value.is_empty() {
        out.push(tag);
        out.push(0);
        return;
    }
    for chunk in value.chunks(255) {
        out.push(tag);
        out.push(chunk.len() as u8);
        out.extend_from_slice(chunk);
    }
}

/// Encode entries in insertion order. List entries emit a `(0xFF, 0)`
/// separator record between elements, never before the first or after
/// the last.
pub fn encode(tlv: &Tlv8) -> Vec<u8> {
    let mut out = Vec::new();
    for (tag, item) in &tlv.entries {
        match item {
            TlvItem::Value(v) => encode_run(&mut out, *tag, v),
            TlvItem::List(values) => {
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        out.push(SEPARATOR);
                        out.push(0);
                    }
                    encode_run(&mut out, *tag, v);
                }
            }
        }
    }
    out
}

/// Decode a buffer of TLV8 records.
///
/// Returns [`Error::Protocol`] if the buffer ends mid-record (a tag
/// with no length byte, or a length byte claiming more bytes than
/// remain).
pub fn decode(bytes: &[u8]) -> Result<Tlv8> {
    let mut raw: Vec<(u8, Vec<u8>)> = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if i + 1 >= bytes.len() {
            return Err(Error::protocol("truncated tlv record: missing length byte"));
        }
        let tag = bytes[i];
        let len = bytes[i + 1] as usize;
        let start = i + 2;
        let end = start + len;
        if end > bytes.len() {
            return Err(Error::protocol("truncated tlv record: value shorter than declared length"));
        }
        raw.push((tag, bytes[start..end].to_vec()));
        i = end;
    }

    // Coalesce immediately-consecutive same-tag records (fragment
    // reassembly); a separator or an intervening different tag ends
    // the run.
    let mut groups: Vec<(u8, Vec<u8>)> = Vec::new();
    let mut prev_tag: Option<u8> = None;
    for (tag, value) in raw {
        if tag == SEPARATOR {
            prev_tag = None;
            continue;
        }
        if prev_tag == Some(tag) {
            groups.last_mut().expect("prev_tag implies a prior group").1.extend(value);
        } else {
            groups.push((tag, value));
        }
        prev_tag = Some(tag);
    }

    // Merge groups that share a tag (separated runs) into list entries.
    let mut entries: Vec<(u8, TlvItem)> = Vec::new();
    let mut index: HashMap<u8, usize> = HashMap::new();
    for (tag, value) in groups {
        match index.get(&tag) {
            None => {
                index.insert(tag, entries.len());
                entries.push((tag, TlvItem::Value(value)));
            }
            Some(&i) => match &mut entries[i].1 {
                TlvItem::Value(existing) => {
                    let first = std::mem::take(existing);
                    entries[i].1 = TlvItem::List(vec![first, value]);
                }
                TlvItem::List(list) => list.push(value),
            },
        }
    }

    Ok(Tlv8 { entries })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_simple_entries() {
        let tlv = Tlv8::new().push(6, vec![1]).push(1, vec![0]);
        let decoded = decode(&encode(&tlv)).unwrap();
        assert_eq!(decoded, tlv);
    }

    #[test]
    fn coalesces_consecutive_same_tag_records() {
        let bytes = [0x01, 0x03, 0xAA, 0xBB, 0xCC, 0x01, 0x02, 0xDD, 0xEE];
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.get_value(1), Some(&[0xAA, 0xBB, 0xCC, 0xDD, 0xEE][..]));
    }

    #[test]
    fn coalesces_fragmented_255_byte_value() {
        let mut bytes = vec![0x01, 0xFF];
        bytes.extend(std::iter::repeat(0x41).take(255));
        bytes.extend([0x01, 0x01, 0x5A]);
        let decoded = decode(&bytes).unwrap();
        let value = decoded.get_value(1).unwrap();
        assert_eq!(value.len(), 256);
        assert_eq!(value[255], 0x5A);
    }

    #[test]
    fn separator_splits_repeated_tag_into_list() {
        let tlv = Tlv8::new().push_list(2, vec![vec![1, 2], vec![3, 4]]);
        let bytes = encode(&tlv);
        assert_eq!(bytes, vec![2, 2, 1, 2, 0xFF, 0, 2, 2, 3, 4]);
        let decoded = decode(&bytes).unwrap();
        match decoded.get(2).unwrap() {
            TlvItem::List(items) => assert_eq!(items, &vec![vec![1, 2], vec![3, 4]]),
            TlvItem::Value(_) => panic!("expected list"),
        }
    }

    #[test]
    fn encode_splits_values_over_255_bytes() {
        let value = vec![7u8; 510];
        let tlv = Tlv8::new().push(9, value.clone());
        let bytes = encode(&tlv);
        // Two full 255-byte fragments, no short final fragment.
        assert_eq!(bytes.len(), 2 * (2 + 255));
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.get_value(9), Some(&value[..]));
    }

    #[test]
    fn decode_rejects_truncated_record() {
        assert!(decode(&[1, 5, 1, 2]).is_err());
        assert!(decode(&[1]).is_err());
    }

    #[test]
    fn ble_pdu_tlv_body_round_trips() {
        // {1:[0x01]} as used in a characteristic write request body.
        let tlv = Tlv8::new().push(1, vec![0x01]);
        assert_eq!(encode(&tlv), vec![1, 1, 1]);
    }
}
