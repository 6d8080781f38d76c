//! HAP-over-GATT PDU framing: the 5-byte request/response headers and
//! fragmentation across the BLE MTU.

use hap_core::{Error, Result};

/// Control field values carried in byte 0 of every fragment.
pub mod control {
    pub const REQUEST: u8 = 0x00;
    pub const CONTINUATION: u8 = 0x80;
    pub const FRAGMENTED_START: u8 = 0x02;
}

/// HAP PDU opcodes, byte 1 of a request header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    SignatureRead = 1,
    Write = 2,
    Read = 3,
    TimedWrite = 4,
    ExecuteWrite = 5,
    ServiceSignatureRead = 6,
    CharacteristicConfiguration = 7,
    ProtocolConfiguration = 8,
}

/// BLE-over-GATT limits frames to this many bytes after encryption;
/// PDUs longer than this are split across fragments.
pub const MAX_FRAGMENT_LEN: usize = 496;
const CONTINUATION_HEADER_LEN: usize = 2;

/// A request PDU, addressed to a characteristic or service instance id.
pub struct Request {
    pub opcode: Opcode,
    pub tid: u8,
    pub instance_id: u16,
    /// Present for `Write`/`TimedWrite`; `None` for reads, which carry
    /// no body.
    pub body: Option<Vec<u8>>,
}

impl Request {
    pub fn new(opcode: Opcode, tid: u8, instance_id: u16, body: Option<Vec<u8>>) -> Self {
        Self { opcode, tid, instance_id, body }
    }

    /// Serialize the full (unfragmented) PDU.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![control::REQUEST, self.opcode as u8, self.tid];
        out.extend_from_slice(&self.instance_id.to_le_bytes());
        if let Some(body) = &self.body {
            out.extend_from_slice(&(body.len() as u16).to_le_bytes());
            out.extend_from_slice(body);
        }
        out
    }
}

/// A parsed response PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub control_field: u8,
    pub tid: u8,
    pub status: u8,
    pub body: Vec<u8>,
}

/// Parse a full (already-reassembled) response PDU: control field,
/// tid, status, and an optional 2-byte-length-prefixed body.
pub fn parse_response(bytes: &[u8]) -> Result<Response> {
    if bytes.len() < 3 {
        return Err(Error::protocol("HAP PDU response shorter than its 3-byte header"));
    }
    let control_field = bytes[0];
    let tid = bytes[1];
    let status = bytes[2];

    let body = if bytes.len() > 3 {
        if bytes.len() < 5 {
            return Err(Error::protocol("HAP PDU response has a truncated body-length field"));
        }
        let len = u16::from_le_bytes([bytes[3], bytes[4]]) as usize;
        bytes
            .get(5..5 + len)
            .ok_or_else(|| Error::protocol("HAP PDU response body shorter than its declared length"))?
            .to_vec()
    } else {
        Vec::new()
    };

    Ok(Response { control_field, tid, status, body })
}

/// Split a full PDU into fragments no longer than [`MAX_FRAGMENT_LEN`]:
/// the whole PDU if it already fits, otherwise a first fragment
/// (carrying the original header) followed by continuation fragments
/// each prefixed with `(0x80, tid)`.
pub fn fragment(pdu: &[u8], tid: u8) -> Vec<Vec<u8>> {
    if pdu.len() <= MAX_FRAGMENT_LEN {
        return vec![pdu.to_vec()];
    }

    let (first, mut rest) = pdu.split_at(MAX_FRAGMENT_LEN);
    let mut fragments = vec![first.to_vec()];

    while !rest.is_empty() {
        let chunk_len = rest.len().min(MAX_FRAGMENT_LEN - CONTINUATION_HEADER_LEN);
        let (chunk, remainder) = rest.split_at(chunk_len);
        let mut fragment = Vec::with_capacity(CONTINUATION_HEADER_LEN + chunk.len());
        fragment.push(control::CONTINUATION);
        fragment.push(tid);
        fragment.extend_from_slice(chunk);
        fragments.push(fragment);
        rest = remainder;
    }

    fragments
}

/// Reassembles a declared-length PDU from its fragments as they arrive
/// off the wire. The first fragment must carry the full header; the
/// declared total length is read from it once enough bytes are
/// present.
pub struct Reassembler {
    buffer: Vec<u8>,
    declared_total: Option<usize>,
}

impl Reassembler {
    pub fn new() -> Self {
        Self { buffer: Vec::new(), declared_total: None }
    }

    /// Feed the first fragment (carrying the 5-byte response header).
    /// Returns the complete PDU immediately if it was not fragmented.
    pub fn push_first(&mut self, fragment: &[u8]) -> Result<Option<Vec<u8>>> {
        if fragment.len() < 3 {
            return Err(Error::protocol("HAP PDU fragment shorter than its 3-byte header"));
        }
        let declared_total = if fragment.len() >= 5 {
            let body_len = u16::from_le_bytes([fragment[3], fragment[4]]) as usize;
            5 + body_len
        } else {
            fragment.len()
        };
        self.buffer.extend_from_slice(fragment);
        self.declared_total = Some(declared_total);
        Ok(self.take_if_complete())
    }

    /// Feed a continuation fragment, stripping its 2-byte header.
    pub fn push_continuation(&mut self, fragment: &[u8]) -> Result<Option<Vec<u8>>> {
        if fragment.len() < CONTINUATION_HEADER_LEN {
            return Err(Error::protocol("HAP PDU continuation fragment missing its header"));
        }
        self.buffer.extend_from_slice(&fragment[CONTINUATION_HEADER_LEN..]);
        Ok(self.take_if_complete())
    }

    fn take_if_complete(&mut self) -> Option<Vec<u8>> {
        let declared_total = self.declared_total?;
        if self.buffer.len() >= declared_total {
            Some(std::mem::take(&mut self.buffer))
        } else {
            None
        }
    }
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hap_tlv::Tlv8;

    #[test]
    fn builds_characteristic_write_request() {
        let body = hap_tlv::encode(&Tlv8::new().push(1, vec![0x01]));
        let request = Request::new(Opcode::Write, 0x42, 0x000A, Some(body));
        assert_eq!(request.to_bytes(), vec![0x00, 0x02, 0x42, 0x0A, 0x00, 0x03, 0x00, 0x01, 0x01, 0x01]);
    }

    #[test]
    fn parses_response_header_and_body() {
        let bytes = [0x02, 0x42, 0x00, 0x05, 0x00, 1, 2, 3, 4, 5];
        let response = parse_response(&bytes).unwrap();
        assert_eq!(response.control_field, 0x02);
        assert_eq!(response.tid, 0x42);
        assert_eq!(response.status, 0);
        assert_eq!(response.body, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn parses_bodyless_response() {
        let bytes = [0x00, 0x07, 0x00];
        let response = parse_response(&bytes).unwrap();
        assert!(response.body.is_empty());
    }

    #[test]
    fn unfragmented_pdu_is_a_single_fragment() {
        let pdu = vec![0u8; 20];
        let fragments = fragment(&pdu, 1);
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0], pdu);
    }

    #[test]
    fn large_pdu_splits_with_continuation_headers() {
        let pdu = vec![0xAAu8; MAX_FRAGMENT_LEN + 100];
        let fragments = fragment(&pdu, 9);
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].len(), MAX_FRAGMENT_LEN);
        assert_eq!(&fragments[1][..2], &[control::CONTINUATION, 9]);
        assert_eq!(fragments[1].len(), 100 + 2);
    }

    #[test]
    fn reassembler_roundtrips_a_fragmented_pdu() {
        let pdu = parse_response_fixture();
        let tid = pdu[1];
        let fragments = fragment(&pdu, tid);

        let mut reassembler = Reassembler::new();
        let mut result = reassembler.push_first(&fragments[0]).unwrap();
        for fragment in &fragments[1..] {
            result = reassembler.push_continuation(fragment).unwrap();
        }
        assert_eq!(result.unwrap(), pdu);
    }

    fn parse_response_fixture() -> Vec<u8> {
        let body = vec![0x42u8; 700];
        let mut pdu = vec![0x02, 0x09, 0x00];
        pdu.extend_from_slice(&(body.len() as u16).to_le_bytes());
        pdu.extend_from_slice(&body);
        pdu
    }
}
