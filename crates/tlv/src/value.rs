//! Typed HAP value <-> little-endian byte buffer conversions.
//!
//! The uint64 codec here is a full 64-bit round-trip; an accessory that
//! implements the widely-observed `<< 32`-on-a-32-bit-value bug will
//! see its high 32 bits read back as zero, but this codec itself does
//! not reproduce that defect (see DESIGN.md).

use hap_core::types::Value;
use hap_core::{Error, Result};

/// Decode `bytes` as `format` (one of `bool`, `uint8`, `uint16`,
/// `uint32`, `uint64`, `int`, `float`, `string`, `data`).
pub fn decode(format: &str, bytes: &[u8]) -> Result<Value> {
    Ok(match format {
        "bool" => Value::Bool(bytes.first().copied().unwrap_or(0) != 0),
        "uint8" => Value::UInt8(bytes.first().copied().unwrap_or(0)),
        "uint16" => Value::UInt16(u16::from_le_bytes(pad(bytes))),
        "uint32" => Value::UInt32(u32::from_le_bytes(pad(bytes))),
        "uint64" => Value::UInt64(u64::from_le_bytes(pad(bytes))),
        "int" => Value::Int(i32::from_le_bytes(pad(bytes))),
        "float" => Value::Float(f32::from_le_bytes(pad(bytes))),
        "string" => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        "data" => Value::Data(bytes.to_vec()),
        other => return Err(Error::protocol(format!("unknown format: {other}"))),
    })
}

/// Encode `value` to its little-endian wire representation. Returns
/// [`Error::Usage`] if `value`'s variant does not match `format`.
pub fn encode(format: &str, value: &Value) -> Result<Vec<u8>> {
    Ok(match (format, value) {
        ("bool", Value::Bool(b)) => vec![*b as u8],
        ("uint8", Value::UInt8(v)) => vec![*v],
        ("uint16", Value::UInt16(v)) => v.to_le_bytes().to_vec(),
        ("uint32", Value::UInt32(v)) => v.to_le_bytes().to_vec(),
        ("uint64", Value::UInt64(v)) => v.to_le_bytes().to_vec(),
        ("int", Value::Int(v)) => v.to_le_bytes().to_vec(),
        ("float", Value::Float(v)) => v.to_le_bytes().to_vec(),
        ("string", Value::String(v)) => v.clone().into_bytes(),
        ("data", Value::Data(v)) => v.clone(),
        (other, _) if !is_known_format(other) => {
            return Err(Error::protocol(format!("unknown format: {other}")))
        }
        (fmt, _) => return Err(Error::usage(format!("value does not match format {fmt}"))),
    })
}

fn is_known_format(format: &str) -> bool {
    matches!(
        format,
        "bool" | "uint8" | "uint16" | "uint32" | "uint64" | "int" | "float" | "string" | "data"
    )
}

/// Left-zero-pad (as in: pad the high end) `bytes` up to `N` and copy
/// into a fixed array for `from_le_bytes`. Short reads are padded with
/// zero high-order bytes rather than rejected, matching accessories
/// that send a narrower-than-declared value.
fn pad<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut buf = [0u8; N];
    let n = bytes.len().min(N);
    buf[..n].copy_from_slice(&bytes[..n]);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uint64_round_trips_full_64_bits() {
        let v = Value::UInt64(0x0102_0304_0506_0708);
        let bytes = encode("uint64", &v).unwrap();
        assert_eq!(bytes, vec![0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01]);
        assert_eq!(decode("uint64", &bytes).unwrap(), v);
    }

    #[test]
    fn bool_true_from_any_nonzero_byte() {
        assert_eq!(decode("bool", &[1]).unwrap(), Value::Bool(true));
        assert_eq!(decode("bool", &[0]).unwrap(), Value::Bool(false));
    }

    #[test]
    fn float_round_trips() {
        let v = Value::Float(98.6);
        let bytes = encode("float", &v).unwrap();
        assert_eq!(decode("float", &bytes).unwrap(), v);
    }

    #[test]
    fn unknown_format_is_rejected() {
        assert!(decode("tlv8", &[1, 2, 3]).is_err());
        assert!(encode("tlv8", &Value::Bool(true)).is_err());
    }

    #[test]
    fn mismatched_variant_is_usage_error() {
        assert!(encode("uint8", &Value::Bool(true)).is_err());
    }

    #[test]
    fn short_uint16_is_zero_extended() {
        assert_eq!(decode("uint16", &[0x05]).unwrap(), Value::UInt16(5));
    }
}
