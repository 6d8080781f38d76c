//! Decoding a characteristic/service signature-read response TLV into
//! the metadata `getCharacteristics`/`getAccessories` need to build an
//! accessory database entry.
//!
//! TLV tag numbers and BT-SIG format/unit codes below are the standard
//! values used throughout HAP-over-BLE controller implementations, not
//! invented for this crate.

use hap_core::{Error, Result};
use hap_tlv::{decode as decode_tlv, Tlv8, TlvItem};

pub mod tag {
    pub const HAP_CHARACTERISTIC_PROPERTIES: u8 = 0x04;
    pub const GATT_USER_DESCRIPTION: u8 = 0x05;
    pub const GATT_PRESENTATION_FORMAT: u8 = 0x06;
    pub const GATT_VALID_RANGE: u8 = 0x07;
    pub const HAP_STEP_VALUE: u8 = 0x08;
    pub const HAP_VALID_VALUES: u8 = 0x09;
    pub const HAP_VALID_VALUES_RANGE: u8 = 0x0A;
}

/// BT-SIG presentation-format codes, as listed in distilled section
/// 4.7, mapped to the HAP value-format string used elsewhere in this
/// workspace (`hap_core::types::Characteristic::format`).
pub fn format_code_to_string(code: u8) -> Option<&'static str> {
    Some(match code {
        0x01 => "bool",
        0x04 => "uint8",
        0x06 => "uint16",
        0x08 => "uint32",
        0x0A => "uint64",
        0x10 => "int",
        0x14 => "float",
        0x19 => "string",
        0x1B => "data",
        _ => return None,
    })
}

/// BT-SIG unit codes to HAP unit strings. Unknown codes pass through
/// as their hex form, matching the UUID registry's "unknown passes
/// through unchanged" convention.
pub fn unit_code_to_string(code: u16) -> String {
    match code {
        0x2703 => "seconds".to_string(),
        0x272F => "celsius".to_string(),
        0x2731 => "lux".to_string(),
        0x2763 => "arcdegrees".to_string(),
        0x27AD => "percentage".to_string(),
        other => format!("{other:#06x}"),
    }
}

/// Decoded metadata for one characteristic or service, as returned by
/// a signature-read PDU.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Signature {
    pub properties: Option<u16>,
    pub description: Option<String>,
    pub format: Option<String>,
    pub unit: Option<String>,
    pub valid_range: Option<(Vec<u8>, Vec<u8>)>,
    pub step: Option<Vec<u8>>,
    pub valid_values: Option<Vec<u8>>,
    /// Pairs of `(min, max)` bytes, one pair per discontinuous valid
    /// range. The distilled spec notes real accessories are
    /// inconsistent about whether every byte pair in this TLV is a
    /// distinct range or only the first two bytes matter; this crate
    /// preserves every pair it receives rather than truncating, so a
    /// caller that only wants the first range can still get it via
    /// `.first()` without this crate silently discarding the rest.
    pub valid_values_range: Option<Vec<(u8, u8)>>,
}

pub fn parse(body: &[u8]) -> Result<Signature> {
    let tlv = decode_tlv(body)?;
    let mut signature = Signature::default();

    if let Some(bytes) = tlv.get_value(tag::HAP_CHARACTERISTIC_PROPERTIES) {
        let array: [u8; 2] = bytes.try_into().map_err(|_| Error::protocol("HAP-Characteristic-Properties must be 2 bytes"))?;
        signature.properties = Some(u16::from_le_bytes(array));
    }

    if let Some(bytes) = tlv.get_value(tag::GATT_USER_DESCRIPTION) {
        signature.description = Some(String::from_utf8_lossy(bytes).into_owned());
    }

    if let Some(bytes) = tlv.get_value(tag::GATT_PRESENTATION_FORMAT) {
        if bytes.len() >= 3 {
            signature.format = format_code_to_string(bytes[0]).map(str::to_string);
            let unit_code = u16::from_le_bytes([bytes[1], bytes[2]]);
            signature.unit = Some(unit_code_to_string(unit_code));
        }
    }

    if let Some(bytes) = tlv.get_value(tag::GATT_VALID_RANGE) {
        let half = bytes.len() / 2;
        if half > 0 {
            signature.valid_range = Some((bytes[..half].to_vec(), bytes[half..].to_vec()));
        }
    }

    if let Some(bytes) = tlv.get_value(tag::HAP_STEP_VALUE) {
        signature.step = Some(bytes.to_vec());
    }

    if let Some(bytes) = tlv.get_value(tag::HAP_VALID_VALUES) {
        signature.valid_values = Some(bytes.to_vec());
    }

    if let Some(item) = tlv.get(tag::HAP_VALID_VALUES_RANGE) {
        signature.valid_values_range = Some(valid_values_range_pairs(item)?);
    }

    Ok(signature)
}

fn valid_values_range_pairs(item: &TlvItem) -> Result<Vec<(u8, u8)>> {
    let buffers: Vec<&[u8]> = match item {
        TlvItem::Value(v) => vec![v.as_slice()],
        TlvItem::List(values) => values.iter().map(Vec::as_slice).collect(),
    };
    let mut pairs = Vec::new();
    for buf in buffers {
        if buf.len() % 2 != 0 {
            return Err(Error::protocol("Valid-Values-Range entry has an odd byte length"));
        }
        for chunk in buf.chunks_exact(2) {
            pairs.push((chunk[0], chunk[1]));
        }
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_properties_and_presentation_format() {
        let body = hap_tlv::encode(
            &Tlv8::new()
                .push(tag::HAP_CHARACTERISTIC_PROPERTIES, 0x0003u16.to_le_bytes().to_vec())
                .push(tag::GATT_PRESENTATION_FORMAT, vec![0x08, 0x2F, 0x27])
                .push(tag::GATT_USER_DESCRIPTION, b"Temperature".to_vec()),
        );
        let signature = parse(&body).unwrap();
        assert_eq!(signature.properties, Some(3));
        assert_eq!(signature.format.as_deref(), Some("uint32"));
        assert_eq!(signature.unit.as_deref(), Some("celsius"));
        assert_eq!(signature.description.as_deref(), Some("Temperature"));
    }

    #[test]
    fn preserves_every_valid_values_range_pair() {
        let body = hap_tlv::encode(&Tlv8::new().push(tag::HAP_VALID_VALUES_RANGE, vec![0, 10, 20, 30]));
        let signature = parse(&body).unwrap();
        assert_eq!(signature.valid_values_range, Some(vec![(0, 10), (20, 30)]));
    }

    #[test]
    fn unknown_unit_code_passes_through_as_hex() {
        assert_eq!(unit_code_to_string(0x9999), "0x9999");
    }
}
