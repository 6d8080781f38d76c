//! Resolving the HAP instance id embedded in every PDU from the
//! per-characteristic descriptor that carries it.

use hap_core::{Error, Result};

/// Long form of the HAP instance id descriptor UUID.
pub const DESCRIPTOR_UUID_LONG: &str = "DC46F0FE-81D2-4616-B5D9-6ABDD796939A";
/// Short (16-bit) form, as some accessories advertise it.
pub const DESCRIPTOR_UUID_SHORT: &str = "939A";

pub fn is_instance_id_descriptor(uuid: &str) -> bool {
    uuid.eq_ignore_ascii_case(DESCRIPTOR_UUID_LONG) || uuid.eq_ignore_ascii_case(DESCRIPTOR_UUID_SHORT)
}

/// Decode a descriptor read's raw bytes into the little-endian u16
/// instance id it carries.
pub fn decode(bytes: &[u8]) -> Result<u16> {
    let array: [u8; 2] = bytes
        .try_into()
        .map_err(|_| Error::protocol("instance-id descriptor value must be exactly 2 bytes"))?;
    Ok(u16::from_le_bytes(array))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_both_uuid_forms() {
        assert!(is_instance_id_descriptor(DESCRIPTOR_UUID_LONG));
        assert!(is_instance_id_descriptor("939a"));
        assert!(!is_instance_id_descriptor("0000180A-0000-1000-8000-00805F9B34FB"));
    }

    #[test]
    fn decodes_little_endian_u16() {
        assert_eq!(decode(&[0x0A, 0x00]).unwrap(), 10);
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(decode(&[0x0A]).is_err());
    }
}
