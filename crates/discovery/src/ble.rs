//! Apple manufacturer-data decoding for HAP BLE advertisements. Parses
//! bytes a scanning collaborator already pulled out of an advertising
//! report; no GAP scanning lives here.

use hap_core::{Error, Result};

const APPLE_COMPANY_ID: u16 = 0x004C;
const HAP_ADVERTISING_TYPE: u8 = 0x06;
const MIN_LEN: usize = 17;

/// Decoded Apple manufacturer-data payload for a HAP BLE advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManufacturerData {
    /// `AIL`: advertising interval and flags byte.
    pub advertising_interval: u8,
    /// `SF`: status flags, same bit layout as the TXT record `sf` field.
    pub status_flags: u8,
    /// `DeviceID`, formatted `XX:XX:XX:XX:XX:XX`.
    pub device_id: String,
    /// `ACID`: accessory category identifier.
    pub category: u16,
    /// `GSN`: global state number, incremented on every characteristic change.
    pub global_state_number: u16,
    /// `CN`: configuration number.
    pub configuration_number: u8,
}

/// Parse a manufacturer-specific-data AD structure's payload, i.e. the
/// bytes following the 2-byte company id that the caller has already
/// matched against [`APPLE_COMPANY_ID`].
pub fn parse(company_id: u16, payload: &[u8]) -> Result<ManufacturerData> {
    if company_id != APPLE_COMPANY_ID {
        return Err(Error::protocol(format!("manufacturer data is not Apple's (company id {company_id:#06x})")));
    }
    if payload.len() < MIN_LEN {
        return Err(Error::protocol(format!(
            "HAP manufacturer data too short: {} bytes, need at least {MIN_LEN}",
            payload.len()
        )));
    }

    let advertising_type = payload[0];
    if advertising_type != HAP_ADVERTISING_TYPE {
        return Err(Error::protocol(format!("not a HAP advertisement (type {advertising_type:#04x})")));
    }

    let advertising_interval = payload[1];
    let status_flags = payload[2];
    let device_id_bytes = &payload[3..9];
    let device_id = device_id_bytes.iter().map(|b| format!("{b:02X}")).collect::<Vec<_>>().join(":");
    let category = u16::from_le_bytes([payload[9], payload[10]]);
    let global_state_number = u16::from_le_bytes([payload[11], payload[12]]);
    let configuration_number = payload[13];
    let compatible_version = payload[14];
    if compatible_version != 0x02 {
        return Err(Error::protocol(format!("unsupported HAP BLE compatible version: {compatible_version}")));
    }

    Ok(ManufacturerData {
        advertising_interval,
        status_flags,
        device_id,
        category,
        global_state_number,
        configuration_number,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_payload() -> Vec<u8> {
        vec![
            0x06, // TY
            0x00, // AIL
            0x01, // SF: not paired
            0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF, // DeviceID
            0x05, 0x00, // ACID = 5
            0x2A, 0x00, // GSN = 42
            0x07, // CN
            0x02, // CV
        ]
    }

    #[test]
    fn parses_well_formed_payload() {
        let data = parse(APPLE_COMPANY_ID, &sample_payload()).unwrap();
        assert_eq!(data.device_id, "AA:BB:CC:DD:EE:FF");
        assert_eq!(data.category, 5);
        assert_eq!(data.global_state_number, 42);
    }

    #[test]
    fn rejects_non_apple_company_id() {
        assert!(parse(0x1234, &sample_payload()).is_err());
    }

    #[test]
    fn rejects_short_payload() {
        assert!(parse(APPLE_COMPANY_ID, &sample_payload()[..10]).is_err());
    }

    #[test]
    fn rejects_unsupported_compatible_version() {
        let mut payload = sample_payload();
        *payload.last_mut().unwrap() = 0x03;
        assert!(parse(APPLE_COMPANY_ID, &payload).is_err());
    }
}
