//! `_hap._tcp` DNS-SD TXT record field decoding. Parses the field
//! values a browser collaborator has already demultiplexed from the
//! record; no socket or multicast code lives here.

use hap_core::{Error, Result};

/// `ff` feature flags: a handful of bits, not worth a bitflags-style
/// dependency for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags(pub u8);

impl FeatureFlags {
    pub const SUPPORTS_APPLE_AUTHENTICATION_COPROCESSOR: u8 = 0b01;
    pub const SUPPORTS_SOFTWARE_AUTHENTICATION: u8 = 0b10;

    pub fn contains(self, bit: u8) -> bool {
        self.0 & bit != 0
    }
}

/// `sf` status flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusFlags(pub u8);

impl StatusFlags {
    pub const NOT_PAIRED: u8 = 0b001;
    pub const NOT_CONFIGURED_TO_JOIN_WIFI: u8 = 0b010;
    pub const HAS_PROBLEMS: u8 = 0b100;

    pub fn contains(self, bit: u8) -> bool {
        self.0 & bit != 0
    }
}

/// Decoded `_hap._tcp` TXT record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxtRecord {
    /// `c#`: configuration number.
    pub configuration_number: u16,
    /// `ff`: feature flags.
    pub feature_flags: FeatureFlags,
    /// `id`: device id, `XX:XX:XX:XX:XX:XX`.
    pub device_id: String,
    /// `md`: model name.
    pub model: String,
    /// `pv`: protocol version.
    pub protocol_version: String,
    /// `s#`: state number; must be 1.
    pub state_number: u8,
    /// `sf`: status flags.
    pub status_flags: StatusFlags,
    /// `ci`: accessory category identifier.
    pub category: u16,
}

/// Parse the field map a DNS-SD browser collaborator already
/// extracted from a `_hap._tcp` TXT record.
pub fn parse(fields: &std::collections::HashMap<String, String>) -> Result<TxtRecord> {
    let configuration_number = field(fields, "c#")?.parse().map_err(|_| bad("c#"))?;
    let feature_flags = FeatureFlags(field(fields, "ff").ok().and_then(|v| v.parse().ok()).unwrap_or(0));
    let device_id = field(fields, "id")?.to_string();
    let model = field(fields, "md")?.to_string();
    let protocol_version = field(fields, "pv")?.to_string();
    let state_number: u8 = field(fields, "s#")?.parse().map_err(|_| bad("s#"))?;
    if state_number != 1 {
        return Err(Error::protocol(format!("unsupported HAP state number: {state_number}")));
    }
    let status_flags = StatusFlags(field(fields, "sf").ok().and_then(|v| v.parse().ok()).unwrap_or(0));
    let category = field(fields, "ci")?.parse().map_err(|_| bad("ci"))?;

    Ok(TxtRecord { configuration_number, feature_flags, device_id, model, protocol_version, state_number, status_flags, category })
}

fn field<'a>(fields: &'a std::collections::HashMap<String, String>, key: &str) -> Result<&'a str> {
    fields.get(key).map(String::as_str).ok_or_else(|| Error::protocol(format!("TXT record missing `{key}`")))
}

fn bad(key: &str) -> Error {
    Error::protocol(format!("TXT record field `{key}` is not a valid integer"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sample_fields() -> HashMap<String, String> {
        [
            ("c#", "2"),
            ("ff", "0"),
            ("id", "AA:BB:CC:DD:EE:FF"),
            ("md", "Smart Bulb"),
            ("pv", "1.1"),
            ("s#", "1"),
            ("sf", "1"),
            ("ci", "5"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn parses_well_formed_record() {
        let record = parse(&sample_fields()).unwrap();
        assert_eq!(record.device_id, "AA:BB:CC:DD:EE:FF");
        assert_eq!(record.category, 5);
        assert!(record.status_flags.contains(StatusFlags::NOT_PAIRED));
    }

    #[test]
    fn rejects_missing_required_field() {
        let mut fields = sample_fields();
        fields.remove("md");
        assert!(parse(&fields).is_err());
    }

    #[test]
    fn rejects_state_number_other_than_one() {
        let mut fields = sample_fields();
        fields.insert("s#".to_string(), "2".to_string());
        assert!(parse(&fields).is_err());
    }
}
