//! The accessory database tree returned by `getAccessories`, and the
//! typed characteristic value it carries.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A typed HAP characteristic value.
///
/// `Data` is kept as raw bytes here; the base64 encoding named in the
/// value codec only applies at the JSON wire boundary (see
/// `hap-tlv::value`), not to this in-memory representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Int(i32),
    Float(f32),
    String(String),
    Data(Vec<u8>),
}

/// A single characteristic within a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Characteristic {
    pub iid: u64,
    #[serde(rename = "type")]
    pub type_: String,
    pub format: String,
    pub perms: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(rename = "minValue", skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    #[serde(rename = "maxValue", skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
    #[serde(rename = "minStep", skip_serializing_if = "Option::is_none")]
    pub min_step: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "validValues", skip_serializing_if = "Option::is_none")]
    pub valid_values: Option<Vec<u32>>,
    #[serde(rename = "validValuesRange", skip_serializing_if = "Option::is_none")]
    pub valid_values_range: Option<(u32, u32)>,
    /// Whether the accessory has confirmed an active event subscription.
    #[serde(default)]
    pub ev: bool,
}

/// A service within an accessory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub iid: u64,
    #[serde(rename = "type")]
    pub type_: String,
    pub characteristics: Vec<Characteristic>,
}

/// A single accessory (1 for single-accessory devices, unique within a
/// bridge).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Accessory {
    pub aid: u64,
    pub services: Vec<Service>,
}

/// The tree returned by `getAccessories`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AccessoryDatabase {
    pub accessories: Vec<Accessory>,
}

impl AccessoryDatabase {
    /// Look up a characteristic by `aid.iid`, searching every accessory.
    pub fn characteristic(&self, aid: u64, iid: u64) -> Option<&Characteristic> {
        self.accessories
            .iter()
            .find(|a| a.aid == aid)?
            .services
            .iter()
            .flat_map(|s| s.characteristics.iter())
            .find(|c| c.iid == iid)
    }
}

/// A fully-qualified characteristic address, as used in query strings
/// (`1.10`) and multi-status responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CharacteristicAddress {
    pub aid: u64,
    pub iid: u64,
}

impl fmt::Display for CharacteristicAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.aid, self.iid)
    }
}

impl CharacteristicAddress {
    pub fn new(aid: u64, iid: u64) -> Self {
        Self { aid, iid }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn characteristic_address_displays_as_dotted_pair() {
        let addr = CharacteristicAddress::new(1, 10);
        assert_eq!(addr.to_string(), "1.10");
    }

    #[test]
    fn database_finds_nested_characteristic() {
        let db = AccessoryDatabase {
            accessories: vec![Accessory {
                aid: 1,
                services: vec![Service {
                    iid: 2,
                    type_: "43".into(),
                    characteristics: vec![Characteristic {
                        iid: 10,
                        type_: "25".into(),
                        format: "bool".into(),
                        perms: vec!["pr".into(), "pw".into()],
                        value: Some(Value::Bool(true)),
                        unit: None,
                        min_value: None,
                        max_value: None,
                        min_step: None,
                        description: None,
                        valid_values: None,
                        valid_values_range: None,
                        ev: false,
                    }],
                }],
            }],
        };

        let found = db.characteristic(1, 10).expect("characteristic present");
        assert_eq!(found.value, Some(Value::Bool(true)));
        assert!(db.characteristic(1, 99).is_none());
        assert!(db.characteristic(2, 10).is_none());
    }
}
