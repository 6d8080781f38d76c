//! The HAP BLE transport: HAP-over-GATT PDU framing, instance-id and
//! signature discovery, and the BLE client.

pub mod client;
pub mod framing;
pub mod gatt;
pub mod instance_id;
pub mod pdu;
pub mod signature;

pub use client::BleClient;
pub use gatt::GattLink;
