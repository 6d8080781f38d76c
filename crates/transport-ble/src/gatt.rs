//! The BLE central-role collaborator.
//!
//! Real Bluetooth access (scanning, connecting, the GATT client state
//! machine) lives outside this crate; a [`GattLink`] implementation is
//! handed in already connected to one peripheral and is the only way
//! this crate touches a radio.

use hap_core::Result;

/// A GATT attribute handle, as assigned by the peripheral's attribute
/// table. Distinct from the HAP instance id carried inside PDUs, which
/// is discovered separately via [`crate::instance_id`].
pub type Handle = u16;

/// One characteristic found while walking a service's attribute table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredCharacteristic {
    pub handle: Handle,
    pub uuid: String,
}

/// One service found during discovery, with its characteristics in
/// attribute-table order.
///
/// `instance_id` and `signature_handle` name the service's own HAP
/// instance id and the handle of its built-in Service Signature
/// characteristic; resolving both from the raw GATT attribute table is
/// GATT-table-walking detail this crate leaves to the adapter that
/// implements [`GattLink`], the same boundary `instance_id` and
/// `signature_handle` already sit on for ordinary characteristics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredService {
    pub uuid: String,
    pub instance_id: u16,
    pub signature_handle: Handle,
    pub characteristics: Vec<DiscoveredCharacteristic>,
}

/// One connected BLE peripheral, already paired at the link layer.
/// Implementations own scanning, connecting, and MTU negotiation; this
/// crate only issues GATT operations against an already-connected
/// peripheral's attribute table.
pub trait GattLink {
    /// Walk the peripheral's GATT attribute table, returning every
    /// service and its characteristics. Used once per `getAccessories`
    /// call; the result is not cached by this crate.
    async fn discover_services(&mut self) -> Result<Vec<DiscoveredService>>;

    /// Write a value to a characteristic.
    async fn write_characteristic(&mut self, handle: Handle, data: &[u8]) -> Result<()>;

    /// Read a characteristic's current value.
    async fn read_characteristic(&mut self, handle: Handle) -> Result<Vec<u8>>;

    /// Read a descriptor attached to a characteristic, by its 128-bit
    /// UUID (or its 16-bit short form left-padded per the Bluetooth
    /// base UUID).
    async fn read_descriptor(&mut self, characteristic: Handle, descriptor_uuid: &str) -> Result<Vec<u8>>;

    /// Enable indications on a characteristic (writes the Client
    /// Characteristic Configuration descriptor).
    async fn subscribe(&mut self, handle: Handle) -> Result<()>;

    /// Disable indications on a characteristic.
    async fn unsubscribe(&mut self, handle: Handle) -> Result<()>;

    /// Block until the next indication arrives on any subscribed
    /// characteristic, or the connection drops (`Ok(None)`). HAP
    /// indications always carry an empty payload; the handle alone is
    /// the signal to perform an authenticated read.
    async fn next_indication(&mut self) -> Result<Option<Handle>>;

    /// True once the peripheral has disconnected; callers use this to
    /// abort in-flight operations rather than hang.
    fn is_connected(&self) -> bool;
}
