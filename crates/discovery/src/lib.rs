//! Parsing for HAP discovery advertisements.
//!
//! This crate decodes the two wire formats a HAP controller sees
//! during discovery: `_hap._tcp` DNS-SD TXT records and Apple
//! manufacturer data carried in BLE advertisements. It does not browse
//! mDNS, scan for BLE peripherals, or maintain any notion of "known
//! accessories" — those are the caller's concern.

pub mod ble;
pub mod txt;

pub use ble::ManufacturerData;
pub use txt::{FeatureFlags, StatusFlags, TxtRecord};
