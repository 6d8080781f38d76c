//! `Device`: the top-level facade over the IP and BLE HAP clients.

pub mod device;

pub use device::Device;
