//! TLV8 encoding and the typed HAP value codec built on top of it.

pub mod codec;
pub mod value;

pub use codec::{decode, encode, TlvItem, Tlv8};
