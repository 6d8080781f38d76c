//! Shared inbound-message checks: every parsed TLV is rejected unless
//! it carries the expected state and lacks a `kError` tag.

use crate::{error_code::ErrorCode, tag};
use hap_core::{Error, Result};
use hap_tlv::Tlv8;

/// Fail with the accessory's reported error if present; otherwise
/// require the TLV to carry exactly `expected_state`.
pub fn expect_state(tlv: &Tlv8, expected_state: u8) -> Result<()> {
    if let Some(code) = tlv.get_value(tag::ERROR) {
        let code = code.first().copied().unwrap_or(1);
        return Err(ErrorCode::from_byte(code).into_error());
    }

    match tlv.get_value(tag::STATE) {
        Some(&[state]) if state == expected_state => Ok(()),
        Some(other) => Err(Error::protocol(format!(
            "expected state {expected_state}, got {other:?}"
        ))),
        None => Err(Error::protocol("message missing required State tag")),
    }
}

pub fn require_value<'a>(tlv: &'a Tlv8, t: u8, name: &str) -> Result<&'a [u8]> {
    tlv.get_value(t).ok_or_else(|| Error::protocol(format!("message missing required {name} tag")))
}
