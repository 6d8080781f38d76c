//! Setup PIN validation. Rejected before any network activity.

use hap_core::{Error, Result};

/// Validate `pin` matches `^\d{3}-\d{2}-\d{3}$`.
pub fn validate(pin: &str) -> Result<()> {
    let bytes = pin.as_bytes();
    let shape_ok = bytes.len() == 11
        && bytes[0..3].iter().all(u8::is_ascii_digit)
        && bytes[3] == b'-'
        && bytes[4..6].iter().all(u8::is_ascii_digit)
        && bytes[6] == b'-'
        && bytes[7..10].iter().all(u8::is_ascii_digit);

    if shape_ok {
        Ok(())
    } else {
        Err(Error::usage(format!("invalid setup PIN: {pin:?} (expected NNN-NN-NNN)")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_pin() {
        assert!(validate("123-45-678").is_ok());
    }

    #[test]
    fn rejects_missing_hyphens() {
        assert!(validate("12345678").is_err());
    }

    #[test]
    fn rejects_whitespace() {
        assert!(validate("123-45-678 ").is_err());
        assert!(validate(" 123-45-678").is_err());
    }

    #[test]
    fn rejects_wrong_digit_grouping() {
        assert!(validate("1234-5-678").is_err());
    }
}
