//! The numeric codes carried by a `kTLVType_Error` tag.

use hap_core::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Unknown = 1,
    Authentication = 2,
    Backoff = 3,
    MaxPeers = 4,
    MaxTries = 5,
    Unavailable = 6,
    Busy = 7,
}

impl ErrorCode {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            2 => Self::Authentication,
            3 => Self::Backoff,
            4 => Self::MaxPeers,
            5 => Self::MaxTries,
            6 => Self::Unavailable,
            7 => Self::Busy,
            _ => Self::Unknown,
        }
    }

    fn message(self) -> &'static str {
        match self {
            Self::Unknown => "unknown error",
            Self::Authentication => "authentication failed",
            Self::Backoff => "client must wait before retrying",
            Self::MaxPeers => "accessory cannot accept more pairings",
            Self::MaxTries => "max authentication attempts exceeded",
            Self::Unavailable => "pairing unavailable",
            Self::Busy => "accessory is busy, try again",
        }
    }

    /// Build the `hap_core::Error::Accessory` this code surfaces as.
    /// The pairing/verify state that produced it must be discarded by
    /// the caller.
    pub fn into_error(self) -> Error {
        Error::accessory(self as i32, self.message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrecognized_byte_maps_to_unknown() {
        assert_eq!(ErrorCode::from_byte(99), ErrorCode::Unknown);
    }

    #[test]
    fn known_bytes_round_trip() {
        assert_eq!(ErrorCode::from_byte(7), ErrorCode::Busy);
    }
}
