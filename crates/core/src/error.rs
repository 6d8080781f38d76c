//! Unified error type for the HAP controller core.
//!
//! Every crate in this workspace returns [`Result`]. The four variants
//! correspond to the four error kinds a caller needs to distinguish:
//! a transport-level failure, a protocol-level failure, a well-formed
//! but unsuccessful accessory response, and caller misuse.

use thiserror::Error;

/// Result type alias using the controller's [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for all HAP controller modules.
#[derive(Error, Debug)]
pub enum Error {
    /// Connection refused, lost, or timed out.
    #[error("transport error: {0}")]
    Transport(String),

    /// Unexpected state, missing required TLV tag, malformed PDU, failed
    /// decryption, or failed signature verification. Any pairing/verify
    /// state associated with the failing exchange must be discarded by
    /// the caller.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A syntactically valid response carrying a non-zero status: a BLE
    /// response byte, a `kTLVType_Error` tag, or an HTTP 4xx/5xx code.
    #[error("accessory error (code {code}): {message}")]
    Accessory {
        /// Numeric status/error code as carried by the accessory.
        code: i32,
        /// Human-readable description.
        message: String,
        /// Raw response body, if any, for callers that need it verbatim.
        body: Option<Vec<u8>>,
    },

    /// Malformed PIN, missing pairing data, `finishPairing` without a
    /// prior `startPairing`, or an unknown value format string.
    #[error("usage error: {0}")]
    Usage(String),
}

impl Error {
    /// Shorthand for [`Error::Transport`].
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Shorthand for [`Error::Protocol`].
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Shorthand for [`Error::Usage`].
    pub fn usage(msg: impl Into<String>) -> Self {
        Self::Usage(msg.into())
    }

    /// Shorthand for [`Error::Accessory`] without a body.
    pub fn accessory(code: i32, message: impl Into<String>) -> Self {
        Self::Accessory {
            code,
            message: message.into(),
            body: None,
        }
    }

    /// Shorthand for [`Error::Accessory`] carrying the raw response body.
    pub fn accessory_with_body(code: i32, message: impl Into<String>, body: Vec<u8>) -> Self {
        Self::Accessory {
            code,
            message: message.into(),
            body: Some(body),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessory_error_carries_code_and_body() {
        let err = Error::accessory_with_body(-70404, "read-only", vec![1, 2, 3]);
        match err {
            Error::Accessory { code, body, .. } => {
                assert_eq!(code, -70404);
                assert_eq!(body, Some(vec![1, 2, 3]));
            }
            _ => panic!("expected Accessory variant"),
        }
    }

    #[test]
    fn display_messages_are_human_readable() {
        assert!(Error::transport("refused").to_string().contains("transport"));
        assert!(Error::protocol("bad state").to_string().contains("protocol"));
        assert!(Error::usage("bad pin").to_string().contains("usage"));
    }
}
