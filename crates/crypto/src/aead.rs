//! ChaCha20-Poly1305 AEAD, used both for the per-message pairing
//! envelopes and for the encrypted session transport.
//!
//! HAP never uses random nonces: pairing messages use a fixed
//! 4-zero-byte prefix plus an 8-byte ASCII tag (`"PS-Msg05"` etc), and
//! session frames use the same 4-zero-byte prefix plus a little-endian
//! 64-bit frame counter. [`nonce::fixed`] and [`nonce::counter`] build
//! both shapes; callers are responsible for picking the right one and
//! for never reusing a counter value under the same key.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use hap_core::{Error, Result};
use zeroize::{Zeroize, ZeroizeOnDrop};

pub const NONCE_SIZE: usize = 12;
pub const TAG_SIZE: usize = 16;

/// Nonce construction helpers shared by Pair-Setup/Pair-Verify message
/// encryption and session frame encryption.
pub mod nonce {
    use super::NONCE_SIZE;

    /// `"\x00\x00\x00\x00" || tag`, used for the fixed per-message
    /// nonces named in the pairing procedures (`"PS-Msg05"`,
    /// `"PV-Msg02"`, and so on). `tag` must be exactly 8 bytes.
    pub fn fixed(tag: &[u8; 8]) -> [u8; NONCE_SIZE] {
        let mut n = [0u8; NONCE_SIZE];
        n[4..].copy_from_slice(tag);
        n
    }

    /// `"\x00\x00\x00\x00" || counter.to_le_bytes()`, used for
    /// encrypted session frames.
    pub fn counter(counter: u64) -> [u8; NONCE_SIZE] {
        let mut n = [0u8; NONCE_SIZE];
        n[4..].copy_from_slice(&counter.to_le_bytes());
        n
    }
}

/// A zeroizing wrapper for a ChaCha20-Poly1305 key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey {
    bytes: [u8; 32],
}

impl SessionKey {
    /// # Arguments
    /// - `bytes`: 32-byte key material
    ///
    /// # Errors
    /// Returns an error if `bytes` is not exactly 32 bytes long.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 32 {
            return Err(Error::protocol(format!(
                "invalid session key length: expected 32 bytes, got {}",
                bytes.len()
            )));
        }
        let mut array = [0u8; 32];
        array.copy_from_slice(bytes);
        Ok(Self { bytes: array })
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKey").field("bytes", &"[REDACTED]").finish()
    }
}

/// A ChaCha20-Poly1305 cipher bound to one key, used with explicit
/// caller-supplied nonces (see [`nonce`]).
pub struct Cipher {
    key: SessionKey,
}

impl Cipher {
    pub fn new(key: SessionKey) -> Self {
        Self { key }
    }

    /// Encrypt `plaintext`, returning ciphertext with a 16-byte
    /// authentication tag appended.
    ///
    /// # Arguments
    /// - `nonce`: the 12-byte nonce for this message; see [`nonce`]
    /// - `plaintext`: the data to encrypt
    /// - `aad`: additional authenticated data, not encrypted but bound
    ///   into the tag
    ///
    /// # Errors
    /// Returns an error if the underlying AEAD operation fails (the
    /// RustCrypto implementation never fails on well-formed input, but
    /// the call is still fallible at the type level).
    pub fn encrypt(&self, nonce: &[u8; NONCE_SIZE], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new((&self.key.bytes).into());
        cipher
            .encrypt(Nonce::from_slice(nonce), Payload { msg: plaintext, aad })
            .map_err(|e| Error::protocol(format!("encryption failed: {e}")))
    }

    /// Decrypt `ciphertext` (tag included), verifying `aad`.
    ///
    /// # Arguments
    /// - `nonce`: the nonce used during encryption
    /// - `ciphertext`: encrypted data with the 16-byte tag appended
    /// - `aad`: the same additional authenticated data passed to
    ///   [`Self::encrypt`]
    ///
    /// # Errors
    /// Returns an error if the authentication tag doesn't verify
    /// (tampering, wrong key, or mismatched `aad`).
    pub fn decrypt(&self, nonce: &[u8; NONCE_SIZE], ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new((&self.key.bytes).into());
        cipher
            .decrypt(Nonce::from_slice(nonce), Payload { msg: ciphertext, aad })
            .map_err(|e| Error::protocol(format!("decryption failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_with_fixed_nonce() {
        let cipher = Cipher::new(SessionKey::from_bytes(&[7u8; 32]).unwrap());
        let n = nonce::fixed(b"PS-Msg05");
        let ciphertext = cipher.encrypt(&n, b"hello", b"").unwrap();
        assert_eq!(ciphertext.len(), 5 + TAG_SIZE);
        assert_eq!(cipher.decrypt(&n, &ciphertext, b"").unwrap(), b"hello");
    }

    #[test]
    fn round_trips_with_counter_nonce() {
        let cipher = Cipher::new(SessionKey::from_bytes(&[9u8; 32]).unwrap());
        let n0 = nonce::counter(0);
        let n1 = nonce::counter(1);
        assert_ne!(n0, n1);

        let ct0 = cipher.encrypt(&n0, b"frame-0", b"").unwrap();
        assert!(cipher.decrypt(&n1, &ct0, b"").is_err());
        assert_eq!(cipher.decrypt(&n0, &ct0, b"").unwrap(), b"frame-0");
    }

    #[test]
    fn tampered_ciphertext_rejected() {
        let cipher = Cipher::new(SessionKey::from_bytes(&[3u8; 32]).unwrap());
        let n = nonce::counter(0);
        let mut ciphertext = cipher.encrypt(&n, b"secret", b"").unwrap();
        ciphertext[0] ^= 0xFF;
        assert!(cipher.decrypt(&n, &ciphertext, b"").is_err());
    }

    #[test]
    fn invalid_key_length_rejected() {
        assert!(SessionKey::from_bytes(&[0u8; 31]).is_err());
    }

    #[test]
    fn debug_redacts_key_bytes() {
        let key = SessionKey::from_bytes(&[1u8; 32]).unwrap();
        assert!(format!("{key:?}").contains("REDACTED"));
    }
}
