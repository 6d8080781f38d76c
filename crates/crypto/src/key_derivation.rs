//! HKDF-SHA-512 key derivation.
//!
//! Every pairing-protocol key (the Pair-Setup controller/accessory
//! signing salts, the Pair-Setup/Pair-Verify session keys, the
//! Pair-Resume session identifier) is derived by this one function
//! with a different salt/info/length; the salt and info strings
//! themselves live in `hap-pairing`, not here.

use hap_core::{Error, Result};
use hkdf::Hkdf;
use sha2::Sha512;
use zeroize::Zeroizing;

/// Derive `output_length` bytes from `parent_key` using HKDF-SHA-512
/// with the given `salt` and `info`.
///
/// # Arguments
/// - `parent_key`: the input keying material (e.g. the SRP shared key
///   or an X25519 shared secret)
/// - `salt`: the HKDF salt, or `None` to use an all-zero salt
/// - `info`: the context string distinguishing this derived key from
///   every other key derived from the same `parent_key`
/// - `output_length`: number of bytes to produce
///
/// # Errors
/// Returns an error if `output_length` exceeds HKDF-SHA-512's maximum
/// output size (255 times the hash length).
pub fn derive(parent_key: &[u8], salt: Option<&[u8]>, info: &[u8], output_length: usize) -> Result<Zeroizing<Vec<u8>>> {
    let hkdf = Hkdf::<Sha512>::new(salt, parent_key);
    let mut output = Zeroizing::new(vec![0u8; output_length]);
    hkdf.expand(info, &mut output)
        .map_err(|e| Error::protocol(format!("key derivation failed: {e}")))?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_requested_length() {
        let parent = b"srp-premaster-secret-stand-in-bytes";
        let out = derive(parent, Some(b"Pair-Setup-Encrypt-Salt"), b"Pair-Setup-Encrypt-Info", 32).unwrap();
        assert_eq!(out.len(), 32);
    }

    #[test]
    fn different_info_strings_diverge() {
        let parent = b"same-parent-key-material-for-both";
        let a = derive(parent, None, b"info-a", 16).unwrap();
        let b = derive(parent, None, b"info-b", 16).unwrap();
        assert_ne!(*a, *b);
    }

    #[test]
    fn supports_short_output_like_resume_session_id() {
        let out = derive(b"shared-secret", Some(b"Pair-Verify-Resume-Salt"), b"Pair-Verify-Resume-Info", 8).unwrap();
        assert_eq!(out.len(), 8);
    }
}
