//! X25519 Diffie-Hellman key agreement, used by Pair-Verify to derive
//! the per-connection shared secret from an ephemeral keypair.
//!
//! x25519-dalek 2.0 dropped `StaticSecret`, so reusable secrets are
//! held as a `curve25519-dalek` `Scalar` directly, clamped by hand per
//! RFC 7748.

use curve25519_dalek::montgomery::MontgomeryPoint;
use curve25519_dalek::scalar::Scalar;
use hap_core::{Error, Result};
use rand::RngCore;
use x25519_dalek::PublicKey;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A zeroizing wrapper around an X25519 secret scalar.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecretKey {
    scalar: Scalar,
}

fn clamp(mut bytes: [u8; 32]) -> [u8; 32] {
    bytes[0] &= 248;
    bytes[31] &= 127;
    bytes[31] |= 64;
    bytes
}

impl SecretKey {
    /// Build a secret key from 32 bytes of random material, applying
    /// X25519 clamping.
    ///
    /// # Arguments
    /// - `bytes`: 32 bytes of secret material, typically from a CSPRNG
    ///
    /// # Errors
    /// Returns an error if `bytes` is not exactly 32 bytes long.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 32 {
            return Err(Error::protocol(format!(
                "invalid x25519 secret length: expected 32 bytes, got {}",
                bytes.len()
            )));
        }
        let mut array = [0u8; 32];
        array.copy_from_slice(bytes);
        let clamped = clamp(array);
        array.zeroize();
        Ok(Self { scalar: Scalar::from_bytes_mod_order(clamped) })
    }

    /// Generate a fresh ephemeral keypair.
    pub fn generate() -> (Self, PublicKey) {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let scalar = Scalar::from_bytes_mod_order(clamp(bytes));
        bytes.zeroize();
        let secret = Self { scalar };
        let public = secret.public_key();
        (secret, public)
    }

    pub fn public_key(&self) -> PublicKey {
        let point = &self.scalar * &curve25519_dalek::constants::X25519_BASEPOINT;
        PublicKey::from(*point.as_bytes())
    }
}

/// The shared secret derived from an X25519 exchange.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret {
    bytes: [u8; 32],
}

impl SharedSecret {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSecret").field("bytes", &"[REDACTED]").finish()
    }
}

/// Derive the shared secret for `our_secret` and `their_public`.
/// Rejects low-order points (an all-zero result), which indicates a
/// contributory-behavior attack rather than a genuine exchange.
///
/// # Arguments
/// - `our_secret`: this side's X25519 secret scalar
/// - `their_public`: the peer's X25519 public key, as received over
///   the wire
///
/// # Errors
/// Returns an error if the computed point is the all-zero low-order
/// point.
pub fn derive_shared_secret(our_secret: &SecretKey, their_public: &PublicKey) -> Result<SharedSecret> {
    let their_point = MontgomeryPoint(*their_public.as_bytes());
    let shared_point = &our_secret.scalar * their_point;
    let bytes = *shared_point.as_bytes();

    if bytes == [0u8; 32] {
        return Err(Error::protocol("key agreement failed: low-order point"));
    }

    Ok(SharedSecret { bytes })
}

/// # Errors
/// Returns an error if `bytes` is not exactly 32 bytes long.
pub fn public_key_from_bytes(bytes: &[u8]) -> Result<PublicKey> {
    if bytes.len() != 32 {
        return Err(Error::protocol(format!(
            "invalid x25519 public key length: expected 32 bytes, got {}",
            bytes.len()
        )));
    }
    let mut array = [0u8; 32];
    array.copy_from_slice(bytes);
    Ok(PublicKey::from(array))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_sides_derive_the_same_shared_secret() {
        let (alice_secret, alice_public) = SecretKey::generate();
        let (bob_secret, bob_public) = SecretKey::generate();

        let alice_shared = derive_shared_secret(&alice_secret, &bob_public).unwrap();
        let bob_shared = derive_shared_secret(&bob_secret, &alice_public).unwrap();

        assert_eq!(alice_shared.as_bytes(), bob_shared.as_bytes());
        assert_ne!(alice_shared.as_bytes(), &[0u8; 32]);
    }

    #[test]
    fn rejects_low_order_point() {
        let (secret, _) = SecretKey::generate();
        let bad_public = PublicKey::from([0u8; 32]);
        assert!(derive_shared_secret(&secret, &bad_public).is_err());
    }

    #[test]
    fn rejects_malformed_public_key_length() {
        assert!(public_key_from_bytes(&[0u8; 31]).is_err());
    }

    #[test]
    fn debug_redacts_shared_secret() {
        let (a, _) = SecretKey::generate();
        let (_, bp) = SecretKey::generate();
        let shared = derive_shared_secret(&a, &bp).unwrap();
        assert!(format!("{shared:?}").contains("REDACTED"));
    }
}
