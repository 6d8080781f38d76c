//! Cryptographic primitives for the HomeKit Accessory Protocol: SRP-6a
//! (Pair-Setup), X25519 (Pair-Verify), Ed25519 (long-term identity),
//! HKDF-SHA-512 (key derivation) and ChaCha20-Poly1305 (session and
//! per-message encryption).
//!
//! These are thin, HAP-shaped wrappers over RustCrypto primitives, not
//! a general-purpose crypto library; callers outside `hap-pairing` and
//! `hap-transport-*` should rarely need this crate directly.

pub mod aead;
pub mod key_agreement;
pub mod key_derivation;
pub mod signing;
pub mod srp;

pub use aead::{Cipher, SessionKey, NONCE_SIZE, TAG_SIZE};
pub use key_agreement::{derive_shared_secret, public_key_from_bytes, SecretKey, SharedSecret};
pub use key_derivation::derive as derive_key;
