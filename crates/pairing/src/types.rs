//! The data model persisted and held live around a pairing: long-term
//! identity material, derived session keys, and the per-connection
//! frame counters they protect.

use ed25519_dalek::{SigningKey, VerifyingKey};
use hap_core::{Error, Result};
use zeroize::Zeroizing;

/// Long-term pairing identity, persisted by the caller once Pair-Setup
/// completes. All fields are present together or not at all; without
/// them only `identify`, `startPairing` and `finishPairing` may run.
pub struct PairingData {
    pub accessory_pairing_id: Vec<u8>,
    pub accessory_long_term_public_key: VerifyingKey,
    pub controller_pairing_id: String,
    controller_long_term_secret_key: Zeroizing<[u8; 32]>,
    pub controller_long_term_public_key: VerifyingKey,
}

impl PairingData {
    pub fn new(
        accessory_pairing_id: Vec<u8>,
        accessory_long_term_public_key: VerifyingKey,
        controller_pairing_id: String,
        controller_long_term_secret_key: [u8; 32],
        controller_long_term_public_key: VerifyingKey,
    ) -> Self {
        Self {
            accessory_pairing_id,
            accessory_long_term_public_key,
            controller_pairing_id,
            controller_long_term_secret_key: Zeroizing::new(controller_long_term_secret_key),
            controller_long_term_public_key,
        }
    }

    pub fn controller_signing_key(&self) -> SigningKey {
        SigningKey::from_bytes(&self.controller_long_term_secret_key)
    }

    /// The five hex strings this persists to, per the caller's own
    /// storage format.
    pub fn to_hex_parts(&self) -> PairingDataHex {
        PairingDataHex {
            accessory_pairing_id: hex::encode(&self.accessory_pairing_id),
            accessory_long_term_public_key: hex::encode(self.accessory_long_term_public_key.as_bytes()),
            controller_pairing_id: self.controller_pairing_id.clone(),
            controller_long_term_secret_key: hex::encode(*self.controller_long_term_secret_key),
            controller_long_term_public_key: hex::encode(self.controller_long_term_public_key.as_bytes()),
        }
    }

    pub fn from_hex_parts(parts: &PairingDataHex) -> Result<Self> {
        let accessory_pairing_id =
            hex::decode(&parts.accessory_pairing_id).map_err(|e| Error::usage(format!("bad accessory_pairing_id hex: {e}")))?;
        let accessory_long_term_public_key = decode_verifying_key(&parts.accessory_long_term_public_key)?;
        let controller_long_term_secret_key = decode_32(&parts.controller_long_term_secret_key, "controller_long_term_secret_key")?;
        let controller_long_term_public_key = decode_verifying_key(&parts.controller_long_term_public_key)?;

        Ok(Self::new(
            accessory_pairing_id,
            accessory_long_term_public_key,
            parts.controller_pairing_id.clone(),
            controller_long_term_secret_key,
            controller_long_term_public_key,
        ))
    }
}

impl std::fmt::Debug for PairingData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairingData")
            .field("accessory_pairing_id", &self.accessory_pairing_id)
            .field("controller_pairing_id", &self.controller_pairing_id)
            .field("controller_long_term_secret_key", &"[REDACTED]")
            .finish()
    }
}

/// [`PairingData`] in its on-disk hex-string form.
#[derive(Debug, Clone)]
pub struct PairingDataHex {
    pub accessory_pairing_id: String,
    pub accessory_long_term_public_key: String,
    pub controller_pairing_id: String,
    pub controller_long_term_secret_key: String,
    pub controller_long_term_public_key: String,
}

fn decode_32(hex_str: &str, field: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(hex_str).map_err(|e| Error::usage(format!("bad {field} hex: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| Error::usage(format!("{field} must decode to exactly 32 bytes")))
}

fn decode_verifying_key(hex_str: &str) -> Result<VerifyingKey> {
    let bytes = decode_32(hex_str, "public key")?;
    VerifyingKey::from_bytes(&bytes).map_err(|e| Error::usage(format!("invalid ed25519 public key: {e}")))
}

/// The two 32-byte session keys derived after a successful Pair-Verify
/// (or Pair-Resume), attached to at most one live connection.
#[derive(Clone)]
pub struct SessionKeys {
    pub accessory_to_controller_key: [u8; 32],
    pub controller_to_accessory_key: [u8; 32],
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeys").field("keys", &"[REDACTED]").finish()
    }
}

/// Monotone per-connection frame counters. Never reset while the
/// connection is open; destroyed with it on disconnect.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameCounters {
    /// Accessory-to-controller (inbound) counter.
    pub a2c: u64,
    /// Controller-to-accessory (outbound) counter.
    pub c2a: u64,
}

/// State carried forward from a successful Pair-Verify so a later
/// Pair-Resume can skip the full SRP-free verify round trip.
#[derive(Clone)]
pub struct ResumeState {
    pub shared_secret: [u8; 32],
    pub session_id: [u8; 8],
}

impl std::fmt::Debug for ResumeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResumeState")
            .field("shared_secret", &"[REDACTED]")
            .field("session_id", &hex::encode(self.session_id))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;
    use rand::RngCore;

    fn sample_pairing_data() -> PairingData {
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        let controller_signing = SigningKey::from_bytes(&seed);
        let mut accessory_seed = [0u8; 32];
        OsRng.fill_bytes(&mut accessory_seed);
        let accessory_signing = SigningKey::from_bytes(&accessory_seed);

        PairingData::new(
            b"AA:BB:CC:DD:EE:FF".to_vec(),
            accessory_signing.verifying_key(),
            uuid::Uuid::new_v4().to_string(),
            seed,
            controller_signing.verifying_key(),
        )
    }

    #[test]
    fn round_trips_through_hex_parts() {
        let data = sample_pairing_data();
        let hex_parts = data.to_hex_parts();
        let restored = PairingData::from_hex_parts(&hex_parts).unwrap();

        assert_eq!(restored.accessory_pairing_id, data.accessory_pairing_id);
        assert_eq!(restored.controller_pairing_id, data.controller_pairing_id);
        assert_eq!(
            restored.controller_long_term_public_key.as_bytes(),
            data.controller_long_term_public_key.as_bytes()
        );
    }

    #[test]
    fn debug_does_not_leak_secret_key() {
        let data = sample_pairing_data();
        let hex_parts = data.to_hex_parts();
        let debug_str = format!("{data:?}");
        assert!(!debug_str.contains(&hex_parts.controller_long_term_secret_key));
    }
}
