//! Ed25519 signing, used for the controller and accessory long-term
//! identity keys exchanged during Pair-Setup.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use hap_core::{Error, Result};

pub fn sign(signing_key: &SigningKey, message: &[u8]) -> Signature {
    signing_key.sign(message)
}

/// # Errors
/// Returns an error if `signature` does not verify against `message`
/// under `verifying_key`.
pub fn verify(verifying_key: &VerifyingKey, message: &[u8], signature: &Signature) -> Result<()> {
    verifying_key
        .verify(message, signature)
        .map_err(|e| Error::protocol(format!("signature verification failed: {e}")))
}
