//! Pair-Verify: M1 through M4. Runs on every new connection before any
//! encrypted characteristic traffic, using the long-term identity
//! established by a prior Pair-Setup.

use crate::message::{expect_state, require_value};
use crate::state_machine::{PairVerifyEvent, PairVerifyMachine, PairVerifyState};
use crate::tag;
use crate::types::{PairingData, SessionKeys};
use ed25519_dalek::Signature;
use hap_core::{Error, Result};
use hap_crypto::key_agreement::{self, SecretKey, SharedSecret};
use hap_crypto::{aead, key_derivation, signing};
use hap_tlv::{decode, encode, Tlv8};

/// Driver for one Pair-Verify exchange.
pub struct PairVerify<'a> {
    machine: PairVerifyMachine,
    pairing: &'a PairingData,
    our_secret: Option<SecretKey>,
    our_public: [u8; 32],
    shared_secret: Option<SharedSecret>,
    resume_session_id: Option<[u8; 8]>,
}

impl<'a> PairVerify<'a> {
    /// Build M1 and start the exchange against the stored `pairing`.
    pub fn start(pairing: &'a PairingData) -> (Self, Vec<u8>) {
        let (secret, public) = SecretKey::generate();
        let public_bytes = *public.as_bytes();

        let m1 = Tlv8::new().push(tag::STATE, vec![1]).push(tag::PUBLIC_KEY, public_bytes.to_vec());

        let mut machine = PairVerifyMachine::new();
        machine.transition(PairVerifyEvent::SentM1).expect("Start -> AwaitingM2 is always valid");

        (
            Self {
                machine,
                pairing,
                our_secret: Some(secret),
                our_public: public_bytes,
                shared_secret: None,
                resume_session_id: None,
            },
            encode(&m1),
        )
    }

    pub fn state(&self) -> PairVerifyState {
        self.machine.state()
    }

    /// Resume-session id derived alongside the session keys, usable by
    /// a later Pair-Resume. Only set once M2 has been processed.
    pub fn resume_session_id(&self) -> Option<[u8; 8]> {
        self.resume_session_id
    }

    /// Consume M2, verify the accessory's identity, and build M3.
    pub fn handle_m2(mut self, m2: &[u8]) -> Result<(Self, Vec<u8>)> {
        let tlv = decode(m2)?;
        expect_state(&tlv, 2)?;
        self.machine.transition(PairVerifyEvent::ReceivedM2)?;

        let accessory_public_bytes = require_value(&tlv, tag::PUBLIC_KEY, "PublicKey")?;
        let encrypted = require_value(&tlv, tag::ENCRYPTED_DATA, "EncryptedData")?;

        let accessory_public = key_agreement::public_key_from_bytes(accessory_public_bytes)?;
        let our_secret = self.our_secret.take().expect("set in start, consumed exactly once here");
        let shared = key_agreement::derive_shared_secret(&our_secret, &accessory_public)?;

        let verify_session_key =
            key_derivation::derive(shared.as_bytes(), Some(b"Pair-Verify-Encrypt-Salt"), b"Pair-Verify-Encrypt-Info", 32)?;
        let resume_session_id =
            key_derivation::derive(shared.as_bytes(), Some(b"Pair-Verify-Resume-Salt"), b"Pair-Verify-Resume-Info", 8)?;

        let cipher = aead::Cipher::new(aead::SessionKey::from_bytes(&verify_session_key)?);
        let nonce = aead::nonce::fixed(b"PV-Msg02");
        let inner_bytes = cipher.decrypt(&nonce, encrypted, b"")?;
        let inner = decode(&inner_bytes)?;

        let accessory_pairing_id = require_value(&inner, tag::IDENTIFIER, "Identifier")?;
        if accessory_pairing_id != self.pairing.accessory_pairing_id {
            return Err(Error::protocol("Pair-Verify M2 identifier does not match the stored pairing"));
        }
        let signature_bytes = require_value(&inner, tag::SIGNATURE, "Signature")?;
        let signature = Signature::try_from(signature_bytes)
            .map_err(|e| Error::protocol(format!("malformed accessory signature: {e}")))?;

        let mut accessory_info = Vec::new();
        accessory_info.extend_from_slice(accessory_public_bytes);
        accessory_info.extend_from_slice(accessory_pairing_id);
        accessory_info.extend_from_slice(&self.our_public);
        signing::verify(&self.pairing.accessory_long_term_public_key, &accessory_info, &signature)?;

        let controller_signing_key = self.pairing.controller_signing_key();
        let mut controller_info = Vec::new();
        controller_info.extend_from_slice(&self.our_public);
        controller_info.extend_from_slice(self.pairing.controller_pairing_id.as_bytes());
        controller_info.extend_from_slice(accessory_public_bytes);
        let our_signature = signing::sign(&controller_signing_key, &controller_info);

        let m3_inner = Tlv8::new()
            .push(tag::IDENTIFIER, self.pairing.controller_pairing_id.as_bytes().to_vec())
            .push(tag::SIGNATURE, our_signature.to_bytes().to_vec());
        let nonce = aead::nonce::fixed(b"PV-Msg03");
        let m3_encrypted = cipher.encrypt(&nonce, &encode(&m3_inner), b"")?;

        let m3 = Tlv8::new().push(tag::STATE, vec![3]).push(tag::ENCRYPTED_DATA, m3_encrypted);

        self.machine.transition(PairVerifyEvent::SentM3)?;
        self.shared_secret = Some(shared);
        let mut session_id = [0u8; 8];
        session_id.copy_from_slice(&resume_session_id);
        self.resume_session_id = Some(session_id);

        Ok((self, encode(&m3)))
    }

    /// Consume M4 and derive the session keys that protect every
    /// subsequent characteristic read/write on this connection.
    pub fn handle_m4(mut self, m4: &[u8]) -> Result<SessionKeys> {
        let tlv = decode(m4)?;
        expect_state(&tlv, 4)?;
        self.machine.transition(PairVerifyEvent::ReceivedM4)?;

        let shared = self.shared_secret.take().expect("set in handle_m2, consumed exactly once here");
        tracing::debug!("pair-verify: completed, deriving session keys");
        derive_session_keys(shared.as_bytes())
    }
}

/// Shared by Pair-Verify M4 and a successful Pair-Resume M2: derive
/// the two directional session keys from the verify/resume shared
/// secret.
pub fn derive_session_keys(shared_secret: &[u8]) -> Result<SessionKeys> {
    let read_key = key_derivation::derive(shared_secret, Some(b"Control-Salt"), b"Control-Read-Encryption-Key", 32)?;
    let write_key = key_derivation::derive(shared_secret, Some(b"Control-Salt"), b"Control-Write-Encryption-Key", 32)?;

    let mut accessory_to_controller_key = [0u8; 32];
    accessory_to_controller_key.copy_from_slice(&read_key);
    let mut controller_to_accessory_key = [0u8; 32];
    controller_to_accessory_key.copy_from_slice(&write_key);

    Ok(SessionKeys { accessory_to_controller_key, controller_to_accessory_key })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;
    use rand::RngCore;

    fn sample_pairing() -> PairingData {
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
    fn start_builds_m1_with_fresh_ephemeral_key() {
        let pairing = sample_pairing();
        let (verify, m1) = PairVerify::start(&pairing);
        assert_eq!(verify.state(), PairVerifyState::AwaitingM2);
        let tlv = decode(&m1).unwrap();
        assert_eq!(tlv.get_value(tag::PUBLIC_KEY).unwrap().len(), 32);
    }

    #[test]
    fn handle_m2_rejects_accessory_error() {
        let pairing = sample_pairing();
        let (verify, _) = PairVerify::start(&pairing);
        let m2 = encode(&Tlv8::new().push(tag::STATE, vec![2]).push(tag::ERROR, vec![2]));
        assert!(verify.handle_m2(&m2).is_err());
    }

    #[test]
    fn session_keys_are_directionally_distinct() {
        let keys = derive_session_keys(&[7u8; 32]).unwrap();
        assert_ne!(keys.accessory_to_controller_key, keys.controller_to_accessory_key);
    }
}
