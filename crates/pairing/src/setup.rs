//! Pair-Setup: M1 through M6.

use crate::message::{expect_state, require_value};
use crate::pin;
use crate::state_machine::{PairSetupEvent, PairSetupMachine, PairSetupState};
use crate::tag::{self, Method};
use crate::types::PairingData;
use ed25519_dalek::{Signature, SigningKey, VerifyingKey};
use hap_core::{Error, Result};
use hap_crypto::{aead, key_derivation, signing, srp};
use hap_tlv::{decode, encode, Tlv8};
use rand::rngs::OsRng;
use rand::RngCore;

/// Outcome of feeding M4 to an in-progress [`PairSetup`].
pub enum AfterM4 {
    /// Transient-only: pairing is authenticated but no identity was
    /// exchanged. No M5/M6 follow.
    Done,
    /// Continue with long-term identity exchange; the bytes are M5.
    SendM5(PairSetup, Vec<u8>),
}

/// Driver for one Pair-Setup exchange, holding scratch state between
/// messages: the SRP session between M2 and M4, and the derived
/// signing material between M4 and M6.
#[derive(Debug)]
pub struct PairSetup {
    machine: PairSetupMachine,
    transient: bool,
    verified_srp: Option<srp::VerifiedSession>,
    controller_pairing_id: String,
    controller_signing_key: SigningKey,
    setup_session_key: Option<Vec<u8>>,
    accessory_x: Option<Vec<u8>>,
}

impl PairSetup {
    /// Build M1 and start the exchange.
    pub fn start(method: Method, flags: Option<u32>) -> (Self, Vec<u8>) {
        let transient = flags.map(|f| f & tag::FLAG_TRANSIENT != 0).unwrap_or(false);

        let mut tlv = Tlv8::new().push(tag::STATE, vec![1]).push(tag::METHOD, vec![method as u8]);
        if let Some(flags) = flags {
            tlv = tlv.push(tag::FLAGS, flags.to_le_bytes().to_vec());
        }

        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        let controller_signing_key = SigningKey::from_bytes(&seed);

        let mut machine = PairSetupMachine::new();
        machine.transition(PairSetupEvent::SentM1).expect("Start -> AwaitingM2 is always valid");
        tracing::debug!(?method, transient, "pair-setup: sent M1");

        (
            Self {
                machine,
                transient,
                verified_srp: None,
                controller_pairing_id: uuid::Uuid::new_v4().to_string(),
                controller_signing_key,
                setup_session_key: None,
                accessory_x: None,
            },
            encode(&tlv),
        )
    }

    pub fn state(&self) -> PairSetupState {
        self.machine.state()
    }

    /// Consume M2, derive the SRP client proof, and build M3.
    pub fn handle_m2(mut self, m2: &[u8], pin: &str) -> Result<(Self, Vec<u8>)> {
        pin::validate(pin)?;
        let tlv = decode(m2)?;
        expect_state(&tlv, 2)?;
        self.machine.transition(PairSetupEvent::ReceivedM2)?;

        let public_key = require_value(&tlv, tag::PUBLIC_KEY, "PublicKey")?;
        let salt = require_value(&tlv, tag::SALT, "Salt")?;

        let mut a_private = vec![0u8; 64];
        OsRng.fill_bytes(&mut a_private);
        let srp_session = srp::ClientSession::new(a_private);
        let a_public = srp_session.public_ephemeral();
        let verified = srp_session.process_reply(pin.as_bytes(), salt, public_key)?;

        let m3 = Tlv8::new()
            .push(tag::STATE, vec![3])
            .push(tag::PUBLIC_KEY, a_public)
            .push(tag::PROOF, verified.proof().to_vec());

        self.verified_srp = Some(verified);
        self.machine.transition(PairSetupEvent::SentM3)?;

        Ok((self, encode(&m3)))
    }

    /// Consume M4. If this session was started with the Transient
    /// flag, the exchange ends here; otherwise continue to M5.
    pub fn handle_m4(mut self, m4: &[u8]) -> Result<AfterM4> {
        let tlv = decode(m4)?;
        expect_state(&tlv, 4)?;

        let proof = require_value(&tlv, tag::PROOF, "Proof")?;
        let verified = self
            .verified_srp
            .as_ref()
            .ok_or_else(|| Error::usage("handle_m4 called before handle_m2"))?;
        verified.verify_server(proof)?;

        if self.transient {
            self.machine.transition(PairSetupEvent::ReceivedM4Transient)?;
            return Ok(AfterM4::Done);
        }
        self.machine.transition(PairSetupEvent::ReceivedM4Full)?;

        let srp_k = self.verified_srp.take().expect("checked above").shared_key().to_vec();

        let ios_device_x = key_derivation::derive(
            &srp_k,
            Some(b"Pair-Setup-Controller-Sign-Salt"),
            b"Pair-Setup-Controller-Sign-Info",
            32,
        )?;

        let controller_ltpk = self.controller_signing_key.verifying_key();
        let mut ios_device_info = Vec::new();
        ios_device_info.extend_from_slice(&ios_device_x);
        ios_device_info.extend_from_slice(self.controller_pairing_id.as_bytes());
        ios_device_info.extend_from_slice(controller_ltpk.as_bytes());
        let signature = signing::sign(&self.controller_signing_key, &ios_device_info);

        let inner = Tlv8::new()
            .push(tag::IDENTIFIER, self.controller_pairing_id.as_bytes().to_vec())
            .push(tag::PUBLIC_KEY, controller_ltpk.as_bytes().to_vec())
            .push(tag::SIGNATURE, signature.to_bytes().to_vec());

        let setup_session_key =
            key_derivation::derive(&srp_k, Some(b"Pair-Setup-Encrypt-Salt"), b"Pair-Setup-Encrypt-Info", 32)?;
        let cipher = aead::Cipher::new(aead::SessionKey::from_bytes(&setup_session_key)?);
        let nonce = aead::nonce::fixed(b"PS-Msg05");
        let encrypted = cipher.encrypt(&nonce, &encode(&inner), b"")?;

        let accessory_x =
            key_derivation::derive(&srp_k, Some(b"Pair-Setup-Accessory-Sign-Salt"), b"Pair-Setup-Accessory-Sign-Info", 32)?;

        let m5 = Tlv8::new().push(tag::STATE, vec![5]).push(tag::ENCRYPTED_DATA, encrypted);

        self.machine.transition(PairSetupEvent::SentM5)?;
        self.setup_session_key = Some(setup_session_key.to_vec());
        self.accessory_x = Some(accessory_x.to_vec());

        Ok(AfterM4::SendM5(self, encode(&m5)))
    }

    /// Consume M6, verify the accessory's long-term identity, and
    /// return the pairing data to persist.
    pub fn handle_m6(mut self, m6: &[u8]) -> Result<PairingData> {
        let setup_session_key = self
            .setup_session_key
            .take()
            .ok_or_else(|| Error::usage("handle_m6 called before handle_m4 completed the full (non-transient) flow"))?;
        let accessory_x = self.accessory_x.take().expect("set alongside setup_session_key in handle_m4");

        let tlv = decode(m6)?;
        expect_state(&tlv, 6)?;

        let cipher = aead::Cipher::new(aead::SessionKey::from_bytes(&setup_session_key)?);
        let nonce = aead::nonce::fixed(b"PS-Msg06");
        let encrypted = require_value(&tlv, tag::ENCRYPTED_DATA, "EncryptedData")?;
        let inner_bytes = cipher.decrypt(&nonce, encrypted, b"")?;
        let inner = decode(&inner_bytes)?;

        let accessory_pairing_id = require_value(&inner, tag::IDENTIFIER, "Identifier")?.to_vec();
        let accessory_ltpk_bytes = require_value(&inner, tag::PUBLIC_KEY, "PublicKey")?;
        let signature_bytes = require_value(&inner, tag::SIGNATURE, "Signature")?;

        let accessory_ltpk_array: [u8; 32] = accessory_ltpk_bytes
            .try_into()
            .map_err(|_| Error::protocol("accessory long-term public key must be 32 bytes"))?;
        let accessory_ltpk = VerifyingKey::from_bytes(&accessory_ltpk_array)
            .map_err(|e| Error::protocol(format!("invalid accessory long-term public key: {e}")))?;
        let signature = Signature::try_from(signature_bytes)
            .map_err(|e| Error::protocol(format!("malformed accessory signature: {e}")))?;

        let mut accessory_info = Vec::new();
        accessory_info.extend_from_slice(&accessory_x);
        accessory_info.extend_from_slice(&accessory_pairing_id);
        accessory_info.extend_from_slice(accessory_ltpk.as_bytes());
        signing::verify(&accessory_ltpk, &accessory_info, &signature)?;

        self.machine.transition(PairSetupEvent::ReceivedM6)?;
        tracing::info!(controller_pairing_id = %self.controller_pairing_id, "pair-setup: completed");

        let mut seed = [0u8; 32];
        seed.copy_from_slice(self.controller_signing_key.to_bytes().as_slice());

        Ok(PairingData::new(
            accessory_pairing_id,
            accessory_ltpk,
            self.controller_pairing_id.clone(),
            seed,
            self.controller_signing_key.verifying_key(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_builds_m1_with_method_and_flags() {
        let (setup, m1) = PairSetup::start(Method::PairSetup, Some(tag::FLAG_TRANSIENT));
        assert_eq!(setup.state(), PairSetupState::AwaitingM2);
        let tlv = decode(&m1).unwrap();
        assert_eq!(tlv.get_value(tag::STATE), Some(&[1][..]));
        assert_eq!(tlv.get_value(tag::METHOD), Some(&[0][..]));
        assert!(tlv.get_value(tag::FLAGS).is_some());
    }

    #[test]
    fn handle_m2_rejects_malformed_pin_before_touching_srp() {
        let (setup, _) = PairSetup::start(Method::PairSetup, None);
        let m2 = encode(&Tlv8::new().push(tag::STATE, vec![2]).push(tag::PUBLIC_KEY, vec![1; 384]).push(tag::SALT, vec![1; 16]));
        assert!(setup.handle_m2(&m2, "not-a-pin").is_err());
    }

    #[test]
    fn handle_m2_rejects_accessory_error_response() {
        let (setup, _) = PairSetup::start(Method::PairSetup, None);
        let m2 = encode(&Tlv8::new().push(tag::STATE, vec![2]).push(tag::ERROR, vec![2]));
        let err = setup.handle_m2(&m2, "123-45-678").unwrap_err();
        match err {
            Error::Accessory { code, .. } => assert_eq!(code, 2),
            other => panic!("expected Accessory error, got {other:?}"),
        }
    }

    #[test]
    fn handle_m4_rejects_wrong_state() {
        let (setup, _) = PairSetup::start(Method::PairSetup, None);
        let m2 = encode(&Tlv8::new().push(tag::STATE, vec![2]).push(tag::PUBLIC_KEY, vec![1; 384]).push(tag::SALT, vec![1; 16]));
        let (setup, _) = setup.handle_m2(&m2, "123-45-678").unwrap();

        let bad_m4 = encode(&Tlv8::new().push(tag::STATE, vec![2]).push(tag::PROOF, vec![0; 64]));
        assert!(setup.handle_m4(&bad_m4).is_err());
    }
}
