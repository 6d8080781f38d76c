//! Pair-Resume: a shortened re-verify that skips the Ed25519 signature
//! exchange by reusing a shared secret and session id from a prior
//! Pair-Verify. Any failure here must fall back to a full Pair-Verify
//! rather than aborting the connection.

use crate::message::{expect_state, require_value};
use crate::state_machine::{PairResumeEvent, PairResumeMachine, PairResumeState};
use crate::tag::{self, Method};
use crate::types::{ResumeState, SessionKeys};
use crate::verify::derive_session_keys;
use hap_core::{Error, Result};
use hap_crypto::key_agreement::SecretKey;
use hap_crypto::{aead, key_derivation};
use hap_tlv::{decode, encode, Tlv8};

/// Outcome of feeding M2 to an in-progress [`PairResume`].
pub enum AfterM2 {
    Resumed(SessionKeys),
    /// The accessory did not recognize the session id, or decryption
    /// failed; the caller must start a full Pair-Verify instead.
    FallBackToVerify,
}

/// Driver for one Pair-Resume exchange.
pub struct PairResume {
    machine: PairResumeMachine,
    prior: ResumeState,
    our_public: [u8; 32],
}

impl PairResume {
    /// Build M1 from the shared secret and session id carried forward
    /// from a prior Pair-Verify. The fresh ephemeral key only guards
    /// against nonce/salt reuse across resume attempts; Pair-Resume
    /// itself never performs a new ECDH.
    pub fn start(prior: ResumeState) -> (Self, Vec<u8>) {
        let (_secret, public) = SecretKey::generate();
        let our_public = *public.as_bytes();

        let request_key = key_derivation::derive(
            &prior.shared_secret,
            Some(&request_salt(&our_public, &prior.session_id)),
            b"Pair-Resume-Request-Info",
            32,
        )
        .expect("fixed 32-byte output length never fails");

        let cipher = aead::Cipher::new(aead::SessionKey::from_bytes(&request_key).expect("derive() always returns 32 bytes"));
        let nonce = aead::nonce::fixed(b"PR-Msg01");
        let encrypted = cipher.encrypt(&nonce, &[], b"").expect("encrypting an empty buffer cannot fail");

        let m1 = Tlv8::new()
            .push(tag::STATE, vec![1])
            .push(tag::METHOD, vec![Method::PairResume as u8])
            .push(tag::PUBLIC_KEY, our_public.to_vec())
            .push(tag::SESSION_ID, prior.session_id.to_vec())
            .push(tag::ENCRYPTED_DATA, encrypted);

        let mut machine = PairResumeMachine::new();
        machine.transition(PairResumeEvent::SentM1).expect("Start -> AwaitingM2 is always valid");

        (Self { machine, prior, our_public }, encode(&m1))
    }

    pub fn state(&self) -> PairResumeState {
        self.machine.state()
    }

    /// Consume M2. A decrypt failure (the accessory no longer
    /// recognizes the session) reports [`AfterM2::FallBackToVerify`]
    /// rather than an error.
    pub fn handle_m2(mut self, m2: &[u8]) -> Result<AfterM2> {
        let tlv = decode(m2)?;
        if let Err(err) = expect_state(&tlv, 2) {
            self.machine.transition(PairResumeEvent::DecryptionFailed)?;
            tracing::debug!("pair-resume: accessory rejected session, falling back to pair-verify");
            return match err {
                Error::Accessory { .. } => Ok(AfterM2::FallBackToVerify),
                other => Err(other),
            };
        }

        let new_session_id = require_value(&tlv, tag::SESSION_ID, "SessionID")?;
        let encrypted = require_value(&tlv, tag::ENCRYPTED_DATA, "EncryptedData")?;

        let response_key = key_derivation::derive(
            &self.prior.shared_secret,
            Some(&request_salt(&self.our_public, new_session_id)),
            b"Pair-Resume-Response-Info",
            32,
        )?;
        let cipher = aead::Cipher::new(aead::SessionKey::from_bytes(&response_key)?);
        let nonce = aead::nonce::fixed(b"PR-Msg02");

        match cipher.decrypt(&nonce, encrypted, b"") {
            Err(_) => {
                self.machine.transition(PairResumeEvent::DecryptionFailed)?;
                Ok(AfterM2::FallBackToVerify)
            }
            Ok(_empty) => {
                self.machine.transition(PairResumeEvent::ReceivedM2)?;

                let new_shared_secret = key_derivation::derive(
                    &self.prior.shared_secret,
                    Some(&request_salt(&self.our_public, new_session_id)),
                    b"Pair-Resume-Shared-Secret-Info",
                    32,
                )?;
                let keys = derive_session_keys(&new_shared_secret)?;
                Ok(AfterM2::Resumed(keys))
            }
        }
    }
}

fn request_salt(our_public: &[u8; 32], session_id: &[u8]) -> Vec<u8> {
    let mut salt = Vec::with_capacity(40);
    salt.extend_from_slice(our_public);
    salt.extend_from_slice(session_id);
    salt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_resume_state() -> ResumeState {
        ResumeState { shared_secret: [5u8; 32], session_id: [9u8; 8] }
    }

    #[test]
    fn start_builds_m1_with_prior_session_id() {
        let (resume, m1) = PairResume::start(sample_resume_state());
        assert_eq!(resume.state(), PairResumeState::AwaitingM2);
        let tlv = decode(&m1).unwrap();
        assert_eq!(tlv.get_value(tag::SESSION_ID), Some(&[9u8; 8][..]));
        assert_eq!(tlv.get_value(tag::METHOD), Some(&[Method::PairResume as u8][..]));
    }

    #[test]
    fn handle_m2_falls_back_on_accessory_error() {
        let (resume, _) = PairResume::start(sample_resume_state());
        let m2 = encode(&Tlv8::new().push(tag::STATE, vec![2]).push(tag::ERROR, vec![6]));
        match resume.handle_m2(&m2).unwrap() {
            AfterM2::FallBackToVerify => {}
            AfterM2::Resumed(_) => panic!("expected fallback"),
        }
    }

    #[test]
    fn handle_m2_falls_back_on_undecryptable_payload() {
        let (resume, _) = PairResume::start(sample_resume_state());
        let m2 = encode(
            &Tlv8::new()
                .push(tag::STATE, vec![2])
                .push(tag::SESSION_ID, vec![1; 8])
                .push(tag::ENCRYPTED_DATA, vec![0xAB; 16]),
        );
        match resume.handle_m2(&m2).unwrap() {
            AfterM2::FallBackToVerify => {}
            AfterM2::Resumed(_) => panic!("expected fallback on bad ciphertext"),
        }
    }
}
