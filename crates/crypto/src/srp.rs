//! SRP-6a client exchange for Pair-Setup.
//!
//! HAP fixes the SRP username to the literal `"Pair-Setup"`, the
//! password to the setup PIN, and the group to the 3072-bit group with
//! a SHA-512 digest.

use hap_core::{Error, Result};
use sha2::Sha512;
use srp::client::{SrpClient, SrpClientVerifier};
use srp::groups::G_3072;
use zeroize::Zeroizing;

/// The fixed SRP identity HAP uses for every Pair-Setup exchange.
pub const USERNAME: &[u8] = b"Pair-Setup";

/// An in-progress client-side SRP-6a exchange, holding the private
/// ephemeral value `a` until the accessory's reply arrives.
pub struct ClientSession {
    a: Zeroizing<Vec<u8>>,
    client: SrpClient<'static, Sha512>,
}

impl ClientSession {
    /// Start a session with `a_private` as the client's private
    /// ephemeral value (generate with a CSPRNG; at least 32 bytes).
    pub fn new(a_private: Vec<u8>) -> Self {
        Self {
            a: Zeroizing::new(a_private),
            client: SrpClient::<Sha512>::new(&G_3072),
        }
    }

    /// The public ephemeral `A` to send as M3's `PublicKey`.
    pub fn public_ephemeral(&self) -> Vec<u8> {
        self.client.compute_public_ephemeral(&self.a)
    }

    /// Consume the session with the accessory's `{B, salt}` from M2
    /// and the setup PIN, producing the verified session that can
    /// check the accessory's M4 proof and expose the shared key.
    ///
    /// # Arguments
    /// - `pin`: the setup PIN, ASCII digits with dashes stripped
    /// - `salt`: `Salt` from M2
    /// - `b_pub`: `PublicKey` (the accessory's `B`) from M2
    ///
    /// # Errors
    /// Returns an error if the SRP-6a exchange itself fails (malformed
    /// `b_pub`, or `B` reduces to zero mod N).
    pub fn process_reply(self, pin: &[u8], salt: &[u8], b_pub: &[u8]) -> Result<VerifiedSession> {
        let verifier = self
            .client
            .process_reply(&self.a, USERNAME, pin, salt, b_pub)
            .map_err(|e| Error::protocol(format!("srp exchange failed: {e}")))?;
        Ok(VerifiedSession { verifier })
    }
}

/// A completed SRP-6a exchange: the client has computed its proof and
/// the shared key, and can verify the accessory's proof in return.
pub struct VerifiedSession {
    verifier: SrpClientVerifier<Sha512>,
}

impl std::fmt::Debug for VerifiedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifiedSession").finish_non_exhaustive()
    }
}

impl VerifiedSession {
    /// `M1`, sent as M3's `Proof`.
    pub fn proof(&self) -> &[u8] {
        self.verifier.proof()
    }

    /// Verify the accessory's `M2` proof from M4. Fails closed on
    /// mismatch.
    ///
    /// # Errors
    /// Returns an error if `server_proof` doesn't match the proof this
    /// session computes from the same exchange, which most often means
    /// the PIN was wrong.
    pub fn verify_server(&self, server_proof: &[u8]) -> Result<()> {
        self.verifier
            .verify_server(server_proof)
            .map_err(|e| Error::protocol(format!("srp server proof rejected: {e}")))
    }

    /// The shared key (`SRP-K`), used as HKDF input material for the
    /// remainder of Pair-Setup.
    pub fn shared_key(&self) -> &[u8] {
        self.verifier.key()
    }
}
