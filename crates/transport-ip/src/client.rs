//! The HAP IP client: `identify`/pairing/`getAccessories`/`get`/`set`/
//! subscribe surface over a single TCP connection.

use crate::connection::IpConnection;
use crate::event;
use crate::http::{Request, CONTENT_TYPE_JSON, CONTENT_TYPE_TLV8};
use hap_core::types::{AccessoryDatabase, CharacteristicAddress};
use hap_core::{Error, Result};
use hap_pairing::{pairings, AfterPairResumeM2, AfterPairSetupM4, Method, PairResume, PairSetup, PairVerify, Permission};
use hap_pairing::{PairingData, ResumeState};
use hap_queue::OperationQueue;
use std::collections::HashSet;
use tokio::io::{AsyncRead, AsyncWrite};

/// A single connection's worth of HAP IP client state: pairing
/// identity (if any), resume state from the last verify, and the
/// primary/pairing operation queues named in the concurrency model.
pub struct IpClient<S> {
    connection: IpConnection<S>,
    pairing_data: Option<PairingData>,
    resume_state: Option<ResumeState>,
    subscribed: HashSet<CharacteristicAddress>,
    primary_queue: OperationQueue,
    pairing_queue: OperationQueue,
}

impl<S> IpClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, pairing_data: Option<PairingData>) -> Self {
        Self {
            connection: IpConnection::new(stream),
            pairing_data,
            resume_state: None,
            subscribed: HashSet::new(),
            primary_queue: OperationQueue::new(),
            pairing_queue: OperationQueue::new(),
        }
    }

    pub fn get_long_term_data(&self) -> Option<&PairingData> {
        self.pairing_data.as_ref()
    }

    /// POST `/identify`. Succeeds only on an unpaired accessory.
    pub async fn identify(&mut self) -> Result<()> {
        let response = self.connection.request(&Request::post("/identify", CONTENT_TYPE_JSON, Vec::new())).await?;
        if response.status == 204 {
            Ok(())
        } else {
            Err(Error::accessory_with_body(response.status as i32, "identify failed", response.body))
        }
    }

    /// `pairSetup` convenience composition: drives the whole Pair-Setup
    /// exchange (M1-M6) over `/pair-setup` and stores the resulting
    /// identity.
    pub async fn pair_setup(&mut self, pin: &str, method: Method, flags: Option<u32>) -> Result<()> {
        let (setup, m1) = PairSetup::start(method, flags);
        let m2 = Self::pairing_exchange(&mut self.connection, &mut self.pairing_queue, m1).await?;

        let (setup, m3) = setup.handle_m2(&m2, pin)?;
        let m4 = Self::pairing_exchange(&mut self.connection, &mut self.pairing_queue, m3).await?;

        match setup.handle_m4(&m4)? {
            AfterPairSetupM4::Done => Err(Error::protocol("transient Pair-Setup has no long-term identity to store")),
            AfterPairSetupM4::SendM5(setup, m5) => {
                let m6 = Self::pairing_exchange(&mut self.connection, &mut self.pairing_queue, m5).await?;
                let pairing_data = setup.handle_m6(&m6)?;
                self.pairing_data = Some(pairing_data);
                Ok(())
            }
        }
    }

    /// Runs Pair-Verify (or, if a resume session id is available,
    /// Pair-Resume first) and upgrades the connection to encrypted
    /// framing. Required before any authenticated operation; run
    /// through the pairing queue so an outer queued operation that
    /// triggers verify cannot deadlock against itself.
    ///
    /// `PairVerify` borrows the stored `PairingData` for the whole
    /// exchange, so the wire round trips below go through the
    /// associated `pairing_exchange` helper (borrowing only
    /// `connection`/`pairing_queue`) rather than `&mut self` methods,
    /// which would conflict with that borrow.
    pub async fn pair_verify(&mut self) -> Result<()> {
        if self.pairing_data.is_none() {
            return Err(Error::usage("pair_verify requires prior pairing data"));
        }

        if let Some(prior) = self.resume_state.clone() {
            let (resume, m1) = PairResume::start(prior);
            let m2 = Self::pairing_exchange(&mut self.connection, &mut self.pairing_queue, m1).await?;
            match resume.handle_m2(&m2)? {
                AfterPairResumeM2::Resumed(keys) => {
                    self.connection.upgrade(keys)?;
                    return Ok(());
                }
                AfterPairResumeM2::FallBackToVerify => {
                    tracing::debug!("pair-resume failed, falling back to full pair-verify");
                }
            }
        }

        let pairing_data = self.pairing_data.as_ref().expect("checked above");
        let (verify, m1) = PairVerify::start(pairing_data);
        let m2 = Self::pairing_exchange(&mut self.connection, &mut self.pairing_queue, m1).await?;
        let (verify, m3) = verify.handle_m2(&m2)?;
        let resume_session_id = verify.resume_session_id();
        let m4 = Self::pairing_exchange(&mut self.connection, &mut self.pairing_queue, m3).await?;
        let keys = verify.handle_m4(&m4)?;

        if let Some(session_id) = resume_session_id {
            self.resume_state = Some(ResumeState { shared_secret: keys.accessory_to_controller_key, session_id });
        }
        self.connection.upgrade(keys)
    }

    /// Add a new controller's long-term identity. Requires an
    /// already-paired identity; runs its own Pair-Verify first.
    pub async fn add_pairing(&mut self, identifier: &[u8], public_key: &[u8; 32], is_admin: bool) -> Result<()> {
        self.pair_verify().await?;
        let permission = if is_admin { Permission::Admin } else { Permission::User };
        let body = pairings::add_pairing_request(identifier, public_key, permission);
        let response = self.tlv_request("/pairings", body).await?;
        pairings::parse_add_pairing_response(&response)
    }

    /// Removes a controller's long-term identity; runs its own
    /// Pair-Verify first.
    pub async fn remove_pairing(&mut self, identifier: &[u8]) -> Result<()> {
        self.pair_verify().await?;
        let body = pairings::remove_pairing_request(identifier);
        let response = self.tlv_request("/pairings", body).await?;
        pairings::parse_remove_pairing_response(&response)
    }

    /// Lists every controller paired with the accessory; runs its own
    /// Pair-Verify first.
    pub async fn list_pairings(&mut self) -> Result<Vec<pairings::PairingEntry>> {
        self.pair_verify().await?;
        let body = pairings::list_pairings_request();
        let response = self.tlv_request("/pairings", body).await?;
        pairings::parse_list_pairings_response(&response)
    }

    /// GET `/accessories`.
    pub async fn get_accessories(&mut self) -> Result<AccessoryDatabase> {
        let request = Request::get("/accessories");
        let response = self.primary_queue.enqueue(|| self.connection.request(&request)).await?;
        if !response.is_success() {
            return Err(Error::accessory_with_body(response.status as i32, "getAccessories failed", response.body));
        }
        serde_json::from_slice(&response.body).map_err(|e| Error::protocol(format!("malformed accessories database: {e}")))
    }

    /// GET `/characteristics?id=1.10,1.11`.
    pub async fn get_characteristics(&mut self, ids: &[CharacteristicAddress]) -> Result<serde_json::Value> {
        let id_param = ids.iter().map(CharacteristicAddress::to_string).collect::<Vec<_>>().join(",");
        let path = format!("/characteristics?id={id_param}");
        let request = Request::get(path);
        let response = self.primary_queue.enqueue(|| self.connection.request(&request)).await?;
        self.parse_json_response(response)
    }

    /// PUT `/characteristics` with a caller-built JSON body (bare
    /// values or `{value, authData?, remote?, r?}` entries, and/or
    /// `ev:true/false` subscribe toggles).
    ///
    /// On HTTP 207 the per-characteristic status array is returned
    /// untouched rather than translated into an error: a partial
    /// success on a mixed subscribe-and-write request is a valid,
    /// inspectable outcome, not a failure.
    pub async fn set_characteristics(&mut self, body: serde_json::Value) -> Result<Option<serde_json::Value>> {
        let bytes = serde_json::to_vec(&body).map_err(|e| Error::usage(format!("invalid characteristics body: {e}")))?;
        let request = Request::put("/characteristics", CONTENT_TYPE_JSON, bytes);
        let response = self.primary_queue.enqueue(|| self.connection.request(&request)).await?;

        match response.status {
            204 => Ok(None),
            207 => Ok(Some(self.parse_json_response(response)?)),
            status if (200..300).contains(&status) => Ok(Some(self.parse_json_response(response)?)),
            status => Err(Error::accessory_with_body(status as i32, "set characteristics failed", response.body)),
        }
    }

    /// POST `/resource`, returning raw image bytes.
    pub async fn get_image(&mut self, width: u32, height: u32, aid: Option<u64>) -> Result<Vec<u8>> {
        let mut body = serde_json::json!({ "resource-type": "image", "image-width": width, "image-height": height });
        if let Some(aid) = aid {
            body["aid"] = serde_json::json!(aid);
        }
        let bytes = serde_json::to_vec(&body).map_err(|e| Error::usage(format!("invalid getImage request: {e}")))?;
        let request = Request::post("/resource", CONTENT_TYPE_JSON, bytes);
        let response = self.primary_queue.enqueue(|| self.connection.request(&request)).await?;
        if response.is_success() {
            Ok(response.body)
        } else {
            Err(Error::accessory_with_body(response.status as i32, "getImage failed", response.body))
        }
    }

    /// PUT `/characteristics` with `ev:true` for each newly-subscribed
    /// id; already-subscribed ids are skipped.
    pub async fn subscribe_characteristics(&mut self, ids: &[CharacteristicAddress]) -> Result<()> {
        let fresh: Vec<_> = ids.iter().filter(|id| !self.subscribed.contains(id)).collect();
        if fresh.is_empty() {
            return Ok(());
        }
        let body = serde_json::json!({
            "characteristics": fresh.iter().map(|id| serde_json::json!({"aid": id.aid, "iid": id.iid, "ev": true})).collect::<Vec<_>>()
        });
        self.set_characteristics(body).await?;
        self.subscribed.extend(fresh.into_iter().copied());
        Ok(())
    }

    /// PUT `/characteristics` with `ev:false`; `ids = None` unsubscribes
    /// everything currently subscribed.
    pub async fn unsubscribe_characteristics(&mut self, ids: Option<&[CharacteristicAddress]>) -> Result<()> {
        let targets: Vec<CharacteristicAddress> = match ids {
            Some(ids) => ids.to_vec(),
            None => self.subscribed.iter().copied().collect(),
        };
        if targets.is_empty() {
            return Ok(());
        }
        let body = serde_json::json!({
            "characteristics": targets.iter().map(|id| serde_json::json!({"aid": id.aid, "iid": id.iid, "ev": false})).collect::<Vec<_>>()
        });
        self.set_characteristics(body).await?;
        for id in &targets {
            self.subscribed.remove(id);
        }
        Ok(())
    }

    pub fn subscribed_characteristics(&self) -> impl Iterator<Item = &CharacteristicAddress> {
        self.subscribed.iter()
    }

    /// Reads the next `EVENT/1.0 200 OK` frame on this connection,
    /// once a subscription has switched it into the event stream.
    /// Failure to parse a single event is logged and dropped rather
    /// than surfaced, matching the distinguished silent-drop behavior
    /// for unsolicited event frames.
    pub async fn next_event(&mut self) -> Result<Option<serde_json::Value>> {
        let response = match event::read_event(&mut self.connection).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed event frame");
                return Ok(None);
            }
        };
        match event::parse_event_body(&response.body) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!(error = %e, "dropping event with unparseable body");
                Ok(None)
            }
        }
    }

    async fn pairing_exchange(connection: &mut IpConnection<S>, queue: &mut OperationQueue, request_tlv: Vec<u8>) -> Result<Vec<u8>> {
        let path = if request_tlv_is_pair_verify(&request_tlv) { "/pair-verify" } else { "/pair-setup" };
        let request = Request::post(path, CONTENT_TYPE_TLV8, request_tlv);
        let response = queue.enqueue(|| connection.request(&request)).await?;
        if !response.is_success() {
            return Err(Error::accessory_with_body(response.status as i32, "pairing exchange failed", response.body));
        }
        Ok(response.body)
    }

    async fn tlv_request(&mut self, path: &str, body: Vec<u8>) -> Result<Vec<u8>> {
        let request = Request::post(path, CONTENT_TYPE_TLV8, body);
        let response = self.pairing_queue.enqueue(|| self.connection.request(&request)).await?;
        if !response.is_success() {
            return Err(Error::accessory_with_body(response.status as i32, "pairings request failed", response.body));
        }
        Ok(response.body)
    }

    fn parse_json_response(&self, response: crate::http::Response) -> Result<serde_json::Value> {
        if !response.is_success() {
            return Err(Error::accessory_with_body(response.status as i32, "request failed", response.body));
        }
        serde_json::from_slice(&response.body).map_err(|e| Error::protocol(format!("malformed JSON body: {e}")))
    }
}

/// `/pair-setup` and `/pair-verify` share the same M1-shaped wire
/// format (`State`, optionally `Method`). Pair-Verify's M1 omits
/// `Method` entirely; Pair-Setup's M1 always carries `Method` set to
/// `PairSetup` or `PairSetupWithAuth`. Pair-Resume also posts to
/// `/pair-verify` per HAP's own routing, but (unlike Pair-Verify) its
/// M1 does carry a `Method` tag, set to `PairResume` — so that value
/// has to be special-cased rather than treated as "any Method tag
/// means Pair-Setup".
fn request_tlv_is_pair_verify(tlv_bytes: &[u8]) -> bool {
    let tlv = hap_tlv::decode(tlv_bytes).unwrap_or_default();
    match tlv.get_value(hap_pairing::tag::METHOD) {
        None => true,
        Some(bytes) => bytes.first().copied() == Some(Method::PairResume as u8),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_verify_m1_has_no_method_tag() {
        let pairing = sample_pairing_data();
        let (_verify, m1) = PairVerify::start(&pairing);
        assert!(request_tlv_is_pair_verify(&m1));
    }

    #[test]
    fn pair_setup_m1_carries_a_method_tag() {
        let (_setup, m1) = PairSetup::start(Method::PairSetup, None);
        assert!(!request_tlv_is_pair_verify(&m1));
    }

    #[test]
    fn pair_resume_m1_is_routed_to_pair_verify() {
        let prior = ResumeState { shared_secret: [5u8; 32], session_id: [9u8; 8] };
        let (_resume, m1) = PairResume::start(prior);
        assert!(request_tlv_is_pair_verify(&m1));
    }

    fn sample_pairing_data() -> PairingData {
        use ed25519_dalek::SigningKey;
        use rand::rngs::OsRng;
        use rand::RngCore;

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
}
