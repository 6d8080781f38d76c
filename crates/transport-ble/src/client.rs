//! The HAP BLE client: the same `identify`/pairing/`getAccessories`/
//! `get`/`set`/subscribe surface as the IP client, carried over GATT
//! instead of HTTP.

use crate::gatt::{DiscoveredService, GattLink, Handle};
use crate::instance_id;
use crate::pdu::{self, Opcode};
use crate::signature;
use hap_core::types::{Accessory, AccessoryDatabase, Characteristic, CharacteristicAddress, Service, Value};
use hap_core::{Error, Result};
use hap_pairing::{pairings, AfterPairResumeM2, AfterPairSetupM4, Method, PairResume, PairSetup, PairVerify, Permission};
use hap_pairing::{PairingData, ResumeState};
use hap_queue::OperationQueue;
use hap_tlv::Tlv8;
use std::collections::{HashMap, HashSet};

use crate::framing::BlePduTransport;

/// `HAP-Param-Value`, the TLV tag carrying a characteristic's raw
/// value in both write requests and read responses.
const VALUE_TAG: u8 = 0x01;

/// A single GATT accessory has no bridge, so every characteristic this
/// client discovers is reported under this `aid`.
const SINGLE_ACCESSORY_AID: u64 = 1;

/// What extra metadata a `getCharacteristics` call should fetch
/// alongside each value, mirroring the `meta`/`perms`/`type`/`ev`
/// query flags of the IP `/characteristics` GET.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharacteristicReadOptions {
    pub meta: bool,
}

#[derive(Debug, Clone, Copy)]
struct ResolvedCharacteristic {
    handle: Handle,
    instance_id: u16,
}

#[derive(Default)]
struct DiscoveryCache {
    services: Vec<DiscoveredService>,
    identify: Option<ResolvedCharacteristic>,
    pair_setup: Option<ResolvedCharacteristic>,
    pair_verify: Option<ResolvedCharacteristic>,
    pairing_pairings: Option<ResolvedCharacteristic>,
    pairing_features: Option<ResolvedCharacteristic>,
}

pub struct BleClient<L> {
    transport: BlePduTransport<L>,
    pairing_data: Option<PairingData>,
    resume_state: Option<ResumeState>,
    subscribed: HashSet<CharacteristicAddress>,
    primary_queue: OperationQueue,
    pairing_queue: OperationQueue,
    tid: u8,
    discovery: Option<DiscoveryCache>,
    characteristics: HashMap<CharacteristicAddress, ResolvedCharacteristicEntry>,
}

#[derive(Clone, Copy)]
struct ResolvedCharacteristicEntry {
    resolved: ResolvedCharacteristic,
    /// The HAP value format string decoded from this characteristic's
    /// last signature read, used to encode/decode its raw TLV value.
    format: Option<&'static str>,
}

impl<L> BleClient<L>
where
    L: GattLink,
{
    pub fn new(link: L, pairing_data: Option<PairingData>) -> Self {
        Self {
            transport: BlePduTransport::new(link),
            pairing_data,
            resume_state: None,
            subscribed: HashSet::new(),
            primary_queue: OperationQueue::new(),
            pairing_queue: OperationQueue::new(),
            tid: 0,
            discovery: None,
            characteristics: HashMap::new(),
        }
    }

    pub fn get_long_term_data(&self) -> Option<&PairingData> {
        self.pairing_data.as_ref()
    }

    /// Applies `config`'s operation-timeout watchdog to every GATT
    /// fragment this client sends or reads from here on.
    pub fn apply_config(&mut self, config: &hap_config::ClientConfig) {
        self.transport.set_operation_timeout(config.operation_timeout());
    }

    /// Writes `1` to the Identify characteristic. Succeeds only on an
    /// unpaired accessory.
    pub async fn identify(&mut self) -> Result<()> {
        self.ensure_discovery().await?;
        let resolved = require(self.discovery.as_ref().unwrap().identify, "Identify characteristic")?;
        let body = hap_tlv::encode(&Tlv8::new().push(VALUE_TAG, vec![1u8]));
        let response = self.pdu_exchange(resolved, Opcode::Write, Some(body)).await?;
        if response.status != 0 {
            return Err(Error::accessory_with_body(response.status as i32, "identify failed", response.body));
        }
        Ok(())
    }

    /// Reads the Pairing Features characteristic (BLE-only; IP
    /// accessories advertise the same bit through `/accessories`'
    /// Protocol Information service instead).
    pub async fn get_pairing_method(&mut self) -> Result<u8> {
        self.ensure_discovery().await?;
        let resolved = require(self.discovery.as_ref().unwrap().pairing_features, "Pairing Features characteristic")?;
        let response = self.pdu_exchange(resolved, Opcode::Read, None).await?;
        if response.status != 0 {
            return Err(Error::accessory_with_body(response.status as i32, "pairing features read failed", response.body));
        }
        let tlv = hap_tlv::decode(&response.body)?;
        Ok(tlv.get_value(VALUE_TAG).and_then(|b| b.first().copied()).unwrap_or(0))
    }

    /// Drives the whole Pair-Setup exchange (M1-M6) over the Pair
    /// Setup characteristic and stores the resulting identity.
    pub async fn pair_setup(&mut self, pin: &str, method: Method, flags: Option<u32>) -> Result<()> {
        self.ensure_discovery().await?;
        let resolved = require(self.discovery.as_ref().unwrap().pair_setup, "Pair Setup characteristic")?;

        let (setup, m1) = PairSetup::start(method, flags);
        let tid = self.take_tid();
        let m2 = Self::pairing_exchange(&mut self.transport, &self.pairing_queue, resolved, tid, m1).await?;

        let (setup, m3) = setup.handle_m2(&m2, pin)?;
        let tid = self.take_tid();
        let m4 = Self::pairing_exchange(&mut self.transport, &self.pairing_queue, resolved, tid, m3).await?;

        match setup.handle_m4(&m4)? {
            AfterPairSetupM4::Done => Err(Error::protocol("transient Pair-Setup has no long-term identity to store")),
            AfterPairSetupM4::SendM5(setup, m5) => {
                let tid = self.take_tid();
                let m6 = Self::pairing_exchange(&mut self.transport, &self.pairing_queue, resolved, tid, m5).await?;
                let pairing_data = setup.handle_m6(&m6)?;
                self.pairing_data = Some(pairing_data);
                Ok(())
            }
        }
    }

    /// Runs Pair-Verify (or Pair-Resume first, if a resume session id
    /// is available) and upgrades the fragment transport to encrypted
    /// framing.
    ///
    /// `PairVerify` borrows the stored `PairingData` for the whole
    /// exchange, so (exactly as in the IP client) the wire round trips
    /// below go through the associated `pairing_exchange` helper
    /// rather than `&mut self` methods, and `self.tid` is advanced by
    /// direct field assignment rather than a method call, so neither
    /// conflicts with that borrow.
    pub async fn pair_verify(&mut self) -> Result<()> {
        if self.pairing_data.is_none() {
            return Err(Error::usage("pair_verify requires prior pairing data"));
        }
        self.ensure_discovery().await?;
        let resolved = require(self.discovery.as_ref().unwrap().pair_verify, "Pair Verify characteristic")?;

        if let Some(prior) = self.resume_state.clone() {
            let (resume, m1) = PairResume::start(prior);
            let tid = self.tid;
            self.tid = tid.wrapping_add(1);
            let m2 = Self::pairing_exchange(&mut self.transport, &self.pairing_queue, resolved, tid, m1).await?;
            match resume.handle_m2(&m2)? {
                AfterPairResumeM2::Resumed(keys) => {
                    self.transport.upgrade(keys.accessory_to_controller_key, keys.controller_to_accessory_key)?;
                    return Ok(());
                }
                AfterPairResumeM2::FallBackToVerify => {
                    tracing::debug!("pair-resume failed, falling back to full pair-verify");
                }
            }
        }

        let pairing_data = self.pairing_data.as_ref().expect("checked above");
        let (verify, m1) = PairVerify::start(pairing_data);
        let tid = self.tid;
        self.tid = tid.wrapping_add(1);
        let m2 = Self::pairing_exchange(&mut self.transport, &self.pairing_queue, resolved, tid, m1).await?;

        let (verify, m3) = verify.handle_m2(&m2)?;
        let resume_session_id = verify.resume_session_id();
        let tid = self.tid;
        self.tid = tid.wrapping_add(1);
        let m4 = Self::pairing_exchange(&mut self.transport, &self.pairing_queue, resolved, tid, m3).await?;
        let keys = verify.handle_m4(&m4)?;

        if let Some(session_id) = resume_session_id {
            self.resume_state = Some(ResumeState { shared_secret: keys.accessory_to_controller_key, session_id });
        }
        self.transport.upgrade(keys.accessory_to_controller_key, keys.controller_to_accessory_key)
    }

    /// Add a new controller's long-term identity; runs its own
    /// Pair-Verify first.
    pub async fn add_pairing(&mut self, identifier: &[u8], public_key: &[u8; 32], is_admin: bool) -> Result<()> {
        self.pair_verify().await?;
        let permission = if is_admin { Permission::Admin } else { Permission::User };
        let body = pairings::add_pairing_request(identifier, public_key, permission);
        let response = self.pairings_request(body).await?;
        pairings::parse_add_pairing_response(&response)
    }

    /// Removes a controller's long-term identity; runs its own
    /// Pair-Verify first.
    pub async fn remove_pairing(&mut self, identifier: &[u8]) -> Result<()> {
        self.pair_verify().await?;
        let body = pairings::remove_pairing_request(identifier);
        let response = self.pairings_request(body).await?;
        pairings::parse_remove_pairing_response(&response)
    }

    /// Lists every controller paired with the accessory; runs its own
    /// Pair-Verify first.
    pub async fn list_pairings(&mut self) -> Result<Vec<pairings::PairingEntry>> {
        self.pair_verify().await?;
        let body = pairings::list_pairings_request();
        let response = self.pairings_request(body).await?;
        pairings::parse_list_pairings_response(&response)
    }

    /// Discovers every service, reads each service's instance id and
    /// signature, and every non-pairing non-protocol characteristic's
    /// signature and value.
    pub async fn get_accessories(&mut self) -> Result<AccessoryDatabase> {
        self.ensure_discovery().await?;
        let services = self.discovery.as_ref().unwrap().services.clone();
        self.characteristics.clear();

        let pairing_service = hap_uuid::ensure_long_uuid("55");
        let protocol_information_service = hap_uuid::ensure_long_uuid("A2");

        let mut built_services = Vec::with_capacity(services.len());
        for service in &services {
            let long_uuid = hap_uuid::ensure_long_uuid(&service.uuid);
            if long_uuid == pairing_service || long_uuid == protocol_information_service {
                continue;
            }

            if let Err(e) = self.read_service_signature(service).await {
                tracing::debug!(error = %e, service = %service.uuid, "service signature read failed");
            }

            let mut characteristics = Vec::with_capacity(service.characteristics.len());
            for characteristic in &service.characteristics {
                match self.describe_characteristic(characteristic).await {
                    Ok(Some(described)) => characteristics.push(described),
                    Ok(None) => {}
                    Err(e) => tracing::debug!(error = %e, characteristic = %characteristic.uuid, "characteristic read failed"),
                }
            }

            built_services.push(Service {
                iid: service.instance_id as u64,
                type_: hap_uuid::uuid_to_symbolic(&service.uuid),
                characteristics,
            });
        }

        Ok(AccessoryDatabase { accessories: vec![Accessory { aid: SINGLE_ACCESSORY_AID, services: built_services }] })
    }

    /// Per-characteristic signature read (if `options.meta`), then a
    /// value read, assembled into the same per-characteristic JSON
    /// shape the IP `/characteristics` GET returns.
    pub async fn get_characteristics(&mut self, ids: &[CharacteristicAddress], options: CharacteristicReadOptions) -> Result<serde_json::Value> {
        let mut entries = Vec::with_capacity(ids.len());
        for &id in ids {
            let entry = *self
                .characteristics
                .get(&id)
                .ok_or_else(|| Error::usage(format!("unknown characteristic {id}; call get_accessories first")))?;

            let mut json = serde_json::json!({ "aid": id.aid, "iid": id.iid });
            if options.meta {
                let signature_response = self.pdu_exchange(entry.resolved, Opcode::SignatureRead, None).await?;
                if signature_response.status == 0 {
                    let sig = signature::parse(&signature_response.body)?;
                    if let Some(format) = &sig.format {
                        json["format"] = serde_json::json!(format);
                    }
                    if let Some(unit) = &sig.unit {
                        json["unit"] = serde_json::json!(unit);
                    }
                    if let Some(description) = &sig.description {
                        json["description"] = serde_json::json!(description);
                    }
                }
            }

            let value_response = self.pdu_exchange(entry.resolved, Opcode::Read, None).await?;
            if value_response.status != 0 {
                json["status"] = serde_json::json!(value_response.status as i32);
            } else if let Some(bytes) = hap_tlv::decode(&value_response.body)?.get_value(VALUE_TAG) {
                json["value"] = value_to_json(&decode_value(entry.format, bytes));
            }
            entries.push(json);
        }
        Ok(serde_json::json!({ "characteristics": entries }))
    }

    /// Per-entry write PDU for `value` entries, GATT subscribe toggle
    /// for `ev` entries.
    pub async fn set_characteristics(&mut self, body: serde_json::Value) -> Result<Option<serde_json::Value>> {
        let array = body
            .get("characteristics")
            .and_then(|v| v.as_array())
            .ok_or_else(|| Error::usage("expected a {\"characteristics\": [...]} body"))?;

        let mut statuses = Vec::with_capacity(array.len());
        let mut all_ok = true;
        for item in array {
            let aid = item.get("aid").and_then(|v| v.as_u64()).ok_or_else(|| Error::usage("characteristic entry missing aid"))?;
            let iid = item.get("iid").and_then(|v| v.as_u64()).ok_or_else(|| Error::usage("characteristic entry missing iid"))?;
            let address = CharacteristicAddress::new(aid, iid);
            let entry = *self
                .characteristics
                .get(&address)
                .ok_or_else(|| Error::usage(format!("unknown characteristic {address}; call get_accessories first")))?;

            let outcome = if let Some(ev) = item.get("ev").and_then(|v| v.as_bool()) {
                self.set_subscription(address, entry.resolved, ev).await
            } else if let Some(value) = item.get("value") {
                self.write_value(entry, value).await
            } else {
                Err(Error::usage("characteristic entry carries neither value nor ev"))
            };

            let status = match &outcome {
                Ok(()) => 0,
                Err(_) => HAP_STATUS_COMMUNICATION_FAILURE,
            };
            all_ok &= status == 0;
            statuses.push(serde_json::json!({ "aid": aid, "iid": iid, "status": status }));
        }

        if all_ok {
            Ok(None)
        } else {
            Ok(Some(serde_json::json!({ "characteristics": statuses })))
        }
    }

    /// GATT-subscribes every not-yet-subscribed id and keeps the
    /// underlying connection open for indications.
    pub async fn subscribe_characteristics(&mut self, ids: &[CharacteristicAddress]) -> Result<()> {
        let fresh: Vec<CharacteristicAddress> = ids.iter().copied().filter(|id| !self.subscribed.contains(id)).collect();
        for id in &fresh {
            let entry = *self
                .characteristics
                .get(id)
                .ok_or_else(|| Error::usage(format!("unknown characteristic {id}; call get_accessories first")))?;
            self.transport.link().subscribe(entry.resolved.handle).await?;
        }
        self.subscribed.extend(fresh);
        Ok(())
    }

    /// `ids = None` unsubscribes everything currently subscribed.
    pub async fn unsubscribe_characteristics(&mut self, ids: Option<&[CharacteristicAddress]>) -> Result<()> {
        let targets: Vec<CharacteristicAddress> = match ids {
            Some(ids) => ids.to_vec(),
            None => self.subscribed.iter().copied().collect(),
        };
        for id in &targets {
            if let Some(entry) = self.characteristics.get(id).copied() {
                self.transport.link().unsubscribe(entry.resolved.handle).await?;
            }
            self.subscribed.remove(id);
        }
        Ok(())
    }

    pub fn subscribed_characteristics(&self) -> impl Iterator<Item = &CharacteristicAddress> {
        self.subscribed.iter()
    }

    /// Blocks for the next indication and performs the authenticated
    /// read it signals. A read failure after an empty indication is
    /// logged and dropped rather than surfaced.
    pub async fn next_event(&mut self) -> Result<Option<(CharacteristicAddress, Value)>> {
        let handle = match self.transport.link().next_indication().await? {
            Some(handle) => handle,
            None => return Ok(None),
        };
        let Some((&address, &entry)) = self.characteristics.iter().find(|(_, entry)| entry.resolved.handle == handle) else {
            tracing::warn!(handle, "indication for a characteristic this client never discovered");
            return Ok(None);
        };

        match self.pdu_exchange(entry.resolved, Opcode::Read, None).await {
            Ok(response) if response.status == 0 => match hap_tlv::decode(&response.body) {
                Ok(tlv) => Ok(tlv.get_value(VALUE_TAG).map(|bytes| (address, decode_value(entry.format, bytes)))),
                Err(e) => {
                    tracing::warn!(error = %e, %address, "dropping unparseable value after indication");
                    Ok(None)
                }
            },
            Ok(response) => {
                tracing::warn!(status = response.status, %address, "read after indication returned a non-zero status");
                Ok(None)
            }
            Err(e) => {
                tracing::warn!(error = %e, %address, "read after indication failed");
                Ok(None)
            }
        }
    }

    fn take_tid(&mut self) -> u8 {
        let tid = self.tid;
        self.tid = tid.wrapping_add(1);
        tid
    }

    async fn pdu_exchange(&mut self, resolved: ResolvedCharacteristic, opcode: Opcode, body: Option<Vec<u8>>) -> Result<pdu::Response> {
        let tid = self.take_tid();
        let request = pdu::Request::new(opcode, tid, resolved.instance_id, body).to_bytes();
        let handle = resolved.handle;
        let response_bytes = self
            .primary_queue
            .enqueue(|| async { self.transport.send_pdu(handle, &request, tid).await?; self.transport.read_pdu(handle).await })
            .await?;
        pdu::parse_response(&response_bytes)
    }

    async fn pairings_request(&mut self, body: Vec<u8>) -> Result<Vec<u8>> {
        let resolved = require(self.discovery.as_ref().unwrap().pairing_pairings, "Pairing Pairings characteristic")?;
        let response = self.pdu_exchange(resolved, Opcode::Write, Some(body)).await?;
        if response.status != 0 {
            return Err(Error::accessory_with_body(response.status as i32, "pairings request failed", response.body));
        }
        Ok(response.body)
    }

    async fn write_value(&mut self, entry: ResolvedCharacteristicEntry, value: &serde_json::Value) -> Result<()> {
        let bytes = encode_json_value(entry.format, value);
        let body = hap_tlv::encode(&Tlv8::new().push(VALUE_TAG, bytes));
        let response = self.pdu_exchange(entry.resolved, Opcode::Write, Some(body)).await?;
        if response.status != 0 {
            return Err(Error::accessory_with_body(response.status as i32, "characteristic write failed", response.body));
        }
        Ok(())
    }

    async fn set_subscription(&mut self, address: CharacteristicAddress, resolved: ResolvedCharacteristic, enabled: bool) -> Result<()> {
        if enabled {
            self.transport.link().subscribe(resolved.handle).await?;
            self.subscribed.insert(address);
        } else {
            self.transport.link().unsubscribe(resolved.handle).await?;
            self.subscribed.remove(&address);
        }
        Ok(())
    }

    async fn read_service_signature(&mut self, service: &DiscoveredService) -> Result<()> {
        let resolved = ResolvedCharacteristic { handle: service.signature_handle, instance_id: service.instance_id };
        let response = self.pdu_exchange(resolved, Opcode::ServiceSignatureRead, None).await?;
        if response.status != 0 {
            return Err(Error::accessory(response.status as i32, "service signature read failed"));
        }
        Ok(())
    }

    async fn describe_characteristic(&mut self, characteristic: &crate::gatt::DiscoveredCharacteristic) -> Result<Option<Characteristic>> {
        let descriptor = match self.transport.link().read_descriptor(characteristic.handle, instance_id::DESCRIPTOR_UUID_LONG).await {
            Ok(bytes) => bytes,
            Err(_) => return Ok(None),
        };
        let instance_id = instance_id::decode(&descriptor)?;
        let address = CharacteristicAddress::new(SINGLE_ACCESSORY_AID, instance_id as u64);
        let resolved = ResolvedCharacteristic { handle: characteristic.handle, instance_id };

        let signature_response = self.pdu_exchange(resolved, Opcode::SignatureRead, None).await?;
        let sig = if signature_response.status == 0 {
            signature::parse(&signature_response.body)?
        } else {
            signature::Signature::default()
        };
        let format = sig.format.as_deref().and_then(format_str_to_static);

        let value_response = self.pdu_exchange(resolved, Opcode::Read, None).await?;
        let value = if value_response.status == 0 {
            hap_tlv::decode(&value_response.body)?.get_value(VALUE_TAG).map(|bytes| decode_value(format, bytes))
        } else {
            None
        };

        self.characteristics.insert(address, ResolvedCharacteristicEntry { resolved, format });

        Ok(Some(Characteristic {
            iid: instance_id as u64,
            type_: hap_uuid::uuid_to_symbolic(&characteristic.uuid),
            format: sig.format.clone().unwrap_or_else(|| "data".to_string()),
            perms: permissions_from_properties(sig.properties),
            value,
            unit: sig.unit,
            min_value: sig.valid_range.as_ref().map(|(min, _)| bytes_to_f64(min)),
            max_value: sig.valid_range.as_ref().map(|(_, max)| bytes_to_f64(max)),
            min_step: sig.step.as_deref().map(bytes_to_f64),
            description: sig.description,
            valid_values: sig.valid_values.map(|bytes| bytes.into_iter().map(u32::from).collect()),
            valid_values_range: sig.valid_values_range.and_then(|pairs| pairs.first().map(|&(lo, hi)| (lo as u32, hi as u32))),
            ev: self.subscribed.contains(&address),
        }))
    }

    async fn ensure_discovery(&mut self) -> Result<()> {
        if self.discovery.is_some() {
            return Ok(());
        }
        let services = self.transport.link().discover_services().await?;

        let identify = Self::resolve(&services, "3E", "14", self.transport.link()).await?;
        let pair_setup = Self::resolve(&services, "55", "4C", self.transport.link()).await?;
        let pair_verify = Self::resolve(&services, "55", "4E", self.transport.link()).await?;
        let pairing_features = Self::resolve(&services, "55", "4F", self.transport.link()).await?;
        let pairing_pairings = Self::resolve(&services, "55", "50", self.transport.link()).await?;

        self.discovery = Some(DiscoveryCache { services, identify, pair_setup, pair_verify, pairing_pairings, pairing_features });
        Ok(())
    }

    async fn resolve(
        services: &[DiscoveredService],
        service_short_uuid: &str,
        characteristic_short_uuid: &str,
        link: &mut L,
    ) -> Result<Option<ResolvedCharacteristic>> {
        let service_uuid = hap_uuid::ensure_long_uuid(service_short_uuid);
        let char_uuid = hap_uuid::ensure_long_uuid(characteristic_short_uuid);

        let Some(service) = services.iter().find(|s| hap_uuid::ensure_long_uuid(&s.uuid) == service_uuid) else {
            return Ok(None);
        };
        let Some(characteristic) = service.characteristics.iter().find(|c| hap_uuid::ensure_long_uuid(&c.uuid) == char_uuid) else {
            return Ok(None);
        };

        let descriptor = match link.read_descriptor(characteristic.handle, instance_id::DESCRIPTOR_UUID_LONG).await {
            Ok(bytes) => bytes,
            Err(_) => return Ok(None),
        };
        Ok(Some(ResolvedCharacteristic { handle: characteristic.handle, instance_id: instance_id::decode(&descriptor)? }))
    }

    /// Runs one leg of a pairing exchange (Pair-Setup/Pair-Verify/
    /// Pair-Resume M-message): write the request PDU, read the
    /// response PDU, and unwrap it into its TLV body. An associated
    /// function so it only borrows `transport`/`queue`, never all of
    /// `self` — see [`Self::pair_verify`].
    async fn pairing_exchange(
        transport: &mut BlePduTransport<L>,
        queue: &OperationQueue,
        resolved: ResolvedCharacteristic,
        tid: u8,
        request_tlv: Vec<u8>,
    ) -> Result<Vec<u8>> {
        let request = pdu::Request::new(Opcode::Write, tid, resolved.instance_id, Some(request_tlv)).to_bytes();
        let handle = resolved.handle;
        let response_bytes = queue
            .enqueue(|| async {
                transport.send_pdu(handle, &request, tid).await?;
                transport.read_pdu(handle).await
            })
            .await?;
        let response = pdu::parse_response(&response_bytes)?;
        if response.status != 0 {
            return Err(Error::accessory_with_body(response.status as i32, "BLE pairing exchange failed", response.body));
        }
        Ok(response.body)
    }
}

/// A non-zero HAP accessory status used for characteristic writes
/// that fail locally (unreachable characteristic, encode error) rather
/// than with an accessory-reported status byte.
const HAP_STATUS_COMMUNICATION_FAILURE: i64 = -70402;

fn require(found: Option<ResolvedCharacteristic>, what: &str) -> Result<ResolvedCharacteristic> {
    found.ok_or_else(|| Error::protocol(format!("{what} not found on this accessory")))
}

/// Decodes a characteristic's raw TLV value bytes using the format
/// string from its last signature read, delegating to the same
/// format/byte-buffer codec the IP client's JSON body relies on.
/// Malformed bytes fall back to `Data` rather than failing the whole
/// read, matching the tolerant style already used for missing
/// instance-id descriptors.
fn decode_value(format: Option<&str>, bytes: &[u8]) -> Value {
    hap_tlv::value::decode(format.unwrap_or("data"), bytes).unwrap_or_else(|_| Value::Data(bytes.to_vec()))
}

fn encode_json_value(format: Option<&str>, json: &serde_json::Value) -> Vec<u8> {
    let format = format.unwrap_or("data");
    let value = json_to_value(format, json);
    hap_tlv::value::encode(format, &value).unwrap_or_default()
}

fn json_to_value(format: &str, json: &serde_json::Value) -> Value {
    match format {
        "bool" => Value::Bool(json.as_bool().unwrap_or_default()),
        "uint8" => Value::UInt8(json.as_u64().unwrap_or_default() as u8),
        "uint16" => Value::UInt16(json.as_u64().unwrap_or_default() as u16),
        "uint32" => Value::UInt32(json.as_u64().unwrap_or_default() as u32),
        "uint64" => Value::UInt64(json.as_u64().unwrap_or_default()),
        "int" => Value::Int(json.as_i64().unwrap_or_default() as i32),
        "float" => Value::Float(json.as_f64().unwrap_or_default() as f32),
        "string" => Value::String(json.as_str().unwrap_or_default().to_string()),
        _ => Value::Data(json.as_str().map(|s| s.as_bytes().to_vec()).unwrap_or_default()),
    }
}

fn bytes_to_f64(bytes: &[u8]) -> f64 {
    let mut buf = [0u8; 8];
    let n = bytes.len().min(8);
    buf[..n].copy_from_slice(&bytes[..n]);
    u64::from_le_bytes(buf) as f64
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Bool(b) => serde_json::json!(b),
        Value::UInt8(v) => serde_json::json!(v),
        Value::UInt16(v) => serde_json::json!(v),
        Value::UInt32(v) => serde_json::json!(v),
        Value::UInt64(v) => serde_json::json!(v),
        Value::Int(v) => serde_json::json!(v),
        Value::Float(v) => serde_json::json!(v),
        Value::String(v) => serde_json::json!(v),
        Value::Data(v) => serde_json::json!(base64_encode(v)),
    }
}

fn base64_encode(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Interns a signature's decoded format string onto the small set of
/// `'static` strings [`decode_value`]/[`encode_json_value`] match on,
/// so a `ResolvedCharacteristicEntry` doesn't need an owned `String`
/// per characteristic just to remember its format.
fn format_str_to_static(format: &str) -> Option<&'static str> {
    Some(match format {
        "bool" => "bool",
        "uint8" => "uint8",
        "uint16" => "uint16",
        "uint32" => "uint32",
        "uint64" => "uint64",
        "int" => "int",
        "float" => "float",
        "string" => "string",
        "data" => "data",
        _ => return None,
    })
}

fn permissions_from_properties(properties: Option<u16>) -> Vec<String> {
    let bits = properties.unwrap_or(0);
    let mut perms = Vec::new();
    if bits & 0x0001 != 0 {
        perms.push("pr".to_string());
    }
    if bits & 0x0002 != 0 {
        perms.push("pw".to_string());
    }
    if bits & 0x0004 != 0 {
        perms.push("aa".to_string());
    }
    if bits & 0x0008 != 0 {
        perms.push("tw".to_string());
    }
    if bits & 0x0040 != 0 {
        perms.push("hd".to_string());
    }
    if bits & 0x0080 != 0 {
        perms.push("ev".to_string());
    }
    if perms.is_empty() {
        perms.push("pr".to_string());
    }
    perms
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_value_round_trips_common_formats() {
        assert_eq!(decode_value(Some("bool"), &[1]), Value::Bool(true));
        assert_eq!(decode_value(Some("uint16"), &500u16.to_le_bytes()), Value::UInt16(500));
        assert_eq!(decode_value(Some("string"), b"hi"), Value::String("hi".to_string()));
        assert_eq!(decode_value(None, &[1, 2, 3]), Value::Data(vec![1, 2, 3]));
    }

    #[test]
    fn encode_json_value_round_trips_through_decode_value() {
        let json = serde_json::json!(42);
        let bytes = encode_json_value(Some("uint8"), &json);
        assert_eq!(decode_value(Some("uint8"), &bytes), Value::UInt8(42));
    }

    #[test]
    fn permissions_from_properties_decodes_read_write_and_events() {
        let perms = permissions_from_properties(Some(0x0001 | 0x0002 | 0x0080));
        assert!(perms.contains(&"pr".to_string()));
        assert!(perms.contains(&"pw".to_string()));
        assert!(perms.contains(&"ev".to_string()));
    }

    #[test]
    fn no_properties_defaults_to_paired_read() {
        assert_eq!(permissions_from_properties(None), vec!["pr".to_string()]);
    }
}
