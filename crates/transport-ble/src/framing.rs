//! Fragment-level session encryption and PDU transport over a
//! [`GattLink`], applied after Pair-Verify completes.
//!
//! Unlike IP framing, each fragment (header included) is its own AEAD
//! message: no length-prefix AAD, and each direction's counter starts
//! at 0 when the session keys are attached and advances once per
//! fragment sent or received.

use crate::gatt::{GattLink, Handle};
use crate::pdu::{self, Reassembler};
use hap_core::{Error, Result};
use hap_crypto::aead::{nonce, Cipher, SessionKey};
use std::time::Duration;

/// Matches `hap_config::ClientConfig::default().operation_timeout()`;
/// kept as a plain `Duration` here rather than a dependency on
/// `hap-config` itself, since framing has no other use for it.
const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

pub struct BlePduTransport<L> {
    link: L,
    write_key: Option<Cipher>,
    read_key: Option<Cipher>,
    write_counter: u64,
    read_counter: u64,
    operation_timeout: Duration,
}

impl<L> BlePduTransport<L>
where
    L: GattLink,
{
    pub fn new(link: L) -> Self {
        Self {
            link,
            write_key: None,
            read_key: None,
            write_counter: 0,
            read_counter: 0,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }

    /// Overrides the watchdog applied to every fragment write/read in
    /// [`Self::send_pdu`]/[`Self::read_pdu`].
    pub fn set_operation_timeout(&mut self, timeout: Duration) {
        self.operation_timeout = timeout;
    }

    /// Attach session keys after a successful Pair-Verify, resetting
    /// both counters to 0.
    pub fn upgrade(&mut self, accessory_to_controller_key: [u8; 32], controller_to_accessory_key: [u8; 32]) -> Result<()> {
        self.read_key = Some(Cipher::new(SessionKey::from_bytes(&accessory_to_controller_key)?));
        self.write_key = Some(Cipher::new(SessionKey::from_bytes(&controller_to_accessory_key)?));
        self.read_counter = 0;
        self.write_counter = 0;
        Ok(())
    }

    pub fn is_encrypted(&self) -> bool {
        self.write_key.is_some()
    }

    pub fn link(&mut self) -> &mut L {
        &mut self.link
    }

    /// Fragment and write a full PDU to `handle`, encrypting each
    /// fragment independently once a session is attached. Each fragment
    /// write is wrapped in [`Self::operation_timeout`] and preceded by a
    /// peripheral-connection check, so a mid-PDU disconnect or stall
    /// surfaces as an error instead of hanging.
    pub async fn send_pdu(&mut self, handle: Handle, pdu: &[u8], tid: u8) -> Result<()> {
        for fragment in pdu::fragment(pdu, tid) {
            let on_wire = self.encrypt_fragment(&fragment)?;
            self.guarded_write(handle, &on_wire).await?;
        }
        Ok(())
    }

    /// Read and reassemble a full PDU from `handle`, decrypting each
    /// fragment as it arrives, under the same per-fragment watchdog as
    /// [`Self::send_pdu`].
    pub async fn read_pdu(&mut self, handle: Handle) -> Result<Vec<u8>> {
        let mut reassembler = Reassembler::new();

        let first = self.guarded_read(handle).await?;
        let first = self.decrypt_fragment(&first)?;
        if let Some(pdu) = reassembler.push_first(&first)? {
            return Ok(pdu);
        }

        loop {
            let next = self.guarded_read(handle).await?;
            let next = self.decrypt_fragment(&next)?;
            if let Some(pdu) = reassembler.push_continuation(&next)? {
                return Ok(pdu);
            }
        }
    }

    /// Disconnect-checked, timeout-bounded single-fragment write.
    async fn guarded_write(&mut self, handle: Handle, data: &[u8]) -> Result<()> {
        if !self.link.is_connected() {
            return Err(Error::transport("BLE peripheral disconnected"));
        }
        let result = tokio::time::timeout(self.operation_timeout, self.link.write_characteristic(handle, data))
            .await
            .map_err(|_| Error::transport("BLE characteristic write timed out"))?;
        if !self.link.is_connected() {
            return Err(Error::transport("BLE peripheral disconnected"));
        }
        result
    }

    /// Disconnect-checked, timeout-bounded single-fragment read.
    async fn guarded_read(&mut self, handle: Handle) -> Result<Vec<u8>> {
        if !self.link.is_connected() {
            return Err(Error::transport("BLE peripheral disconnected"));
        }
        let result = tokio::time::timeout(self.operation_timeout, self.link.read_characteristic(handle))
            .await
            .map_err(|_| Error::transport("BLE characteristic read timed out"))?;
        if !self.link.is_connected() {
            return Err(Error::transport("BLE peripheral disconnected"));
        }
        result
    }

    fn encrypt_fragment(&mut self, fragment: &[u8]) -> Result<Vec<u8>> {
        match &self.write_key {
            None => Ok(fragment.to_vec()),
            Some(cipher) => {
                let ciphertext = cipher.encrypt(&nonce::counter(self.write_counter), fragment, b"")?;
                self.write_counter += 1;
                Ok(ciphertext)
            }
        }
    }

    fn decrypt_fragment(&mut self, fragment: &[u8]) -> Result<Vec<u8>> {
        match &self.read_key {
            None => Ok(fragment.to_vec()),
            Some(cipher) => {
                let plaintext = cipher.decrypt(&nonce::counter(self.read_counter), fragment, b"")?;
                self.read_counter += 1;
                Ok(plaintext)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gatt::DiscoveredService;
    use std::collections::HashMap;

    struct FakeLink {
        characteristics: HashMap<Handle, Vec<u8>>,
    }

    impl GattLink for FakeLink {
        async fn discover_services(&mut self) -> Result<Vec<DiscoveredService>> {
            Ok(Vec::new())
        }
        async fn write_characteristic(&mut self, handle: Handle, data: &[u8]) -> Result<()> {
            self.characteristics.insert(handle, data.to_vec());
            Ok(())
        }
        async fn read_characteristic(&mut self, handle: Handle) -> Result<Vec<u8>> {
            Ok(self.characteristics.get(&handle).cloned().unwrap_or_default())
        }
        async fn read_descriptor(&mut self, _characteristic: Handle, _descriptor_uuid: &str) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }
        async fn subscribe(&mut self, _handle: Handle) -> Result<()> {
            Ok(())
        }
        async fn unsubscribe(&mut self, _handle: Handle) -> Result<()> {
            Ok(())
        }
        async fn next_indication(&mut self) -> Result<Option<Handle>> {
            Ok(None)
        }
        fn is_connected(&self) -> bool {
            true
        }
    }

    struct DisconnectingLink {
        connected: bool,
    }

    impl GattLink for DisconnectingLink {
        async fn discover_services(&mut self) -> Result<Vec<DiscoveredService>> {
            Ok(Vec::new())
        }
        async fn write_characteristic(&mut self, _handle: Handle, _data: &[u8]) -> Result<()> {
            Ok(())
        }
        async fn read_characteristic(&mut self, _handle: Handle) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }
        async fn read_descriptor(&mut self, _characteristic: Handle, _descriptor_uuid: &str) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }
        async fn subscribe(&mut self, _handle: Handle) -> Result<()> {
            Ok(())
        }
        async fn unsubscribe(&mut self, _handle: Handle) -> Result<()> {
            Ok(())
        }
        async fn next_indication(&mut self) -> Result<Option<Handle>> {
            Ok(None)
        }
        fn is_connected(&self) -> bool {
            self.connected
        }
    }

    struct StalledLink;

    impl GattLink for StalledLink {
        async fn discover_services(&mut self) -> Result<Vec<DiscoveredService>> {
            Ok(Vec::new())
        }
        async fn write_characteristic(&mut self, _handle: Handle, _data: &[u8]) -> Result<()> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(())
        }
        async fn read_characteristic(&mut self, _handle: Handle) -> Result<Vec<u8>> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(Vec::new())
        }
        async fn read_descriptor(&mut self, _characteristic: Handle, _descriptor_uuid: &str) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }
        async fn subscribe(&mut self, _handle: Handle) -> Result<()> {
            Ok(())
        }
        async fn unsubscribe(&mut self, _handle: Handle) -> Result<()> {
            Ok(())
        }
        async fn next_indication(&mut self) -> Result<Option<Handle>> {
            Ok(None)
        }
        fn is_connected(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn send_pdu_rejects_when_the_peripheral_is_disconnected() {
        let mut transport = BlePduTransport::new(DisconnectingLink { connected: false });
        let err = transport.send_pdu(1, &[1, 2, 3], 0x10).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[tokio::test]
    async fn read_pdu_rejects_when_the_peripheral_is_disconnected() {
        let mut transport = BlePduTransport::new(DisconnectingLink { connected: false });
        let err = transport.read_pdu(1).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[tokio::test]
    async fn send_pdu_times_out_on_a_stalled_write() {
        let mut transport = BlePduTransport::new(StalledLink);
        transport.set_operation_timeout(Duration::from_millis(1));
        let err = transport.send_pdu(1, &[1, 2, 3], 0x10).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[tokio::test]
    async fn read_pdu_times_out_on_a_stalled_read() {
        let mut transport = BlePduTransport::new(StalledLink);
        transport.set_operation_timeout(Duration::from_millis(1));
        let err = transport.read_pdu(1).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[tokio::test]
    async fn round_trips_an_unencrypted_pdu() {
        let mut transport = BlePduTransport::new(FakeLink { characteristics: HashMap::new() });
        transport.send_pdu(1, &[1, 2, 3, 4], 0x10).await.unwrap();
        let pdu = transport.read_pdu(1).await.unwrap();
        assert_eq!(pdu, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn round_trips_an_encrypted_pdu_across_both_directions() {
        let mut controller = BlePduTransport::new(FakeLink { characteristics: HashMap::new() });
        let (k_a2c, k_c2a) = ([1u8; 32], [2u8; 32]);
        controller.upgrade(k_a2c, k_c2a).unwrap();
        assert!(controller.is_encrypted());

        controller.send_pdu(5, &[9, 9, 9], 0x01).await.unwrap();
        let on_wire = controller.link().characteristics.get(&5).unwrap().clone();
        assert_ne!(on_wire, vec![9, 9, 9]);

        let mut accessory = BlePduTransport::new(FakeLink { characteristics: HashMap::from([(5, on_wire)]) });
        accessory.upgrade(k_c2a, k_a2c).unwrap();
        let pdu = accessory.read_pdu(5).await.unwrap();
        assert_eq!(pdu, vec![9, 9, 9]);
    }
}
