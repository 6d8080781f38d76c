//! [`Device`]: a sealed facade over the IP and BLE clients, exposing the
//! operations common to both behind one non-generic type so callers that
//! don't care which transport a particular accessory uses can hold a
//! single `Vec<Device>`.
//!
//! Both `IpClient<S>` and `BleClient<L>` are generic over their transport
//! collaborator (`S: AsyncRead + AsyncWrite`, `L: GattLink`). `Device`
//! erases those parameters behind trait objects so the two variants share
//! one concrete type.

use hap_core::types::{AccessoryDatabase, CharacteristicAddress};
use hap_core::{Error, Result};
use hap_pairing::{pairings, Method, PairingData};
use hap_transport_ble::client::CharacteristicReadOptions;
use hap_transport_ble::gatt::{DiscoveredService, GattLink, Handle};
use hap_transport_ble::BleClient;
use hap_transport_ip::IpClient;
use tokio::io::{AsyncRead, AsyncWrite};

/// Any duplex byte stream `IpClient` can run its HTTP/1.1 framing over,
/// boxed so `Device::Ip` doesn't carry the stream type as a generic
/// parameter. `tokio::io::{AsyncRead, AsyncWrite}` are themselves
/// dyn-compatible (poll-based, no async fn), so this needs no boxed-future
/// shim, unlike [`DynGattLink`] below.
pub trait DuplexStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> DuplexStream for T {}

pub type BoxedStream = Box<dyn DuplexStream>;

/// Object-safe mirror of [`GattLink`], whose methods are native
/// async-fn-in-trait and therefore not `dyn`-compatible. Every method is
/// boxed into a future the same way `async-trait` would generate, and
/// [`GattLink`] is implemented for `Box<dyn DynGattLink>` below so
/// `BleClient<Box<dyn DynGattLink>>` can be built from any concrete link.
#[async_trait::async_trait(?Send)]
pub trait DynGattLink: Send {
    async fn discover_services(&mut self) -> Result<Vec<DiscoveredService>>;
    async fn write_characteristic(&mut self, handle: Handle, data: &[u8]) -> Result<()>;
    async fn read_characteristic(&mut self, handle: Handle) -> Result<Vec<u8>>;
    async fn read_descriptor(&mut self, characteristic: Handle, descriptor_uuid: &str) -> Result<Vec<u8>>;
    async fn subscribe(&mut self, handle: Handle) -> Result<()>;
    async fn unsubscribe(&mut self, handle: Handle) -> Result<()>;
    async fn next_indication(&mut self) -> Result<Option<Handle>>;
    fn is_connected(&self) -> bool;
}

#[async_trait::async_trait(?Send)]
impl<T: GattLink + Send> DynGattLink for T {
    async fn discover_services(&mut self) -> Result<Vec<DiscoveredService>> {
        GattLink::discover_services(self).await
    }
    async fn write_characteristic(&mut self, handle: Handle, data: &[u8]) -> Result<()> {
        GattLink::write_characteristic(self, handle, data).await
    }
    async fn read_characteristic(&mut self, handle: Handle) -> Result<Vec<u8>> {
        GattLink::read_characteristic(self, handle).await
    }
    async fn read_descriptor(&mut self, characteristic: Handle, descriptor_uuid: &str) -> Result<Vec<u8>> {
        GattLink::read_descriptor(self, characteristic, descriptor_uuid).await
    }
    async fn subscribe(&mut self, handle: Handle) -> Result<()> {
        GattLink::subscribe(self, handle).await
    }
    async fn unsubscribe(&mut self, handle: Handle) -> Result<()> {
        GattLink::unsubscribe(self, handle).await
    }
    async fn next_indication(&mut self) -> Result<Option<Handle>> {
        GattLink::next_indication(self).await
    }
    fn is_connected(&self) -> bool {
        GattLink::is_connected(self)
    }
}

impl GattLink for Box<dyn DynGattLink> {
    async fn discover_services(&mut self) -> Result<Vec<DiscoveredService>> {
        DynGattLink::discover_services(self.as_mut()).await
    }
    async fn write_characteristic(&mut self, handle: Handle, data: &[u8]) -> Result<()> {
        DynGattLink::write_characteristic(self.as_mut(), handle, data).await
    }
    async fn read_characteristic(&mut self, handle: Handle) -> Result<Vec<u8>> {
        DynGattLink::read_characteristic(self.as_mut(), handle).await
    }
    async fn read_descriptor(&mut self, characteristic: Handle, descriptor_uuid: &str) -> Result<Vec<u8>> {
        DynGattLink::read_descriptor(self.as_mut(), characteristic, descriptor_uuid).await
    }
    async fn subscribe(&mut self, handle: Handle) -> Result<()> {
        DynGattLink::subscribe(self.as_mut(), handle).await
    }
    async fn unsubscribe(&mut self, handle: Handle) -> Result<()> {
        DynGattLink::unsubscribe(self.as_mut(), handle).await
    }
    async fn next_indication(&mut self) -> Result<Option<Handle>> {
        DynGattLink::next_indication(self.as_mut()).await
    }
    fn is_connected(&self) -> bool {
        DynGattLink::is_connected(self.as_ref())
    }
}

type BleDevice = BleClient<Box<dyn DynGattLink>>;

/// One paired or pairable accessory, reached over whichever transport it
/// advertises. Sealed: the only way to build a variant is [`Device::ip`]
/// or [`Device::ble`], so a third transport can't silently slip past a
/// caller's `match`.
pub enum Device {
    Ip(IpClient<BoxedStream>),
    Ble(BleDevice),
}

impl Device {
    pub fn ip<S>(stream: S, pairing_data: Option<PairingData>) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        Device::Ip(IpClient::new(Box::new(stream) as BoxedStream, pairing_data))
    }

    pub fn ble<L>(link: L, pairing_data: Option<PairingData>, config: &hap_config::ClientConfig) -> Self
    where
        L: GattLink + Send + 'static,
    {
        let mut client = BleClient::new(Box::new(link) as Box<dyn DynGattLink>, pairing_data);
        client.apply_config(config);
        Device::Ble(client)
    }

    /// Downcasts to the IP client, for operations (like `getImage`) that
    /// only exist over IP.
    pub fn as_ip(&mut self) -> Option<&mut IpClient<BoxedStream>> {
        match self {
            Device::Ip(ip) => Some(ip),
            Device::Ble(_) => None,
        }
    }

    /// Downcasts to the BLE client, for operations (like
    /// `getPairingMethod`) that only exist over BLE.
    pub fn as_ble(&mut self) -> Option<&mut BleDevice> {
        match self {
            Device::Ip(_) => None,
            Device::Ble(ble) => Some(ble),
        }
    }

    pub fn get_long_term_data(&self) -> Option<&PairingData> {
        match self {
            Device::Ip(ip) => ip.get_long_term_data(),
            Device::Ble(ble) => ble.get_long_term_data(),
        }
    }

    pub async fn identify(&mut self) -> Result<()> {
        match self {
            Device::Ip(ip) => ip.identify().await,
            Device::Ble(ble) => ble.identify().await,
        }
        .inspect_err(|e| tracing::warn!(error = %e, "identify failed"))
    }

    pub async fn pair_setup(&mut self, pin: &str, method: Method, flags: Option<u32>) -> Result<()> {
        match self {
            Device::Ip(ip) => ip.pair_setup(pin, method, flags).await,
            Device::Ble(ble) => ble.pair_setup(pin, method, flags).await,
        }
        .inspect_err(|e| tracing::warn!(error = %e, "pair-setup failed"))
    }

    pub async fn pair_verify(&mut self) -> Result<()> {
        match self {
            Device::Ip(ip) => ip.pair_verify().await,
            Device::Ble(ble) => ble.pair_verify().await,
        }
        .inspect_err(|e| tracing::warn!(error = %e, "pair-verify failed"))
    }

    pub async fn add_pairing(&mut self, identifier: &[u8], public_key: &[u8; 32], is_admin: bool) -> Result<()> {
        match self {
            Device::Ip(ip) => ip.add_pairing(identifier, public_key, is_admin).await,
            Device::Ble(ble) => ble.add_pairing(identifier, public_key, is_admin).await,
        }
        .inspect_err(|e| tracing::warn!(error = %e, "add-pairing failed"))
    }

    pub async fn remove_pairing(&mut self, identifier: &[u8]) -> Result<()> {
        match self {
            Device::Ip(ip) => ip.remove_pairing(identifier).await,
            Device::Ble(ble) => ble.remove_pairing(identifier).await,
        }
        .inspect_err(|e| tracing::warn!(error = %e, "remove-pairing failed"))
    }

    pub async fn list_pairings(&mut self) -> Result<Vec<pairings::PairingEntry>> {
        match self {
            Device::Ip(ip) => ip.list_pairings().await,
            Device::Ble(ble) => ble.list_pairings().await,
        }
        .inspect_err(|e| tracing::warn!(error = %e, "list-pairings failed"))
    }

    pub async fn get_accessories(&mut self) -> Result<AccessoryDatabase> {
        match self {
            Device::Ip(ip) => ip.get_accessories().await,
            Device::Ble(ble) => ble.get_accessories().await,
        }
        .inspect_err(|e| tracing::warn!(error = %e, "get-accessories failed"))
    }

    /// The common subset of the IP and BLE `getCharacteristics` surface.
    /// The BLE client's richer `meta`-flagged read is reachable via
    /// [`Device::as_ble`].
    pub async fn get_characteristics(&mut self, ids: &[CharacteristicAddress]) -> Result<serde_json::Value> {
        match self {
            Device::Ip(ip) => ip.get_characteristics(ids).await,
            Device::Ble(ble) => ble.get_characteristics(ids, CharacteristicReadOptions::default()).await,
        }
        .inspect_err(|e| tracing::warn!(error = %e, "get-characteristics failed"))
    }

    pub async fn set_characteristics(&mut self, body: serde_json::Value) -> Result<Option<serde_json::Value>> {
        match self {
            Device::Ip(ip) => ip.set_characteristics(body).await,
            Device::Ble(ble) => ble.set_characteristics(body).await,
        }
        .inspect_err(|e| tracing::warn!(error = %e, "set-characteristics failed"))
    }

    pub async fn subscribe_characteristics(&mut self, ids: &[CharacteristicAddress]) -> Result<()> {
        match self {
            Device::Ip(ip) => ip.subscribe_characteristics(ids).await,
            Device::Ble(ble) => ble.subscribe_characteristics(ids).await,
        }
        .inspect_err(|e| tracing::warn!(error = %e, "subscribe-characteristics failed"))
    }

    pub async fn unsubscribe_characteristics(&mut self, ids: Option<&[CharacteristicAddress]>) -> Result<()> {
        match self {
            Device::Ip(ip) => ip.unsubscribe_characteristics(ids).await,
            Device::Ble(ble) => ble.unsubscribe_characteristics(ids).await,
        }
        .inspect_err(|e| tracing::warn!(error = %e, "unsubscribe-characteristics failed"))
    }

    /// `getImage` has no BLE equivalent; calling it on a BLE device is a
    /// usage error rather than a silent no-op.
    pub async fn get_image(&mut self, width: u32, height: u32, aid: Option<u64>) -> Result<Vec<u8>> {
        match self.as_ip() {
            Some(ip) => ip.get_image(width, height, aid).await,
            None => Err(Error::usage("getImage is only available over the IP transport")),
        }
        .inspect_err(|e| tracing::warn!(error = %e, "get-image failed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    struct StubLink;

    impl GattLink for StubLink {
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
            true
        }
    }

    #[test]
    fn ip_device_downcasts_as_ip_not_ble() {
        let (stream, _peer) = duplex(64);
        let mut device = Device::ip(stream, None);
        assert!(device.as_ip().is_some());
        assert!(device.as_ble().is_none());
    }

    #[test]
    fn ble_device_downcasts_as_ble_not_ip() {
        let mut device = Device::ble(StubLink, None, &hap_config::ClientConfig::default());
        assert!(device.as_ble().is_some());
        assert!(device.as_ip().is_none());
    }

    #[tokio::test]
    async fn get_image_on_a_ble_device_is_a_usage_error() {
        let mut device = Device::ble(StubLink, None, &hap_config::ClientConfig::default());
        let err = device.get_image(320, 240, None).await.unwrap_err();
        assert!(matches!(err, Error::Usage(_)));
    }
}
