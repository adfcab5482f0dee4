use std::fmt::Debug;
use std::pin::Pin;

use async_trait::async_trait;
use tokio_stream::Stream;
use tracing::info;

use super::btleplug_backend::BtleplugBackend;
use super::fake_backend::{FakeBackend, FakeBackendConfig};
use super::matcher::DeviceMatcher;
use super::model::{Capabilities, CharacteristicInfo, FoundDevice, InboundNotification, ServiceInfo};
use crate::error::InteractionError;

/// Multiplexed inbound notifications from every subscribed characteristic.
pub type NotificationStream = Pin<Box<dyn Stream<Item = InboundNotification> + Send>>;

/// GATT write flavour used for one write.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, derive_more::Display)]
pub enum WriteMode {
    /// Confirmed write.
    #[display("with_response")]
    WithResponse,
    /// Unconfirmed write.
    #[display("without_response")]
    WithoutResponse,
}

impl WriteMode {
    /// Picks the write flavour for a characteristic's capabilities.
    ///
    /// Write-without-response is used only when it is the sole write flavour.
    ///
    /// ```
    /// use jimu_probe::{Capabilities, Capability, WriteMode};
    ///
    /// let unconfirmed = Capabilities::from_iter([Capability::WriteWithoutResponse]);
    /// assert_eq!(WriteMode::WithoutResponse, WriteMode::for_capabilities(unconfirmed));
    /// ```
    #[must_use]
    pub fn for_capabilities(capabilities: Capabilities) -> Self {
        if capabilities.only_write_without_response() {
            Self::WithoutResponse
        } else {
            Self::WithResponse
        }
    }
}

/// Builds a hardware client backed by the platform BLE stack.
pub(crate) fn real_hardware_client() -> Box<dyn HardwareClient> {
    Box::new(RealHardwareClient)
}

/// Builds a hardware client backed by fixtures.
pub(crate) fn fake_hardware_client(config: FakeBackendConfig) -> Box<dyn HardwareClient> {
    info!("using fake BLE backend");
    Box::new(FakeHardwareClient {
        backend: FakeBackend::new(config),
    })
}

/// Entry point into a BLE stack: scan, match, connect, discover.
#[async_trait]
pub trait HardwareClient: Send + Sync {
    /// Scans until a peripheral passes `matcher`, stops scanning, connects and
    /// discovers its full GATT table.
    async fn connect_first_device(
        self: Box<Self>,
        matcher: &DeviceMatcher,
    ) -> Result<DeviceSession, InteractionError>;
}

#[derive(Debug)]
struct RealHardwareClient;

#[async_trait]
impl HardwareClient for RealHardwareClient {
    async fn connect_first_device(
        self: Box<Self>,
        matcher: &DeviceMatcher,
    ) -> Result<DeviceSession, InteractionError> {
        let backend = BtleplugBackend::new().await?;
        let session = backend.connect_first_matching_device(matcher).await?;
        Ok(DeviceSession::new(Box::new(session)))
    }
}

#[derive(Debug)]
struct FakeHardwareClient {
    backend: FakeBackend,
}

#[async_trait]
impl HardwareClient for FakeHardwareClient {
    async fn connect_first_device(
        self: Box<Self>,
        matcher: &DeviceMatcher,
    ) -> Result<DeviceSession, InteractionError> {
        let Self { backend } = *self;
        let session = backend.connect_first_matching_device(matcher).await?;
        Ok(DeviceSession::new(Box::new(session)))
    }
}

/// Backend-specific connected peripheral.
#[async_trait]
pub(crate) trait ConnectedBleSession: Debug + Send + Sync {
    fn device(&self) -> &FoundDevice;

    fn services(&self) -> &[ServiceInfo];

    async fn write_characteristic(
        &self,
        uuid: &str,
        payload: &[u8],
        mode: WriteMode,
    ) -> Result<(), InteractionError>;

    async fn subscribe(&self, uuid: &str) -> Result<(), InteractionError>;

    async fn unsubscribe(&self, uuid: &str) -> Result<(), InteractionError>;

    async fn notifications(&self) -> Result<NotificationStream, InteractionError>;

    async fn close(self: Box<Self>) -> Result<(), InteractionError>;
}

/// A connected peripheral with its discovered GATT table.
///
/// The session owns the connection exclusively until [`DeviceSession::close`].
#[derive(Debug)]
pub struct DeviceSession {
    inner: Box<dyn ConnectedBleSession>,
}

impl DeviceSession {
    pub(crate) fn new(inner: Box<dyn ConnectedBleSession>) -> Self {
        Self { inner }
    }

    /// Returns details for the connected device.
    #[must_use]
    pub fn device(&self) -> &FoundDevice {
        self.inner.device()
    }

    /// Returns every discovered service in discovery order.
    #[must_use]
    pub fn services(&self) -> &[ServiceInfo] {
        self.inner.services()
    }

    /// Writes raw bytes to one characteristic.
    ///
    /// # Errors
    ///
    /// Returns an error if the characteristic is unknown or the write fails.
    pub async fn write(
        &self,
        characteristic: &CharacteristicInfo,
        payload: &[u8],
        mode: WriteMode,
    ) -> Result<(), InteractionError> {
        self.inner
            .write_characteristic(characteristic.uuid(), payload, mode)
            .await
    }

    /// Enables notifications on one characteristic.
    ///
    /// # Errors
    ///
    /// Returns an error if the characteristic is unknown or the subscribe fails.
    pub async fn subscribe(
        &self,
        characteristic: &CharacteristicInfo,
    ) -> Result<(), InteractionError> {
        self.inner.subscribe(characteristic.uuid()).await
    }

    /// Disables notifications on one characteristic.
    ///
    /// # Errors
    ///
    /// Returns an error if the characteristic is unknown or the unsubscribe fails.
    pub async fn unsubscribe(
        &self,
        characteristic: &CharacteristicInfo,
    ) -> Result<(), InteractionError> {
        self.inner.unsubscribe(characteristic.uuid()).await
    }

    /// Opens the multiplexed notification stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot open the stream.
    pub async fn notifications(&self) -> Result<NotificationStream, InteractionError> {
        self.inner.notifications().await
    }

    /// Disconnects from the device.
    ///
    /// # Errors
    ///
    /// Returns an error if the disconnect fails.
    pub async fn close(self) -> Result<(), InteractionError> {
        self.inner.close().await
    }
}
