use std::collections::HashSet;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bon::Builder;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

use super::hardware::{ConnectedBleSession, NotificationStream, WriteMode};
use super::matcher::DeviceMatcher;
use super::model::{
    Capabilities, Capability, CharacteristicInfo, FoundDevice, InboundNotification, ServiceInfo,
};
use crate::error::{FixtureError, InteractionError};
use crate::protocol::KnownCharacteristic;
use crate::utils::parse_hex;

const DEFAULT_VENDOR_SERVICE: &str = "49535343-fe7d-4ae5-8fa9-9fafd205e455";
const DEFAULT_VENDOR_NOTIFY: &str = "49535343-1e4d-4bd9-ba61-23c647249616";
const DEFAULT_NOTIFICATIONS: [&[u8]; 1] = [&[0xFB, 0xBF, 0x06, 0x0B, 0x00, 0xCB, 0xED]];

/// Parsed fake scan fixture records.
#[derive(Debug, Clone, derive_more::Into)]
pub(crate) struct ScanFixture {
    devices: Vec<FoundDevice>,
}

impl FromStr for ScanFixture {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let devices = parse_scan_fixture(value)?;
        Ok(Self { devices })
    }
}

/// Parsed fake GATT table in the form `service=char:caps,char:caps;service=...`.
#[derive(Debug, Clone, derive_more::Into)]
pub(crate) struct GattFixture {
    services: Vec<ServiceInfo>,
}

impl FromStr for GattFixture {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let services = value
            .split(';')
            .map(str::trim)
            .filter(|record| !record.is_empty())
            .map(parse_service_record)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { services })
    }
}

/// Parsed fake notification payload fixtures.
#[derive(Debug, Clone, derive_more::Into)]
pub(crate) struct NotificationPayloads {
    payloads: Vec<Vec<u8>>,
}

impl FromStr for NotificationPayloads {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let payloads = parse_notifications(value)?;
        Ok(Self { payloads })
    }
}

/// Characteristic UUIDs whose writes always fail.
#[derive(Debug, Clone, Default, derive_more::Into)]
pub(crate) struct FailingWrites {
    uuids: Vec<String>,
}

impl FromStr for FailingWrites {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(Self {
            uuids: parse_uuid_list(value),
        })
    }
}

/// Characteristic UUIDs that always refuse a subscription.
#[derive(Debug, Clone, Default, derive_more::Into)]
pub(crate) struct FailingSubscribes {
    uuids: Vec<String>,
}

impl FromStr for FailingSubscribes {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(Self {
            uuids: parse_uuid_list(value),
        })
    }
}

/// One write attempt observed by the fake backend.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RecordedWrite {
    /// Target characteristic UUID.
    pub uuid: String,
    /// Bytes written.
    pub payload: Vec<u8>,
    /// Write flavour requested.
    pub mode: WriteMode,
    /// Whether the write was accepted.
    pub succeeded: bool,
}

#[derive(Debug, Default)]
struct FakeLedger {
    writes: Vec<RecordedWrite>,
    subscribed: Vec<String>,
    unsubscribed: Vec<String>,
    closed: bool,
}

/// Shared view of everything the fake backend was asked to do.
#[derive(Debug, Clone, Default)]
pub struct FakeRecorder {
    ledger: Arc<Mutex<FakeLedger>>,
}

impl FakeRecorder {
    fn ledger(&self) -> MutexGuard<'_, FakeLedger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns every write attempt in order.
    #[must_use]
    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.ledger().writes.clone()
    }

    /// Returns characteristics subscribed to, in order.
    #[must_use]
    pub fn subscribed(&self) -> Vec<String> {
        self.ledger().subscribed.clone()
    }

    /// Returns characteristics unsubscribed from, in order.
    #[must_use]
    pub fn unsubscribed(&self) -> Vec<String> {
        self.ledger().unsubscribed.clone()
    }

    /// Returns whether the session was disconnected.
    #[must_use]
    pub fn closed(&self) -> bool {
        self.ledger().closed
    }
}

/// Settings for constructing a fake hardware backend.
#[derive(Debug, Builder)]
pub(crate) struct FakeBackendConfig {
    scan_fixture: ScanFixture,
    gatt_fixture: Option<GattFixture>,
    notifications: Option<NotificationPayloads>,
    #[builder(default)]
    failing_writes: FailingWrites,
    #[builder(default)]
    failing_subscribes: FailingSubscribes,
    #[builder(default)]
    discovery_delay: Duration,
    #[builder(default)]
    recorder: FakeRecorder,
}

/// Fake backend used in tests and non-hardware environments.
#[derive(Debug)]
pub(crate) struct FakeBackend {
    devices: Vec<FoundDevice>,
    services: Vec<ServiceInfo>,
    notifications: Vec<Vec<u8>>,
    failing_writes: HashSet<String>,
    failing_subscribes: HashSet<String>,
    discovery_delay: Duration,
    recorder: FakeRecorder,
}

impl FakeBackend {
    /// Creates a fake backend from explicit settings.
    pub(crate) fn new(config: FakeBackendConfig) -> Self {
        let services = config
            .gatt_fixture
            .map_or_else(default_services, Into::into);
        let notifications = config.notifications.map_or_else(
            || DEFAULT_NOTIFICATIONS.iter().map(|payload| payload.to_vec()).collect(),
            Into::into,
        );
        let failing_writes: Vec<String> = config.failing_writes.into();
        let failing_subscribes: Vec<String> = config.failing_subscribes.into();

        Self {
            devices: config.scan_fixture.into(),
            services,
            notifications,
            failing_writes: failing_writes.into_iter().collect(),
            failing_subscribes: failing_subscribes.into_iter().collect(),
            discovery_delay: config.discovery_delay,
            recorder: config.recorder,
        }
    }

    /// Connects to the first fixture device accepted by the matcher.
    pub(crate) async fn connect_first_matching_device(
        self,
        matcher: &DeviceMatcher,
    ) -> Result<FakeDeviceSession, InteractionError> {
        if !self.discovery_delay.is_zero() {
            sleep(self.discovery_delay).await;
        }

        let device = self
            .devices
            .into_iter()
            .find(|device| matcher.matches(device.local_name()))
            .ok_or_else(|| InteractionError::NoMatchingFixtureDevice {
                filter: matcher.target().to_string(),
            })?;
        debug!(device_id = device.device_id(), "fake device matched");

        let (tx, rx) = mpsc::unbounded_channel();
        Ok(FakeDeviceSession {
            device,
            services: self.services,
            notifications: self.notifications,
            failing_writes: self.failing_writes,
            failing_subscribes: self.failing_subscribes,
            recorder: self.recorder,
            tx,
            rx: Mutex::new(Some(rx)),
        })
    }
}

/// A connected fake peripheral.
#[derive(Debug)]
pub(crate) struct FakeDeviceSession {
    device: FoundDevice,
    services: Vec<ServiceInfo>,
    notifications: Vec<Vec<u8>>,
    failing_writes: HashSet<String>,
    failing_subscribes: HashSet<String>,
    recorder: FakeRecorder,
    tx: mpsc::UnboundedSender<InboundNotification>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<InboundNotification>>>,
}

impl FakeDeviceSession {
    fn ensure_known(&self, uuid: &str) -> Result<String, InteractionError> {
        let uuid = uuid.to_ascii_lowercase();
        let known = self
            .services
            .iter()
            .flat_map(ServiceInfo::characteristics)
            .any(|characteristic| characteristic.uuid() == uuid);
        if known {
            Ok(uuid)
        } else {
            Err(InteractionError::UnknownCharacteristic { uuid })
        }
    }

    fn emit_replies(&self) {
        let Some(source) = self.recorder.ledger().subscribed.first().cloned() else {
            return;
        };
        for payload in &self.notifications {
            if self
                .tx
                .send(InboundNotification::new(source.clone(), payload.clone()))
                .is_err()
            {
                debug!("fake notification receiver dropped");
                return;
            }
        }
    }
}

#[async_trait]
impl ConnectedBleSession for FakeDeviceSession {
    fn device(&self) -> &FoundDevice {
        &self.device
    }

    fn services(&self) -> &[ServiceInfo] {
        &self.services
    }

    async fn write_characteristic(
        &self,
        uuid: &str,
        payload: &[u8],
        mode: WriteMode,
    ) -> Result<(), InteractionError> {
        let uuid = self.ensure_known(uuid)?;
        let succeeded = !self.failing_writes.contains(&uuid);
        self.recorder.ledger().writes.push(RecordedWrite {
            uuid: uuid.clone(),
            payload: payload.to_vec(),
            mode,
            succeeded,
        });

        if !succeeded {
            return Err(InteractionError::InjectedWriteFailure { uuid });
        }
        self.emit_replies();
        Ok(())
    }

    async fn subscribe(&self, uuid: &str) -> Result<(), InteractionError> {
        let uuid = self.ensure_known(uuid)?;
        if self.failing_subscribes.contains(&uuid) {
            return Err(InteractionError::InjectedSubscribeFailure { uuid });
        }
        self.recorder.ledger().subscribed.push(uuid);
        Ok(())
    }

    async fn unsubscribe(&self, uuid: &str) -> Result<(), InteractionError> {
        let uuid = self.ensure_known(uuid)?;
        self.recorder.ledger().unsubscribed.push(uuid);
        Ok(())
    }

    async fn notifications(&self) -> Result<NotificationStream, InteractionError> {
        let receiver = self
            .rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match receiver {
            Some(receiver) => Ok(Box::pin(UnboundedReceiverStream::new(receiver))),
            None => Ok(Box::pin(tokio_stream::empty())),
        }
    }

    async fn close(self: Box<Self>) -> Result<(), InteractionError> {
        self.recorder.ledger().closed = true;
        Ok(())
    }
}

fn parse_scan_fixture(raw_fixture: &str) -> Result<Vec<FoundDevice>, FixtureError> {
    if raw_fixture.trim().is_empty() {
        return Err(FixtureError::EmptyFixture);
    }

    raw_fixture
        .split(';')
        .map(parse_scan_record)
        .collect::<Result<Vec<_>, _>>()
}

fn parse_scan_record(raw_record: &str) -> Result<FoundDevice, FixtureError> {
    let fields: Vec<&str> = raw_record.split('|').map(str::trim).collect();
    if fields.len() != 4 {
        return Err(FixtureError::InvalidRecordFieldCount);
    }
    if fields.iter().any(|field| field.is_empty()) {
        return Err(FixtureError::EmptyRecordField);
    }

    let local_name = if fields[2] == "-" {
        None
    } else {
        Some(fields[2].to_string())
    };
    let rssi = if fields[3] == "-" {
        None
    } else {
        Some(
            fields[3]
                .parse::<i16>()
                .map_err(|_error| FixtureError::InvalidRssi {
                    value: fields[3].to_string(),
                })?,
        )
    };

    Ok(FoundDevice::new(
        fields[0].to_string(),
        fields[1].to_string(),
        local_name,
        rssi,
    ))
}

fn parse_service_record(raw_record: &str) -> Result<ServiceInfo, FixtureError> {
    let Some((service_uuid, raw_characteristics)) = raw_record.split_once('=') else {
        return Err(FixtureError::InvalidServiceRecord {
            record: raw_record.to_string(),
        });
    };
    let service_uuid = service_uuid.trim();
    if service_uuid.is_empty() {
        return Err(FixtureError::InvalidServiceRecord {
            record: raw_record.to_string(),
        });
    }

    let characteristics = raw_characteristics
        .split(',')
        .map(str::trim)
        .filter(|record| !record.is_empty())
        .map(|record| {
            let Some((uuid, capabilities)) = record.split_once(':') else {
                return Err(FixtureError::InvalidCharacteristicRecord {
                    record: record.to_string(),
                });
            };
            let capabilities: Capabilities = capabilities.parse()?;
            Ok(CharacteristicInfo::new(uuid.trim(), service_uuid, capabilities))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ServiceInfo::new(service_uuid, characteristics))
}

fn parse_uuid_list(raw_value: &str) -> Vec<String> {
    raw_value
        .split(',')
        .map(str::trim)
        .filter(|uuid| !uuid.is_empty())
        .map(str::to_ascii_lowercase)
        .collect()
}

fn parse_notifications(raw_value: &str) -> Result<Vec<Vec<u8>>, FixtureError> {
    if raw_value.trim().is_empty() {
        return Ok(Vec::new());
    }
    raw_value.split(',').map(parse_hex).collect()
}

fn default_services() -> Vec<ServiceInfo> {
    let write_capabilities =
        Capabilities::from_iter([Capability::Write, Capability::WriteWithoutResponse]);
    let notify_capabilities = Capabilities::from_iter([Capability::Notify]);

    vec![ServiceInfo::new(
        DEFAULT_VENDOR_SERVICE,
        vec![
            CharacteristicInfo::new(
                KnownCharacteristic::UartRx.uuid(),
                DEFAULT_VENDOR_SERVICE,
                write_capabilities,
            ),
            CharacteristicInfo::new(
                DEFAULT_VENDOR_NOTIFY,
                DEFAULT_VENDOR_SERVICE,
                notify_capabilities,
            ),
        ],
    )]
}
