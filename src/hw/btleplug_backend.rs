use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, CharPropFlags, Characteristic, Manager as _, Peripheral as _, PeripheralProperties,
    ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use tokio::time::sleep;
use tokio_stream::StreamExt;
use tracing::{debug, info, instrument, trace, warn};

use super::hardware::{ConnectedBleSession, NotificationStream, WriteMode};
use super::matcher::DeviceMatcher;
use super::model::{
    Capabilities, Capability, CharacteristicInfo, FoundDevice, InboundNotification, ServiceInfo,
};
use crate::error::InteractionError;

const SCAN_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Hardware backend backed by `btleplug`.
#[derive(Debug)]
pub(crate) struct BtleplugBackend {
    manager: Manager,
}

impl BtleplugBackend {
    /// Creates the real BLE backend.
    pub(crate) async fn new() -> Result<Self, InteractionError> {
        let manager = Manager::new().await?;
        Ok(Self { manager })
    }

    /// Scans indefinitely until the first matching peripheral appears, then connects.
    #[instrument(skip(self), level = "debug", fields(filter = matcher.target()))]
    async fn find_and_connect_first_matching(
        &self,
        matcher: &DeviceMatcher,
    ) -> Result<ConnectedPeripheral, InteractionError> {
        let adapters = self.adapters().await?;
        info!(
            adapter_count = adapters.len(),
            filter = matcher.target(),
            "starting indefinite BLE scan"
        );

        for adapter in &adapters {
            adapter.adapter.start_scan(ScanFilter::default()).await?;
        }

        loop {
            for adapter in &adapters {
                let peripherals = match adapter.adapter.peripherals().await {
                    Ok(peripherals) => peripherals,
                    Err(error) => {
                        warn!(adapter = %adapter.name, ?error, "failed to list peripherals");
                        continue;
                    }
                };
                for peripheral in peripherals {
                    let Some(properties) = scan_candidate_properties(
                        &peripheral.id().to_string(),
                        peripheral.properties().await,
                    ) else {
                        continue;
                    };
                    let local_name = properties.local_name;
                    if !matcher.matches(local_name.as_deref()) {
                        trace!(?local_name, "skipping non-matching peripheral");
                        continue;
                    }

                    for handle in &adapters {
                        if let Err(error) = handle.adapter.stop_scan().await {
                            debug!(?error, "failed to stop adapter scan cleanly");
                        }
                    }

                    if !peripheral.is_connected().await? {
                        peripheral.connect().await?;
                    }
                    peripheral.discover_services().await?;

                    let device = FoundDevice::new(
                        adapter.name.clone(),
                        peripheral.id().to_string(),
                        local_name,
                        properties.rssi,
                    );
                    info!(
                        device_id = device.device_id(),
                        local_name = ?device.local_name(),
                        "connected to matching peripheral"
                    );
                    return Ok(ConnectedPeripheral { peripheral, device });
                }
            }

            sleep(SCAN_POLL_INTERVAL).await;
        }
    }

    #[instrument(skip(self), level = "trace")]
    async fn adapters(&self) -> Result<Vec<AdapterHandle>, InteractionError> {
        let adapters = self.manager.adapters().await?;
        if adapters.is_empty() {
            return Err(InteractionError::NoAdapters);
        }

        let mut handles = Vec::with_capacity(adapters.len());
        for adapter in adapters {
            let name = adapter.adapter_info().await?;
            match adapter.adapter_state().await {
                Ok(state) => debug!(adapter = %name, ?state, "adapter state"),
                Err(error) => warn!(adapter = %name, ?error, "failed to read adapter state"),
            }
            handles.push(AdapterHandle { adapter, name });
        }
        Ok(handles)
    }

    /// Connects to the first matching peripheral and discovers its GATT table.
    #[instrument(skip(self), level = "debug", fields(filter = matcher.target()))]
    pub(crate) async fn connect_first_matching_device(
        self,
        matcher: &DeviceMatcher,
    ) -> Result<RealDeviceSession, InteractionError> {
        let connected = self.find_and_connect_first_matching(matcher).await?;
        let (services, characteristics_by_uuid) =
            collect_services_and_characteristics(&connected.peripheral);
        debug!(
            service_count = services.len(),
            characteristic_count = characteristics_by_uuid.len(),
            "discovered GATT table"
        );

        Ok(RealDeviceSession {
            device: connected.device,
            services,
            characteristics_by_uuid,
            peripheral: connected.peripheral,
        })
    }
}

/// Active session bound to a real peripheral.
#[derive(Debug)]
pub(crate) struct RealDeviceSession {
    device: FoundDevice,
    services: Vec<ServiceInfo>,
    characteristics_by_uuid: HashMap<String, Characteristic>,
    peripheral: Peripheral,
}

impl RealDeviceSession {
    fn characteristic_for(&self, uuid: &str) -> Result<&Characteristic, InteractionError> {
        let uuid = uuid.to_ascii_lowercase();
        self.characteristics_by_uuid
            .get(&uuid)
            .ok_or(InteractionError::UnknownCharacteristic { uuid })
    }
}

#[async_trait]
impl ConnectedBleSession for RealDeviceSession {
    fn device(&self) -> &FoundDevice {
        &self.device
    }

    fn services(&self) -> &[ServiceInfo] {
        &self.services
    }

    #[instrument(skip(self, payload), level = "trace", fields(payload_len = payload.len()))]
    async fn write_characteristic(
        &self,
        uuid: &str,
        payload: &[u8],
        mode: WriteMode,
    ) -> Result<(), InteractionError> {
        let characteristic = self.characteristic_for(uuid)?;
        let write_type = match mode {
            WriteMode::WithResponse => WriteType::WithResponse,
            WriteMode::WithoutResponse => WriteType::WithoutResponse,
        };
        self.peripheral
            .write(characteristic, payload, write_type)
            .await?;
        Ok(())
    }

    #[instrument(skip(self), level = "trace")]
    async fn subscribe(&self, uuid: &str) -> Result<(), InteractionError> {
        let characteristic = self.characteristic_for(uuid)?;
        self.peripheral.subscribe(characteristic).await?;
        Ok(())
    }

    #[instrument(skip(self), level = "trace")]
    async fn unsubscribe(&self, uuid: &str) -> Result<(), InteractionError> {
        let characteristic = self.characteristic_for(uuid)?;
        self.peripheral.unsubscribe(characteristic).await?;
        Ok(())
    }

    async fn notifications(&self) -> Result<NotificationStream, InteractionError> {
        let notifications = self.peripheral.notifications().await?;
        Ok(Box::pin(notifications.map(|notification| {
            InboundNotification::new(
                notification.uuid.to_string().to_lowercase(),
                notification.value,
            )
        })))
    }

    #[instrument(skip(self), level = "debug")]
    async fn close(self: Box<Self>) -> Result<(), InteractionError> {
        if self.peripheral.is_connected().await? {
            self.peripheral.disconnect().await?;
        }
        Ok(())
    }
}

#[derive(Debug)]
struct AdapterHandle {
    adapter: Adapter,
    name: String,
}

#[derive(Debug)]
struct ConnectedPeripheral {
    peripheral: Peripheral,
    device: FoundDevice,
}

/// Flattens the peripheral's services in the order the platform reports them.
///
/// When a characteristic UUID appears under more than one service the first
/// occurrence owns the write/subscribe handle.
fn collect_services_and_characteristics(
    peripheral: &Peripheral,
) -> (Vec<ServiceInfo>, HashMap<String, Characteristic>) {
    let mut services = Vec::new();
    let mut characteristics_by_uuid = HashMap::new();

    for service in peripheral.services() {
        let service_uuid = service.uuid.to_string();

        let mut characteristics = Vec::with_capacity(service.characteristics.len());
        for characteristic in &service.characteristics {
            let info = CharacteristicInfo::new(
                &characteristic.uuid.to_string(),
                &service_uuid,
                capabilities_from_flags(characteristic.properties),
            );
            characteristics_by_uuid
                .entry(info.uuid().to_string())
                .or_insert_with(|| characteristic.clone());
            characteristics.push(info);
        }

        services.push(ServiceInfo::new(&service_uuid, characteristics));
    }

    (services, characteristics_by_uuid)
}

fn capabilities_from_flags(flags: CharPropFlags) -> Capabilities {
    [
        (CharPropFlags::READ, Capability::Read),
        (CharPropFlags::WRITE, Capability::Write),
        (
            CharPropFlags::WRITE_WITHOUT_RESPONSE,
            Capability::WriteWithoutResponse,
        ),
        (CharPropFlags::NOTIFY, Capability::Notify),
        (CharPropFlags::INDICATE, Capability::Indicate),
    ]
    .into_iter()
    .filter(|(flag, _)| flags.contains(*flag))
    .map(|(_, capability)| capability)
    .collect()
}

/// Properties worth matching against, or `None` when the peripheral should be
/// skipped this scan pass. A failed read never ends the scan.
fn scan_candidate_properties(
    peripheral_id: &str,
    result: btleplug::Result<Option<PeripheralProperties>>,
) -> Option<PeripheralProperties> {
    match result {
        Ok(properties) => properties,
        Err(error) => {
            warn!(
                peripheral_id,
                ?error,
                "failed to read peripheral properties, skipping"
            );
            None
        }
    }
}
