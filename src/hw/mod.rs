mod btleplug_backend;
mod fake_backend;
mod hardware;
mod matcher;
mod model;
mod selection;

pub(crate) use self::fake_backend::{
    FailingSubscribes, FailingWrites, FakeBackendConfig, GattFixture, NotificationPayloads,
    ScanFixture,
};
pub use self::fake_backend::{FakeRecorder, RecordedWrite};
pub use self::hardware::{DeviceSession, HardwareClient, NotificationStream, WriteMode};
pub(crate) use self::hardware::{fake_hardware_client, real_hardware_client};
pub use self::matcher::DeviceMatcher;
pub use self::model::{
    Capabilities, Capability, CharacteristicInfo, FoundDevice, InboundNotification, ServiceInfo,
};
pub use self::selection::{CharacteristicSelection, SelectionPolicy, select_characteristics};
