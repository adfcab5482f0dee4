mod app;
mod cli;
mod codec;
mod error;
mod hw;
mod probe;
mod protocol;
mod telemetry;
mod terminal;
mod utils;

pub use app::{
    SessionHandler, fake_hardware_client, real_hardware_client, run, run_with_clients,
    run_with_clients_and_log_level, run_with_log_level,
};
pub use cli::{Args, Command, EncodeArgs, FakeArgs, LogLevel, ProbeSettings, SendArgs};
pub use codec::{DecodedFrame, FrameCodec, FrameCodecError, FrameDecode, MalformedFrame};
pub use error::{
    DispatchError, FixtureError, InteractionError, PresetError, ProtocolError, SelectionError,
};
pub use hw::{
    Capabilities, Capability, CharacteristicInfo, CharacteristicSelection, DeviceMatcher,
    DeviceSession, FakeRecorder, FoundDevice, HardwareClient, InboundNotification,
    NotificationStream, RecordedWrite, SelectionPolicy, ServiceInfo, WriteMode,
    select_characteristics,
};
pub use probe::{
    CommandDispatcher, DispatchReceipt, FrameWriter, HELP_KEY, NotificationLogger,
    NotificationRecord, OperatorAction, OperatorKeys, Preset, PresetTable, ProbeEvent,
    ProbeSession, QUIT_KEY, SessionSummary, StopReason,
};
pub use protocol::KnownCharacteristic;
pub use terminal::{SystemTerminalClient, TerminalClient};
