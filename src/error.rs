use derive_more::From;
use thiserror::Error;
use tracing::debug;

use crate::codec::FrameCodecError;

/// Errors returned by BLE interaction operations.
#[derive(Debug, Error)]
pub enum InteractionError {
    #[error("BLE operation failed")]
    Ble(#[from] btleplug::Error),
    #[error("no BLE adapters were found")]
    NoAdapters,
    #[error("no device whose name contains `{filter}` was found in the fake fixture")]
    NoMatchingFixtureDevice { filter: String },
    #[error("characteristic `{uuid}` is not present on the connected device")]
    UnknownCharacteristic { uuid: String },
    #[error("injected write failure on characteristic `{uuid}`")]
    InjectedWriteFailure { uuid: String },
    #[error("injected subscribe failure on characteristic `{uuid}`")]
    InjectedSubscribeFailure { uuid: String },
    #[error("characteristic selection failed")]
    Selection(#[from] SelectionError),
    #[error("failed while reading operator input")]
    OperatorInput { source: std::io::Error },
    #[error(transparent)]
    Fixture(#[from] FixtureError),
}

/// Fatal outcomes of characteristic selection.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum SelectionError {
    #[error("no write-capable characteristics were discovered")]
    NoWriteCandidates,
    #[error("no notify-capable characteristics were discovered")]
    NoNotifyTargets,
}

/// Errors returned when a command could not be delivered.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no write candidates were supplied")]
    NoCandidates,
    #[error("all {attempts} write candidates failed")]
    AllCandidatesFailed { attempts: usize },
    #[error(transparent)]
    FrameCodec(#[from] FrameCodecError),
}

/// Errors returned when parsing fake interaction fixtures.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum FixtureError {
    #[error("the fake discovery fixture is empty")]
    EmptyFixture,
    #[error("fixture records must contain four pipe-delimited fields")]
    InvalidRecordFieldCount,
    #[error("fixture records cannot contain empty mandatory fields")]
    EmptyRecordField,
    #[error("failed to parse RSSI value `{value}`")]
    InvalidRssi { value: String },
    #[error("hex payload length must be even")]
    InvalidHexLength,
    #[error("hex payload is invalid: {value}")]
    InvalidHexByte { value: String },
    #[error("GATT fixture service `{record}` must look like `service_uuid=char_uuid:props,...`")]
    InvalidServiceRecord { record: String },
    #[error("GATT fixture characteristic `{record}` must look like `char_uuid:prop+prop`")]
    InvalidCharacteristicRecord { record: String },
    #[error("unknown characteristic capability `{value}`")]
    UnknownCapability { value: String },
}

/// Errors returned while loading the operator preset table.
#[derive(Debug, Error)]
pub enum PresetError {
    #[error("failed to read preset file `{path}`")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse preset file `{path}`")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error("preset key `{key}` must be exactly one character")]
    InvalidKey { key: String },
    #[error("preset key `{key}` is reserved")]
    ReservedKey { key: char },
    #[error("preset key `{key}` is defined more than once")]
    DuplicateKey { key: char },
    #[error("no preset is bound to key `{key}`")]
    UnknownKey { key: char },
}

/// Errors returned when validating runtime backend options.
#[derive(Debug, Error)]
pub(crate) enum CliConfigError {
    #[error("missing fake scan fixture while fake mode is enabled")]
    MissingFakeScanFixture,
    #[error("`send` needs either a preset key or --hex")]
    MissingSendPayload,
}

/// Errors returned by telemetry initialisation.
#[derive(Debug, Error)]
pub(crate) enum TelemetryError {
    #[error("failed to install tracing subscriber")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}

/// Top-level protocol errors wrapping module-specific error types.
#[derive(Debug, Error, From)]
pub enum ProtocolError {
    #[error(transparent)]
    #[from(FrameCodecError, Box<FrameCodecError>)]
    FrameCodec(Box<FrameCodecError>),
    #[error(transparent)]
    #[from(DispatchError, Box<DispatchError>)]
    Dispatch(Box<DispatchError>),
    #[error(transparent)]
    #[from(PresetError, Box<PresetError>)]
    Preset(Box<PresetError>),
    #[error(transparent)]
    #[from(InteractionError, Box<InteractionError>)]
    Interaction(Box<InteractionError>),
}

/// Drops the error from a best-effort shutdown step after logging it.
///
/// Unsubscribe and disconnect failures while tearing a session down leave
/// nothing for the caller to recover, so they are recorded and discarded here.
pub(crate) fn discard_shutdown_error(step: &'static str, result: Result<(), InteractionError>) {
    if let Err(error) = result {
        debug!(step, ?error, "ignoring shutdown failure");
    }
}
