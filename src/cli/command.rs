use std::path::{Path, PathBuf};
use std::time::Duration;

use bon::Builder;
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use tracing::level_filters::LevelFilter;

use crate::error::{CliConfigError, FixtureError};
use crate::hw::{
    FailingSubscribes, FailingWrites, FakeBackendConfig, FakeRecorder, GattFixture,
    NotificationPayloads, ScanFixture, SelectionPolicy,
};
use crate::protocol::{DEFAULT_DEVICE_NAME_FILTER, VENDOR_SERVICE_PREFIX};
use crate::utils::HexPayload;

const DEFAULT_LISTEN_WINDOW: &str = "2s";

/// Command-line options for the JIMU BLE probe.
#[derive(Debug, Parser)]
#[command(
    name = "jimu-probe",
    about = "Probe and log the BLE control protocol of JIMU robot kits."
)]
pub struct Args {
    /// Overrides `RUST_LOG` for diagnostics written to stderr.
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,
    /// Case-insensitive substring the advertised device name must contain.
    #[arg(long, global = true, default_value = DEFAULT_DEVICE_NAME_FILTER)]
    name: String,
    /// Hyphen-free UUID prefix identifying the vendor service.
    #[arg(long, global = true, default_value = VENDOR_SERVICE_PREFIX)]
    vendor_prefix: String,
    /// Known-good write characteristic UUID; repeat to build an ordered allow-list.
    #[arg(long = "known-write", global = true, value_name = "UUID")]
    known_write: Vec<String>,
    /// JSON preset table to use instead of the per-user or built-in table.
    #[arg(long, global = true, value_name = "PATH")]
    presets: Option<PathBuf>,
    /// Uses the fake BLE backend with fixture-driven discovery and payloads.
    #[arg(long, global = true)]
    fake: bool,
    /// Fake scan fixtures in the form `adapter|device_id|local_name|rssi;...`.
    #[arg(long, global = true, requires = "fake", required_if_eq("fake", "true"))]
    fake_scan: Option<ScanFixture>,
    /// Fake GATT table in the form `service=char:caps+caps,char:caps;...`.
    #[arg(long, global = true, requires = "fake")]
    fake_gatt: Option<GattFixture>,
    /// Fake notification payloads as comma-separated hexadecimal payloads.
    #[arg(long, global = true, requires = "fake")]
    fake_notifications: Option<NotificationPayloads>,
    /// Comma-separated characteristic UUIDs whose writes always fail.
    #[arg(long, global = true, requires = "fake")]
    fake_fail_writes: Option<FailingWrites>,
    /// Comma-separated characteristic UUIDs that refuse subscriptions.
    #[arg(long, global = true, requires = "fake")]
    fake_fail_subscribes: Option<FailingSubscribes>,
    /// Artificial fake scan delay (e.g. `250ms`, `2s`).
    #[arg(long, global = true, requires = "fake", value_parser = parse_duration)]
    fake_discovery_delay: Option<Duration>,
    #[command(subcommand)]
    command: Command,
}

impl Args {
    /// Creates argument values directly without CLI parsing.
    ///
    /// ```
    /// use jimu_probe::{Args, Command};
    ///
    /// let args = Args::new(Command::Probe);
    /// assert_eq!("jimu", args.settings().name_filter());
    /// ```
    #[must_use]
    pub fn new(command: Command) -> Self {
        Self {
            log_level: None,
            name: DEFAULT_DEVICE_NAME_FILTER.to_string(),
            vendor_prefix: VENDOR_SERVICE_PREFIX.to_string(),
            known_write: Vec::new(),
            presets: None,
            fake: false,
            fake_scan: None,
            fake_gatt: None,
            fake_notifications: None,
            fake_fail_writes: None,
            fake_fail_subscribes: None,
            fake_discovery_delay: None,
            command,
        }
    }

    /// Returns the optional log-level override.
    #[must_use]
    pub fn log_level(&self) -> Option<LogLevel> {
        self.log_level
    }

    /// Returns the probe settings assembled from the global flags.
    #[must_use]
    pub fn settings(&self) -> ProbeSettings {
        let known_write_uuids = (!self.known_write.is_empty()).then(|| {
            self.known_write
                .iter()
                .map(|uuid| uuid.to_ascii_lowercase())
                .collect()
        });
        let policy = SelectionPolicy::builder()
            .vendor_prefix(self.vendor_prefix.as_str())
            .maybe_known_write_uuids(known_write_uuids)
            .build();

        ProbeSettings::builder()
            .name_filter(self.name.clone())
            .selection_policy(policy)
            .maybe_presets_path(self.presets.clone())
            .build()
    }

    /// Splits parsed CLI arguments into command and optional fake-client settings.
    ///
    /// # Errors
    ///
    /// Returns an error if CLI backend configuration is invalid.
    pub fn into_command_and_fake_args(self) -> anyhow::Result<(Command, Option<FakeArgs>)> {
        let Args {
            fake,
            fake_scan,
            fake_gatt,
            fake_notifications,
            fake_fail_writes,
            fake_fail_subscribes,
            fake_discovery_delay,
            command,
            ..
        } = self;

        let fake_args = if fake {
            let Some(scan_fixture) = fake_scan else {
                return Err(CliConfigError::MissingFakeScanFixture.into());
            };
            Some(FakeArgs {
                scan_fixture,
                gatt_fixture: fake_gatt,
                notifications: fake_notifications,
                failing_writes: fake_fail_writes,
                failing_subscribes: fake_fail_subscribes,
                discovery_delay: fake_discovery_delay.unwrap_or(Duration::ZERO),
                recorder: FakeRecorder::default(),
            })
        } else {
            None
        };

        Ok((command, fake_args))
    }
}

/// Settings shared by every connected subcommand.
#[derive(Debug, Clone, Builder)]
pub struct ProbeSettings {
    #[builder(into, default = DEFAULT_DEVICE_NAME_FILTER.to_string())]
    name_filter: String,
    #[builder(default)]
    selection_policy: SelectionPolicy,
    presets_path: Option<PathBuf>,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ProbeSettings {
    /// Returns the advertised-name filter.
    #[must_use]
    pub fn name_filter(&self) -> &str {
        &self.name_filter
    }

    /// Returns the characteristic selection policy.
    #[must_use]
    pub fn selection_policy(&self) -> &SelectionPolicy {
        &self.selection_policy
    }

    /// Returns the explicit preset file, if one was given.
    #[must_use]
    pub fn presets_path(&self) -> Option<&Path> {
        self.presets_path.as_deref()
    }
}

/// Fake backend arguments for programmatic runs.
#[derive(Debug, Builder)]
pub struct FakeArgs {
    #[builder(with = |value: &str| -> std::result::Result<_, FixtureError> { value.parse() })]
    scan_fixture: ScanFixture,
    #[builder(with = |value: &str| -> std::result::Result<_, FixtureError> { value.parse() })]
    gatt_fixture: Option<GattFixture>,
    #[builder(with = |value: &str| -> std::result::Result<_, FixtureError> { value.parse() })]
    notifications: Option<NotificationPayloads>,
    #[builder(with = |value: &str| -> std::result::Result<_, FixtureError> { value.parse() })]
    failing_writes: Option<FailingWrites>,
    #[builder(with = |value: &str| -> std::result::Result<_, FixtureError> { value.parse() })]
    failing_subscribes: Option<FailingSubscribes>,
    #[builder(default)]
    discovery_delay: Duration,
    /// Shared log of the writes and subscriptions the fake device receives.
    #[builder(default)]
    recorder: FakeRecorder,
}

impl FakeArgs {
    pub(crate) fn into_backend_config(self) -> FakeBackendConfig {
        let Self {
            scan_fixture,
            gatt_fixture,
            notifications,
            failing_writes,
            failing_subscribes,
            discovery_delay,
            recorder,
        } = self;

        FakeBackendConfig::builder()
            .scan_fixture(scan_fixture)
            .maybe_gatt_fixture(gatt_fixture)
            .maybe_notifications(notifications)
            .failing_writes(failing_writes.unwrap_or_default())
            .failing_subscribes(failing_subscribes.unwrap_or_default())
            .discovery_delay(discovery_delay)
            .recorder(recorder)
            .build()
    }
}

/// Diagnostic verbosity accepted by `--log-level`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Converts the CLI level to a tracing filter.
    #[must_use]
    pub fn as_level_filter(self) -> LevelFilter {
        match self {
            Self::Error => LevelFilter::ERROR,
            Self::Warn => LevelFilter::WARN,
            Self::Info => LevelFilter::INFO,
            Self::Debug => LevelFilter::DEBUG,
            Self::Trace => LevelFilter::TRACE,
        }
    }
}

/// Supported CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Connect to the first JIMU device and send preset commands on single key presses.
    Probe,
    /// Connect, send one command, log replies for a while, then disconnect.
    Send(SendArgs),
    /// Connect and print the GATT table with the characteristic selection.
    Inspect,
    /// Print the wire frame for a payload without touching any device.
    Encode(EncodeArgs),
}

/// Arguments for the `send` command.
#[derive(Debug, ClapArgs)]
pub struct SendArgs {
    /// Preset key whose payload is sent.
    #[arg(conflicts_with = "hex")]
    key: Option<char>,
    /// Raw payload as hexadecimal bytes.
    #[arg(long)]
    hex: Option<HexPayload>,
    /// How long to log notifications after the write (e.g. `500ms`, `5s`).
    #[arg(long, default_value = DEFAULT_LISTEN_WINDOW, value_parser = parse_duration)]
    listen: Duration,
}

impl SendArgs {
    /// Creates arguments that send a preset.
    #[must_use]
    pub fn preset(key: char, listen: Duration) -> Self {
        Self {
            key: Some(key),
            hex: None,
            listen,
        }
    }

    /// Creates arguments that send raw payload bytes.
    #[must_use]
    pub fn raw(payload: Vec<u8>, listen: Duration) -> Self {
        Self {
            key: None,
            hex: Some(HexPayload::from(payload)),
            listen,
        }
    }

    pub(crate) fn key(&self) -> Option<char> {
        self.key
    }

    pub(crate) fn hex(&self) -> Option<&[u8]> {
        self.hex.as_ref().map(HexPayload::as_bytes)
    }

    pub(crate) fn listen(&self) -> Duration {
        self.listen
    }
}

/// Arguments for the `encode` command.
#[derive(Debug, ClapArgs)]
pub struct EncodeArgs {
    /// Payload bytes to frame, or a whole frame with `--decode`.
    bytes: HexPayload,
    /// Classify the bytes as a frame instead of encoding them.
    #[arg(long)]
    decode: bool,
}

impl EncodeArgs {
    /// Creates arguments that frame `payload`.
    #[must_use]
    pub fn encode(payload: Vec<u8>) -> Self {
        Self {
            bytes: HexPayload::from(payload),
            decode: false,
        }
    }

    /// Creates arguments that classify `frame`.
    #[must_use]
    pub fn decode(frame: Vec<u8>) -> Self {
        Self {
            bytes: HexPayload::from(frame),
            decode: true,
        }
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        self.bytes.as_bytes()
    }

    pub(crate) fn is_decode(&self) -> bool {
        self.decode
    }
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime::parse_duration(value).map_err(|error| error.to_string())
}
