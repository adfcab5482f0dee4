use std::io;

use anyhow::Result;
use owo_colors::OwoColorize;
use tracing::instrument;
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::cli::{Command, FakeArgs, LogLevel, ProbeSettings};
use crate::hw::{
    DeviceMatcher, DeviceSession, HardwareClient,
    fake_hardware_client as build_fake_hardware_client,
    real_hardware_client as build_real_hardware_client,
};
use crate::telemetry;
use crate::terminal::{SystemTerminalClient, TerminalClient};

/// Creates a hardware client backed by the real BLE transport.
#[must_use]
pub fn real_hardware_client() -> Box<dyn HardwareClient> {
    build_real_hardware_client()
}

/// Creates a hardware client backed by fake BLE fixtures.
#[must_use]
pub fn fake_hardware_client(fake_args: FakeArgs) -> Box<dyn HardwareClient> {
    build_fake_hardware_client(fake_args.into_backend_config())
}

/// Session-level app helper for acquiring a JIMU connection.
pub struct SessionHandler {
    hardware_client: Box<dyn HardwareClient>,
    matcher: DeviceMatcher,
}

impl SessionHandler {
    /// Creates a session handler matching any device whose name contains `jimu`.
    ///
    /// ```
    /// let handler = jimu_probe::SessionHandler::new(jimu_probe::real_hardware_client());
    /// let _ = handler;
    /// ```
    #[must_use]
    pub fn new(hardware_client: Box<dyn HardwareClient>) -> Self {
        Self {
            hardware_client,
            matcher: DeviceMatcher::default(),
        }
    }

    /// Overrides the device matcher used while scanning.
    ///
    /// ```
    /// use jimu_probe::DeviceMatcher;
    ///
    /// let handler = jimu_probe::SessionHandler::new(jimu_probe::real_hardware_client())
    ///     .with_matcher(DeviceMatcher::new("MeeBot"));
    /// let _ = handler;
    /// ```
    #[must_use]
    pub fn with_matcher(mut self, matcher: DeviceMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    /// Connects to the first matching JIMU peripheral and discovers its GATT table.
    ///
    /// # Errors
    ///
    /// Returns an error if discovery or connection fails.
    #[instrument(skip(self), level = "info", fields(filter = %self.matcher.target()))]
    pub async fn connect_first(self) -> Result<DeviceSession> {
        let span = tracing::Span::current();
        span.pb_set_message(&format!(
            "Scanning for devices matching `{}` and connecting",
            self.matcher.target()
        ));

        let Self {
            hardware_client,
            matcher,
        } = self;
        match hardware_client.connect_first_device(&matcher).await {
            Ok(session) => {
                span.pb_set_finish_message(&format!("{} Connected", "✓".green()));
                Ok(session)
            }
            Err(error) => {
                span.pb_set_finish_message(&format!("{} Connection failed", "✗".red()));
                Err(error.into())
            }
        }
    }
}

/// Runs the CLI command with the process terminal.
///
/// ```
/// # async fn run() -> anyhow::Result<()> {
/// use clap::Parser;
///
/// let args = jimu_probe::Args::try_parse_from([
///     "jimu-probe",
///     "--fake",
///     "--fake-scan",
///     "hci0|AA:BB:CC|JIMU-Robot|-43",
///     "inspect",
/// ])?;
/// let settings = args.settings();
/// let (command, maybe_fake_args) = args.into_command_and_fake_args()?;
/// let hardware_client = match maybe_fake_args {
///     Some(fake_args) => jimu_probe::fake_hardware_client(fake_args),
///     None => jimu_probe::real_hardware_client(),
/// };
/// let mut out = Vec::new();
/// jimu_probe::run(command, &settings, &mut out, hardware_client).await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, BLE interaction fails, or
/// output writing fails.
pub async fn run<W>(
    command: Command,
    settings: &ProbeSettings,
    out: &mut W,
    hardware_client: Box<dyn HardwareClient>,
) -> Result<()>
where
    W: io::Write,
{
    run_with_log_level(command, settings, out, hardware_client, None).await
}

/// Runs the CLI command with an explicit telemetry log-level override.
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, BLE interaction fails, or
/// output writing fails.
pub async fn run_with_log_level<W>(
    command: Command,
    settings: &ProbeSettings,
    out: &mut W,
    hardware_client: Box<dyn HardwareClient>,
    log_level: Option<LogLevel>,
) -> Result<()>
where
    W: io::Write,
{
    run_with_clients_and_log_level(
        command,
        settings,
        out,
        &SystemTerminalClient,
        hardware_client,
        log_level,
    )
    .await
}

/// Runs the CLI command with injected clients.
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, BLE interaction fails, or
/// output writing fails.
pub async fn run_with_clients<W>(
    command: Command,
    settings: &ProbeSettings,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    hardware_client: Box<dyn HardwareClient>,
) -> Result<()>
where
    W: io::Write,
{
    run_with_clients_and_log_level(
        command,
        settings,
        out,
        terminal_client,
        hardware_client,
        None,
    )
    .await
}

/// Runs the CLI command with injected clients and explicit telemetry settings.
///
/// ```
/// # async fn run() -> anyhow::Result<()> {
/// use clap::Parser;
/// use jimu_probe::{InteractionError, OperatorKeys};
///
/// struct FakeTerminal;
/// impl jimu_probe::TerminalClient for FakeTerminal {
///     fn stdout_is_terminal(&self) -> bool { false }
///     fn stderr_is_terminal(&self) -> bool { false }
///     fn operator_keys(&self) -> Result<(OperatorKeys, bool), InteractionError> {
///         Ok((Box::pin(tokio_stream::iter([Ok::<_, InteractionError>('q')])), false))
///     }
/// }
///
/// let args = jimu_probe::Args::try_parse_from([
///     "jimu-probe",
///     "--log-level",
///     "trace",
///     "--fake",
///     "--fake-scan",
///     "hci0|AA:BB:CC|JIMU-Robot|-43",
///     "probe",
/// ])?;
/// let log_level = args.log_level();
/// let settings = args.settings();
/// let (command, maybe_fake_args) = args.into_command_and_fake_args()?;
/// let hardware_client = match maybe_fake_args {
///     Some(fake_args) => jimu_probe::fake_hardware_client(fake_args),
///     None => jimu_probe::real_hardware_client(),
/// };
/// let mut out = Vec::new();
/// jimu_probe::run_with_clients_and_log_level(
///     command,
///     &settings,
///     &mut out,
///     &FakeTerminal,
///     hardware_client,
///     log_level,
/// ).await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, BLE interaction fails, or
/// output writing fails.
#[instrument(
    skip(settings, out, terminal_client, hardware_client),
    level = "info",
    fields(command = %command_name(&command), ?log_level)
)]
pub async fn run_with_clients_and_log_level<W>(
    command: Command,
    settings: &ProbeSettings,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    hardware_client: Box<dyn HardwareClient>,
    log_level: Option<LogLevel>,
) -> Result<()>
where
    W: io::Write,
{
    telemetry::initialise_tracing(
        "jimu-probe",
        terminal_client.stderr_is_terminal(),
        log_level.map(LogLevel::as_level_filter),
    )?;

    match command {
        Command::Probe => {
            crate::cli::probe::run(hardware_client, settings, out, terminal_client).await
        }
        Command::Send(args) => {
            crate::cli::send::run(hardware_client, settings, &args, out, terminal_client).await
        }
        Command::Inspect => {
            crate::cli::inspect::run(hardware_client, settings, out, terminal_client).await
        }
        Command::Encode(args) => crate::cli::encode::run(&args, out, terminal_client),
    }
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Probe => "probe",
        Command::Send(_args) => "send",
        Command::Inspect => "inspect",
        Command::Encode(_args) => "encode",
    }
}
