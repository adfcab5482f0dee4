use std::time::{Duration, Instant};

use clap::Parser;
use clap::error::ErrorKind;
use pretty_assertions::assert_eq;

const SCAN: &str = "hci1|00:11:22|Speaker|-65;hci0|AA:BB:CC|JIMU-Robot|-43";

#[derive(Debug, Default)]
struct FakeTerminalClient;

impl jimu_probe::TerminalClient for FakeTerminalClient {
    fn stdout_is_terminal(&self) -> bool {
        false
    }

    fn stderr_is_terminal(&self) -> bool {
        false
    }

    fn operator_keys(
        &self,
    ) -> Result<(jimu_probe::OperatorKeys, bool), jimu_probe::InteractionError> {
        Ok((Box::pin(tokio_stream::iter([Ok::<_, jimu_probe::InteractionError>('q')])), false))
    }
}

async fn run_with_argv<const N: usize>(argv: [&str; N]) -> anyhow::Result<String> {
    let args = jimu_probe::Args::try_parse_from(argv)?;
    let settings = args.settings();
    let (command, maybe_fake_args) = args.into_command_and_fake_args()?;
    let hardware_client = match maybe_fake_args {
        Some(fake_args) => jimu_probe::fake_hardware_client(fake_args),
        None => jimu_probe::real_hardware_client(),
    };

    let mut output = Vec::new();
    jimu_probe::run_with_clients(
        command,
        &settings,
        &mut output,
        &FakeTerminalClient,
        hardware_client,
    )
    .await?;
    Ok(String::from_utf8(output)?)
}

#[tokio::test]
async fn encode_prints_wire_frame_without_a_device() -> anyhow::Result<()> {
    let stdout = run_with_argv(["jimu-probe", "encode", "0bff"]).await?;

    assert!(stdout.contains("FB BF 06 0B FF CA ED"), "{stdout}");
    Ok(())
}

#[tokio::test]
async fn encode_decode_classifies_frames() -> anyhow::Result<()> {
    let valid = run_with_argv(["jimu-probe", "encode", "--decode", "fbbf060bffcaed"]).await?;
    let mismatch = run_with_argv(["jimu-probe", "encode", "--decode", "fbbf060bff00ed"]).await?;
    let raw = run_with_argv(["jimu-probe", "encode", "--decode", "0102"]).await?;

    assert!(valid.contains("payload=0B FF"), "{valid}");
    assert!(mismatch.contains("checksum_mismatch"), "{mismatch}");
    assert!(raw.contains("raw"), "{raw}");
    Ok(())
}

#[tokio::test]
async fn encode_rejects_oversized_payload() {
    let payload = "00".repeat(252);

    let error = run_with_argv(["jimu-probe", "encode", payload.as_str()])
        .await
        .expect_err("a 252-byte payload cannot be framed");

    assert!(format!("{error:#}").contains("252"));
}

#[tokio::test]
async fn inspect_prints_gatt_and_selection_from_fake_backend() -> anyhow::Result<()> {
    let stdout = run_with_argv(["jimu-probe", "--fake", "--fake-scan", SCAN, "inspect"]).await?;

    assert!(stdout.contains("JIMU-Robot"), "{stdout}");
    assert!(stdout.contains("GATT table:"), "{stdout}");
    assert!(stdout.contains("Write candidates:"), "{stdout}");
    assert!(stdout.contains("49535343-8841-43f4-a8d4-ecbe34729bb3"), "{stdout}");
    assert!(stdout.contains("49535343-1e4d-4bd9-ba61-23c647249616"), "{stdout}");
    Ok(())
}

#[tokio::test]
async fn inspect_fails_when_no_device_matches() {
    let error = run_with_argv([
        "jimu-probe",
        "--fake",
        "--fake-scan",
        "hci0|AA:BB:CC|Speaker|-43;hci0|DD:EE:FF|-|-50",
        "inspect",
    ])
    .await
    .expect_err("no fixture device carries the filter");

    assert!(format!("{error:#}").contains("`jimu`"));
}

#[tokio::test]
async fn inspect_honours_name_filter() -> anyhow::Result<()> {
    let stdout = run_with_argv([
        "jimu-probe",
        "--name",
        "speak",
        "--fake",
        "--fake-scan",
        SCAN,
        "inspect",
    ])
    .await?;

    assert!(stdout.contains("Speaker"), "{stdout}");
    assert!(!stdout.contains("JIMU-Robot"), "{stdout}");
    Ok(())
}

#[tokio::test]
async fn inspect_applies_fake_discovery_delay() -> anyhow::Result<()> {
    let started_at = Instant::now();
    let _ = run_with_argv([
        "jimu-probe",
        "--fake",
        "--fake-scan",
        SCAN,
        "--fake-discovery-delay",
        "40ms",
        "inspect",
    ])
    .await?;

    assert!(started_at.elapsed() >= Duration::from_millis(40));
    Ok(())
}

#[tokio::test]
async fn send_hex_logs_reply_and_summary() -> anyhow::Result<()> {
    let stdout = run_with_argv([
        "jimu-probe",
        "--fake",
        "--fake-scan",
        SCAN,
        "send",
        "--hex",
        "0bff",
        "--listen",
        "30ms",
    ])
    .await?;

    assert!(stdout.contains("frame=FB BF 06 0B FF CA ED"), "{stdout}");
    assert!(stdout.contains("[0001]"), "{stdout}");
    assert!(stdout.contains("shape=frame"), "{stdout}");
    assert!(stdout.contains("listen window elapsed"), "{stdout}");
    Ok(())
}

#[tokio::test]
async fn send_preset_labels_the_write() -> anyhow::Result<()> {
    let stdout = run_with_argv([
        "jimu-probe",
        "--fake",
        "--fake-scan",
        SCAN,
        "send",
        "2",
        "--listen",
        "10ms",
    ])
    .await?;

    assert!(stdout.contains("[query firmware version]"), "{stdout}");
    Ok(())
}

#[tokio::test]
async fn send_unknown_preset_fails_before_connecting() {
    let error = run_with_argv([
        "jimu-probe",
        "--fake",
        "--fake-scan",
        SCAN,
        "send",
        "z",
    ])
    .await
    .expect_err("no preset is bound to z");

    assert!(format!("{error:#}").contains("no preset is bound to key `z`"));
}

#[tokio::test]
async fn send_fails_when_every_candidate_rejects_the_write() {
    let error = run_with_argv([
        "jimu-probe",
        "--fake",
        "--fake-scan",
        SCAN,
        "--fake-fail-writes",
        "49535343-8841-43f4-a8d4-ecbe34729bb3",
        "send",
        "--hex",
        "0100",
        "--listen",
        "10ms",
    ])
    .await
    .expect_err("the only write candidate always fails");

    assert_eq!(
        "the command was not accepted by any write candidate",
        error.to_string()
    );
}

#[tokio::test]
async fn probe_quits_on_quit_key() -> anyhow::Result<()> {
    let stdout = run_with_argv(["jimu-probe", "--fake", "--fake-scan", SCAN, "probe"]).await?;

    assert!(stdout.contains("subscribed 49535343-1e4d-4bd9-ba61-23c647249616"), "{stdout}");
    assert!(stdout.contains("quit key"), "{stdout}");
    Ok(())
}

#[tokio::test]
async fn send_requires_a_payload_source() {
    let error = run_with_argv(["jimu-probe", "--fake", "--fake-scan", SCAN, "send"])
        .await
        .expect_err("send without a key or --hex has nothing to write");

    assert_eq!("`send` needs either a preset key or --hex", error.to_string());
}

#[test]
fn invalid_scan_fixture_is_rejected_by_the_builder() {
    let result = jimu_probe::FakeArgs::builder().scan_fixture("invalid-record");
    assert!(matches!(
        result,
        Err(jimu_probe::FixtureError::InvalidRecordFieldCount)
    ));
}

#[test]
fn unknown_log_level_is_rejected() {
    let result = jimu_probe::Args::try_parse_from(["jimu-probe", "--log-level", "loud", "probe"]);

    let error = result.expect_err("loud is not a log level");
    assert_eq!(ErrorKind::InvalidValue, error.kind());
}
