use std::time::Duration;

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;

use jimu_probe::{
    FakeArgs, FakeRecorder, InteractionError, KnownCharacteristic, NotificationRecord,
    OperatorKeys, PresetTable, ProbeEvent, ProbeSession, ProbeSettings, RecordedWrite,
    SelectionError, SelectionPolicy, SessionHandler, StopReason, WriteMode,
};

const SCAN: &str = "hci0|AA:BB:CC|JIMU-Robot|-43";
const VENDOR_SERVICE: &str = "49535343-fe7d-4ae5-8fa9-9fafd205e455";
const VENDOR_NOTIFY: &str = "49535343-1e4d-4bd9-ba61-23c647249616";
const SERVO_POSITIONS_FRAME: [u8; 7] = [0xFB, 0xBF, 0x06, 0x0B, 0xFF, 0xCA, 0xED];

struct ScriptedTerminal {
    keys: Vec<char>,
}

impl jimu_probe::TerminalClient for ScriptedTerminal {
    fn stdout_is_terminal(&self) -> bool {
        false
    }

    fn stderr_is_terminal(&self) -> bool {
        false
    }

    fn operator_keys(&self) -> Result<(OperatorKeys, bool), InteractionError> {
        Ok((scripted_keys(&self.keys), false))
    }
}

fn scripted_keys(keys: &[char]) -> OperatorKeys {
    Box::pin(tokio_stream::iter(keys.to_vec().into_iter().map(Ok::<char, InteractionError>)))
}

/// Vendor service where the allow-listed UART RX only takes unconfirmed
/// writes and the RX/TX characteristic takes both writes and notifications.
fn two_candidate_gatt() -> String {
    format!(
        "{VENDOR_SERVICE}={}:write_without_response,{}:write+notify",
        KnownCharacteristic::UartRx.uuid(),
        KnownCharacteristic::UartRxTx.uuid(),
    )
}

async fn start_session(fake_args: FakeArgs) -> anyhow::Result<ProbeSession> {
    let device = SessionHandler::new(jimu_probe::fake_hardware_client(fake_args))
        .connect_first()
        .await?;
    let session = ProbeSession::start(device, &SelectionPolicy::default(), &mut |_event| {}).await?;
    Ok(session)
}

fn collect_records(records: &mut Vec<NotificationRecord>) -> impl FnMut(ProbeEvent<'_>) + '_ {
    move |event| {
        if let ProbeEvent::Notification(record) = event {
            records.push(record.clone());
        }
    }
}

#[tokio::test]
async fn failed_candidate_falls_back_to_next_in_order() -> anyhow::Result<()> {
    let recorder = FakeRecorder::default();
    let fake_args = FakeArgs::builder()
        .scan_fixture(SCAN)?
        .gatt_fixture(&two_candidate_gatt())?
        .failing_writes(KnownCharacteristic::UartRx.uuid())?
        .recorder(recorder.clone())
        .build();
    let mut session = start_session(fake_args).await?;

    let mut failed_attempts = None;
    let delivered = session
        .send(&[0x0B, 0xFF], None, &mut |event| {
            if let ProbeEvent::CommandSent { receipt, .. } = event {
                failed_attempts = Some(receipt.failed_attempts());
            }
        })
        .await;
    session.shutdown().await;

    assert!(delivered);
    assert_eq!(Some(1), failed_attempts);
    assert_eq!(
        vec![
            RecordedWrite {
                uuid: KnownCharacteristic::UartRx.uuid().to_string(),
                payload: SERVO_POSITIONS_FRAME.to_vec(),
                mode: WriteMode::WithoutResponse,
                succeeded: false,
            },
            RecordedWrite {
                uuid: KnownCharacteristic::UartRxTx.uuid().to_string(),
                payload: SERVO_POSITIONS_FRAME.to_vec(),
                mode: WriteMode::WithResponse,
                succeeded: true,
            },
        ],
        recorder.writes()
    );
    Ok(())
}

#[tokio::test]
async fn all_candidates_failing_counts_as_failed_command() -> anyhow::Result<()> {
    let recorder = FakeRecorder::default();
    let failing = format!(
        "{},{}",
        KnownCharacteristic::UartRx.uuid(),
        KnownCharacteristic::UartRxTx.uuid()
    );
    let fake_args = FakeArgs::builder()
        .scan_fixture(SCAN)?
        .gatt_fixture(&two_candidate_gatt())?
        .failing_writes(&failing)?
        .recorder(recorder.clone())
        .build();
    let session = start_session(fake_args).await?;

    let summary = session
        .run_single(&[0x01, 0x00], None, Duration::from_millis(10), &mut |_event| {})
        .await;

    assert_eq!(0, summary.commands_sent());
    assert_eq!(1, summary.commands_failed());
    assert_eq!(0, summary.notifications_logged());
    assert_eq!(2, recorder.writes().len());
    assert!(recorder.closed());
    Ok(())
}

#[tokio::test]
async fn notification_counter_restarts_for_every_command() -> anyhow::Result<()> {
    let fake_args = FakeArgs::builder()
        .scan_fixture(SCAN)?
        .notifications("fbbf060bffcaed,0102")?
        .build();
    let session = start_session(fake_args).await?;
    let presets = PresetTable::builtin();

    let mut records = Vec::new();
    let summary = session
        .run_interactive(
            scripted_keys(&['4', '4', 'q']),
            &presets,
            &mut collect_records(&mut records),
        )
        .await?;

    let numbered: Vec<(u32, &str)> = records
        .iter()
        .map(|record| (record.sequence(), record.shape()))
        .collect();
    assert_eq!(
        vec![(1, "frame"), (2, "raw"), (1, "frame"), (2, "raw")],
        numbered
    );
    assert_eq!(2, summary.commands_sent());
    assert_eq!(4, summary.notifications_logged());
    assert_eq!(StopReason::QuitKey, summary.stop_reason());
    Ok(())
}

#[tokio::test]
async fn unbound_and_help_keys_do_not_write() -> anyhow::Result<()> {
    let recorder = FakeRecorder::default();
    let fake_args = FakeArgs::builder()
        .scan_fixture(SCAN)?
        .recorder(recorder.clone())
        .build();
    let session = start_session(fake_args).await?;
    let presets = PresetTable::builtin();

    let mut unbound = Vec::new();
    let mut listed = 0;
    let summary = session
        .run_interactive(scripted_keys(&['x', '?']), &presets, &mut |event| match event {
            ProbeEvent::UnboundKey(key) => unbound.push(key),
            ProbeEvent::PresetList(_) => listed += 1,
            _ => {}
        })
        .await?;

    assert_eq!(vec!['x'], unbound);
    assert_eq!(1, listed);
    assert_eq!(StopReason::InputClosed, summary.stop_reason());
    assert!(recorder.writes().is_empty());
    Ok(())
}

#[tokio::test]
async fn shutdown_unsubscribes_every_target_before_disconnecting() -> anyhow::Result<()> {
    let recorder = FakeRecorder::default();
    let fake_args = FakeArgs::builder()
        .scan_fixture(SCAN)?
        .gatt_fixture(&format!(
            "{VENDOR_SERVICE}={}:write,{VENDOR_NOTIFY}:notify,{}:notify",
            KnownCharacteristic::UartRx.uuid(),
            KnownCharacteristic::UartRxTx.uuid(),
        ))?
        .recorder(recorder.clone())
        .build();
    let session = start_session(fake_args).await?;

    session
        .run_interactive(scripted_keys(&['q']), &PresetTable::builtin(), &mut |_event| {})
        .await?;

    assert_eq!(recorder.subscribed(), recorder.unsubscribed());
    assert_eq!(2, recorder.unsubscribed().len());
    assert!(recorder.closed());
    Ok(())
}

#[tokio::test]
async fn interrupt_without_key_press_still_shuts_down_in_order() -> anyhow::Result<()> {
    let recorder = FakeRecorder::default();
    let fake_args = FakeArgs::builder()
        .scan_fixture(SCAN)?
        .recorder(recorder.clone())
        .build();
    let session = start_session(fake_args).await?;
    let silent_stdin: OperatorKeys = Box::pin(tokio_stream::pending());

    let summary = session
        .run_interactive_until(
            silent_stdin,
            &PresetTable::builtin(),
            std::future::ready(()),
            &mut |_event| {},
        )
        .await?;

    assert_eq!(StopReason::Interrupted, summary.stop_reason());
    assert_eq!(vec![VENDOR_NOTIFY.to_string()], recorder.unsubscribed());
    assert!(recorder.closed());
    Ok(())
}

#[tokio::test]
async fn refused_subscription_is_reported_and_skipped() -> anyhow::Result<()> {
    let recorder = FakeRecorder::default();
    let fake_args = FakeArgs::builder()
        .scan_fixture(SCAN)?
        .gatt_fixture(&format!(
            "{VENDOR_SERVICE}={VENDOR_NOTIFY}:notify,{}:write+notify",
            KnownCharacteristic::UartRxTx.uuid(),
        ))?
        .failing_subscribes(VENDOR_NOTIFY)?
        .notifications("fbbf060bffcaed")?
        .recorder(recorder.clone())
        .build();
    let device = SessionHandler::new(jimu_probe::fake_hardware_client(fake_args))
        .connect_first()
        .await?;

    let mut refused = Vec::new();
    let session = ProbeSession::start(device, &SelectionPolicy::default(), &mut |event| {
        if let ProbeEvent::SubscribeFailed { characteristic, .. } = event {
            refused.push(characteristic.uuid().to_string());
        }
    })
    .await?;
    let mut records = Vec::new();
    let summary = session
        .run_interactive(
            scripted_keys(&['4', 'q']),
            &PresetTable::builtin(),
            &mut collect_records(&mut records),
        )
        .await?;

    let working = KnownCharacteristic::UartRxTx.uuid().to_string();
    assert_eq!(vec![VENDOR_NOTIFY.to_string()], refused);
    assert_eq!(vec![working.clone()], recorder.subscribed());
    assert_eq!(vec![working.clone()], recorder.unsubscribed());
    assert_eq!(1, records.len());
    assert_eq!(working, records[0].source_uuid());
    assert_eq!(1, summary.notifications_logged());
    assert!(recorder.closed());
    Ok(())
}

#[tokio::test]
async fn selection_failure_disconnects_without_writing() -> anyhow::Result<()> {
    let recorder = FakeRecorder::default();
    let fake_args = FakeArgs::builder()
        .scan_fixture(SCAN)?
        .gatt_fixture(&format!(
            "{VENDOR_SERVICE}={}:write",
            KnownCharacteristic::UartRx.uuid()
        ))?
        .recorder(recorder.clone())
        .build();

    let result = start_session(fake_args).await;

    let error = result.expect_err("a peripheral without notify targets cannot be probed");
    assert_matches!(
        error.downcast_ref::<InteractionError>(),
        Some(InteractionError::Selection(SelectionError::NoNotifyTargets))
    );
    assert!(recorder.writes().is_empty());
    assert!(recorder.subscribed().is_empty());
    assert!(recorder.closed());
    Ok(())
}

#[tokio::test]
async fn probe_command_prints_numbered_replies() -> anyhow::Result<()> {
    let fake_args = FakeArgs::builder().scan_fixture(SCAN)?.build();
    let mut out = Vec::new();

    jimu_probe::run_with_clients(
        jimu_probe::Command::Probe,
        &ProbeSettings::default(),
        &mut out,
        &ScriptedTerminal {
            keys: vec!['4', 'q'],
        },
        jimu_probe::fake_hardware_client(fake_args),
    )
    .await?;

    let stdout = String::from_utf8(out)?;
    assert!(
        stdout.contains("tx [read all servo positions] 49535343-8841-43f4-a8d4-ecbe34729bb3"),
        "{stdout}"
    );
    assert!(
        stdout.contains(
            "[0001] 49535343-1e4d-4bd9-ba61-23c647249616 shape=frame raw=FB BF 06 0B 00 CB ED"
        ),
        "{stdout}"
    );
    assert!(stdout.contains("quit key"), "{stdout}");
    Ok(())
}
