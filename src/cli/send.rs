use std::io;

use anyhow::{Result, bail};
use tracing::instrument;

use crate::codec::FrameCodec;
use crate::error::{CliConfigError, ProtocolError};
use crate::hw::{DeviceMatcher, HardwareClient};
use crate::probe::{PresetTable, ProbeSession};
use crate::terminal::TerminalClient;

use super::command::{ProbeSettings, SendArgs};
use super::probe::EventPrinter;
use super::ui::{Painter, ProbeReadyView, SessionSummaryView};

#[derive(Debug)]
struct OutgoingCommand {
    payload: Vec<u8>,
    label: Option<String>,
}

/// Executes the non-interactive `send` command.
#[instrument(skip_all, level = "info", fields(listen = ?args.listen()))]
pub(crate) async fn run<W>(
    client: Box<dyn HardwareClient>,
    settings: &ProbeSettings,
    args: &SendArgs,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
) -> Result<()>
where
    W: io::Write,
{
    let command = match (args.hex(), args.key()) {
        (Some(payload), _) => OutgoingCommand {
            payload: payload.to_vec(),
            label: None,
        },
        (None, Some(key)) => preset_command(settings, key)?,
        (None, None) => return Err(CliConfigError::MissingSendPayload.into()),
    };
    FrameCodec::encode(&command.payload).map_err(ProtocolError::from)?;

    let painter = Painter::new(terminal_client.stdout_is_terminal());
    let device = crate::SessionHandler::new(client)
        .with_matcher(DeviceMatcher::new(settings.name_filter()))
        .connect_first()
        .await?;
    writeln!(out, "{}", ProbeReadyView::new(device.device(), false, &painter))?;

    let mut printer = EventPrinter::new(&mut *out, &painter);
    let started = ProbeSession::start(device, settings.selection_policy(), &mut |event| {
        printer.print(event);
    })
    .await;
    let summary = match started {
        Ok(session) => {
            session
                .run_single(
                    &command.payload,
                    command.label.as_deref(),
                    args.listen(),
                    &mut |event| printer.print(event),
                )
                .await
        }
        Err(error) => {
            printer.finish()?;
            return Err(error.into());
        }
    };
    printer.finish()?;

    writeln!(out)?;
    writeln!(out, "{}", SessionSummaryView::new(&summary, &painter))?;

    if summary.commands_failed() > 0 {
        bail!("the command was not accepted by any write candidate");
    }
    Ok(())
}

fn preset_command(settings: &ProbeSettings, key: char) -> Result<OutgoingCommand, ProtocolError> {
    let presets = PresetTable::load(settings.presets_path())?;
    let preset = presets.require(key)?;
    Ok(OutgoingCommand {
        payload: preset.payload().to_vec(),
        label: Some(preset.label().to_string()),
    })
}
