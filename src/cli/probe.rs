use std::io;

use anyhow::Result;
use tracing::instrument;

use crate::hw::{DeviceMatcher, HardwareClient};
use crate::probe::{OperatorKeys, PresetTable, ProbeEvent, ProbeSession};
use crate::terminal::{CrlfWriter, TerminalClient};

use super::command::ProbeSettings;
use super::ui::{Painter, ProbeEventView, ProbeReadyView, SessionSummaryView};

/// Writes probe events as they happen, keeping the first write error.
pub(crate) struct EventPrinter<'a, W: io::Write> {
    out: &'a mut W,
    painter: &'a Painter,
    write_error: Option<io::Error>,
}

impl<'a, W: io::Write> EventPrinter<'a, W> {
    pub(crate) fn new(out: &'a mut W, painter: &'a Painter) -> Self {
        Self {
            out,
            painter,
            write_error: None,
        }
    }

    pub(crate) fn print(&mut self, event: ProbeEvent<'_>) {
        if self.write_error.is_some() {
            return;
        }
        if let Err(error) = writeln!(self.out, "{}", ProbeEventView::new(&event, self.painter)) {
            self.write_error = Some(error);
        }
    }

    pub(crate) fn finish(self) -> io::Result<()> {
        match self.write_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Executes the interactive `probe` command.
#[instrument(skip_all, level = "info", fields(filter = settings.name_filter()))]
pub(crate) async fn run<W>(
    client: Box<dyn HardwareClient>,
    settings: &ProbeSettings,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
) -> Result<()>
where
    W: io::Write,
{
    let painter = Painter::new(terminal_client.stdout_is_terminal());
    let presets = PresetTable::load(settings.presets_path())?;

    let device = crate::SessionHandler::new(client)
        .with_matcher(DeviceMatcher::new(settings.name_filter()))
        .connect_first()
        .await?;
    writeln!(out, "{}", ProbeReadyView::new(device.device(), true, &painter))?;

    let mut printer = EventPrinter::new(&mut *out, &painter);
    let session = ProbeSession::start(device, settings.selection_policy(), &mut |event| {
        printer.print(event);
    })
    .await?;
    printer.finish()?;

    let (keys, raw_mode) = match terminal_client.operator_keys() {
        Ok(input) => input,
        Err(error) => {
            session.shutdown().await;
            return Err(error.into());
        }
    };

    if raw_mode {
        let mut out = CrlfWriter::new(out);
        drive(session, keys, &presets, &mut out, &painter).await
    } else {
        drive(session, keys, &presets, out, &painter).await
    }
}

async fn drive<W>(
    session: ProbeSession,
    keys: OperatorKeys,
    presets: &PresetTable,
    out: &mut W,
    painter: &Painter,
) -> Result<()>
where
    W: io::Write,
{
    let mut printer = EventPrinter::new(&mut *out, painter);
    let summary = session
        .run_interactive(keys, presets, &mut |event| printer.print(event))
        .await;
    printer.finish()?;
    let summary = summary?;

    writeln!(out)?;
    writeln!(out, "{}", SessionSummaryView::new(&summary, painter))?;
    Ok(())
}
