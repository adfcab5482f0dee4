use std::io;

use anyhow::Result;
use tracing::instrument;

use crate::error::InteractionError;
use crate::hw::{DeviceMatcher, HardwareClient, select_characteristics};
use crate::terminal::TerminalClient;

use super::command::ProbeSettings;
use super::ui::{InspectView, Painter};

/// Executes the `inspect` command.
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
    let session = crate::SessionHandler::new(client)
        .with_matcher(DeviceMatcher::new(settings.name_filter()))
        .connect_first()
        .await?;
    let device = session.device().clone();
    let services = session.services().to_vec();
    session.close().await?;

    let selection = select_characteristics(&services, settings.selection_policy());
    let painter = Painter::new(terminal_client.stdout_is_terminal());
    writeln!(
        out,
        "{}",
        InspectView::new(&device, &services, selection.as_ref(), &painter)
    )?;

    selection
        .map(|_selection| ())
        .map_err(|error| InteractionError::from(error).into())
}
