use std::io;

use anyhow::Result;

use crate::codec::FrameCodec;
use crate::terminal::TerminalClient;

use super::command::EncodeArgs;
use super::ui::{FrameView, Painter};

/// Executes the offline `encode` command.
pub(crate) fn run<W>(args: &EncodeArgs, out: &mut W, terminal_client: &dyn TerminalClient) -> Result<()>
where
    W: io::Write,
{
    let painter = Painter::new(terminal_client.stdout_is_terminal());
    let bytes = args.bytes();

    if args.is_decode() {
        let decode = FrameCodec::decode(bytes);
        writeln!(
            out,
            "{}",
            FrameView::Decoded {
                decode: &decode,
                painter: &painter,
            }
        )?;
        return Ok(());
    }

    let frame = FrameCodec::encode(bytes)?;
    writeln!(
        out,
        "{}",
        FrameView::Encoded {
            payload: bytes,
            frame: &frame,
            painter: &painter,
        }
    )?;
    Ok(())
}
