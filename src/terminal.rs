use std::io::{self, BufRead, IsTerminal, Write};
use std::thread;

use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

use crate::error::InteractionError;
use crate::probe::{OperatorKeys, QUIT_KEY};

/// Terminal capability checks and operator input used by CLI rendering.
pub trait TerminalClient {
    /// Returns whether standard output is attached to an interactive terminal.
    fn stdout_is_terminal(&self) -> bool;

    /// Returns whether standard error is attached to an interactive terminal.
    fn stderr_is_terminal(&self) -> bool;

    /// Opens the stream of operator key presses.
    ///
    /// Returns the stream and whether the terminal was switched to raw mode,
    /// in which case output lines need explicit carriage returns.
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal cannot be prepared for input.
    fn operator_keys(&self) -> Result<(OperatorKeys, bool), InteractionError>;
}

/// Terminal client backed by the process's standard streams.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTerminalClient;

impl TerminalClient for SystemTerminalClient {
    fn stdout_is_terminal(&self) -> bool {
        io::stdout().is_terminal()
    }

    fn stderr_is_terminal(&self) -> bool {
        io::stderr().is_terminal()
    }

    fn operator_keys(&self) -> Result<(OperatorKeys, bool), InteractionError> {
        if io::stdin().is_terminal() {
            Ok((raw_key_stream()?, true))
        } else {
            Ok((line_key_stream(), false))
        }
    }
}

/// Restores cooked mode when dropped.
#[derive(Debug)]
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> Result<Self, InteractionError> {
        enable_raw_mode().map_err(|source| InteractionError::OperatorInput { source })?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(error) = disable_raw_mode() {
            debug!(?error, "failed to restore terminal mode");
        }
    }
}

fn raw_key_stream() -> Result<OperatorKeys, InteractionError> {
    let guard = RawModeGuard::enable()?;
    let keys = EventStream::new().filter_map(move |event| {
        let _raw_mode = &guard;
        match event {
            Ok(Event::Key(key)) => key_to_char(key).map(Ok),
            Ok(_other) => None,
            Err(source) => Some(Err(InteractionError::OperatorInput { source })),
        }
    });
    Ok(Box::pin(keys))
}

/// Feeds piped stdin to the session one character at a time.
fn line_key_stream() -> OperatorKeys {
    let (tx, rx) = mpsc::unbounded_channel();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(source) => {
                    let _closed = tx.send(Err(InteractionError::OperatorInput { source }));
                    return;
                }
            };
            for key in line.chars().filter(|key| !key.is_whitespace()) {
                if tx.send(Ok(key)).is_err() {
                    return;
                }
            }
        }
    });
    Box::pin(UnboundedReceiverStream::new(rx))
}

fn key_to_char(key: KeyEvent) -> Option<char> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Some(QUIT_KEY),
        KeyCode::Char(key) => Some(key),
        KeyCode::Esc => Some(QUIT_KEY),
        _ => None,
    }
}

/// Rewrites `\n` as `\r\n` for terminals in raw mode.
pub(crate) struct CrlfWriter<'a, W: Write> {
    inner: &'a mut W,
}

impl<'a, W: Write> CrlfWriter<'a, W> {
    pub(crate) fn new(inner: &'a mut W) -> Self {
        Self { inner }
    }
}

impl<W: Write> Write for CrlfWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for chunk in buf.split_inclusive(|byte| *byte == b'\n') {
            match chunk.split_last() {
                Some((b'\n', line)) => {
                    self.inner.write_all(line)?;
                    self.inner.write_all(b"\r\n")?;
                }
                _ => self.inner.write_all(chunk)?,
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
