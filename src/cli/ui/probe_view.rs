use std::fmt::{self, Display, Formatter};

use crate::codec::FrameDecode;
use crate::hw::FoundDevice;
use crate::probe::{
    HELP_KEY, NotificationRecord, PresetTable, ProbeEvent, QUIT_KEY, SessionSummary,
};
use crate::utils::{char_bytes, format_hex};

use super::device_view::DeviceView;
use super::painter::Painter;
use super::table::Table;

/// Renders the connected device ahead of the probe log.
pub(crate) struct ProbeReadyView<'a> {
    device: &'a FoundDevice,
    interactive: bool,
    painter: &'a Painter,
}

impl<'a> ProbeReadyView<'a> {
    pub(crate) fn new(device: &'a FoundDevice, interactive: bool, painter: &'a Painter) -> Self {
        Self {
            device,
            interactive,
            painter,
        }
    }
}

impl Display for ProbeReadyView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.painter.heading("Connected device:"))?;
        write!(f, "\n{}", DeviceView::new(self.device, self.painter))?;
        if self.interactive {
            write!(
                f,
                "\n{}",
                self.painter.muted(format!(
                    "press a preset key to send, `{HELP_KEY}` for presets, `{QUIT_KEY}` to quit"
                ))
            )?;
        }
        Ok(())
    }
}

/// Renders one probe log line.
pub(crate) struct ProbeEventView<'a> {
    event: &'a ProbeEvent<'a>,
    painter: &'a Painter,
}

impl<'a> ProbeEventView<'a> {
    pub(crate) fn new(event: &'a ProbeEvent<'a>, painter: &'a Painter) -> Self {
        Self { event, painter }
    }
}

impl Display for ProbeEventView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let painter = self.painter;
        match self.event {
            ProbeEvent::Subscribed(characteristic) => write!(
                f,
                "{} {}",
                painter.muted("subscribed"),
                painter.value(characteristic.uuid())
            ),
            ProbeEvent::SubscribeFailed {
                characteristic,
                error,
            } => write!(
                f,
                "{} {}: {error}",
                painter.warning("subscribe failed"),
                characteristic.uuid()
            ),
            ProbeEvent::CommandSent { label, receipt } => {
                write!(
                    f,
                    "{} {}{} mode={} frame={}",
                    painter.success("tx"),
                    label_prefix(*label),
                    painter.value(receipt.characteristic().uuid()),
                    receipt.mode(),
                    painter.value(format_hex(receipt.frame()))
                )?;
                if receipt.failed_attempts() > 0 {
                    write!(
                        f,
                        " {}",
                        painter.muted(format!(
                            "(after {} failed candidate(s))",
                            receipt.failed_attempts()
                        ))
                    )?;
                }
                Ok(())
            }
            ProbeEvent::CommandFailed { label, error } => write!(
                f,
                "{} {}{error}",
                painter.warning("tx failed"),
                label_prefix(*label)
            ),
            ProbeEvent::Notification(record) => {
                write!(f, "{}", NotificationView::new(record, painter))
            }
            ProbeEvent::PresetList(presets) => write!(f, "{}", PresetListView::new(presets, painter)),
            ProbeEvent::UnboundKey(key) => write!(
                f,
                "{} {:?} bytes={}",
                painter.warning("unbound key"),
                key,
                format_hex(&char_bytes(*key))
            ),
        }
    }
}

fn label_prefix(label: Option<&str>) -> String {
    label.map(|label| format!("[{label}] ")).unwrap_or_default()
}

/// Renders a numbered notification.
pub(crate) struct NotificationView<'a> {
    record: &'a NotificationRecord,
    painter: &'a Painter,
}

impl<'a> NotificationView<'a> {
    pub(crate) fn new(record: &'a NotificationRecord, painter: &'a Painter) -> Self {
        Self { record, painter }
    }
}

impl Display for NotificationView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} shape={} raw={}",
            self.painter.heading(format!("[{:04}]", self.record.sequence())),
            self.painter.muted(self.record.source_uuid()),
            self.record.shape(),
            self.painter.value(format_hex(self.record.value()))
        )
    }
}

/// Renders the preset table.
pub(crate) struct PresetListView<'a> {
    presets: &'a PresetTable,
    painter: &'a Painter,
}

impl<'a> PresetListView<'a> {
    pub(crate) fn new(presets: &'a PresetTable, painter: &'a Painter) -> Self {
        Self { presets, painter }
    }
}

impl Display for PresetListView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let rows = self
            .presets
            .iter()
            .map(|preset| {
                vec![
                    self.painter.value(preset.key().to_string()),
                    preset.label().to_string(),
                    format_hex(preset.payload()),
                ]
            })
            .collect();
        write!(f, "{}", self.painter.heading("Presets:"))?;
        write!(f, "\n{}", Table::grid(["key", "label", "payload"], rows))
    }
}

/// Renders the end-of-session totals.
pub(crate) struct SessionSummaryView<'a> {
    summary: &'a SessionSummary,
    painter: &'a Painter,
}

impl<'a> SessionSummaryView<'a> {
    pub(crate) fn new(summary: &'a SessionSummary, painter: &'a Painter) -> Self {
        Self { summary, painter }
    }
}

impl Display for SessionSummaryView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let failed = self.summary.commands_failed().to_string();
        let table = Table::key_value(
            self.painter,
            vec![
                (
                    "commands_sent",
                    self.painter.value(self.summary.commands_sent().to_string()),
                ),
                (
                    "commands_failed",
                    if self.summary.commands_failed() > 0 {
                        self.painter.warning(failed)
                    } else {
                        self.painter.value(failed)
                    },
                ),
                (
                    "notifications_logged",
                    self.painter
                        .value(self.summary.notifications_logged().to_string()),
                ),
                (
                    "stop_reason",
                    self.painter.value(self.summary.stop_reason().to_string()),
                ),
            ],
        );
        write!(f, "{}", self.painter.heading("Session summary:"))?;
        write!(f, "\n{table}")
    }
}

/// Renders an encoded frame or a frame classification.
pub(crate) enum FrameView<'a> {
    Encoded {
        payload: &'a [u8],
        frame: &'a [u8],
        painter: &'a Painter,
    },
    Decoded {
        decode: &'a FrameDecode<'a>,
        painter: &'a Painter,
    },
}

impl Display for FrameView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encoded {
                payload,
                frame,
                painter,
            } => write!(
                f,
                "{}",
                Table::key_value(
                    painter,
                    vec![
                        ("payload", painter.value(format_hex(payload))),
                        ("frame", painter.value(format_hex(frame))),
                    ],
                )
            ),
            Self::Decoded { decode, painter } => {
                let detail = match decode {
                    FrameDecode::Valid(frame) => format!(
                        "length={} payload={} checksum={:02X}",
                        frame.length(),
                        format_hex(frame.payload()),
                        frame.checksum()
                    ),
                    FrameDecode::ChecksumMismatch { declared, computed } => {
                        format!("declared={declared:02X} computed={computed:02X}")
                    }
                    FrameDecode::Malformed(reason) => reason.to_string(),
                };
                let shape = match decode {
                    FrameDecode::Valid(_) => painter.success(decode.shape_label()),
                    _ => painter.warning(decode.shape_label()),
                };
                write!(
                    f,
                    "{}",
                    Table::key_value(painter, vec![("shape", shape), ("detail", detail)])
                )
            }
        }
    }
}
