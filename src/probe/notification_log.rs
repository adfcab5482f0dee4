use std::fmt;

use tracing::info;

use crate::codec::FrameCodec;
use crate::hw::InboundNotification;
use crate::utils::format_hex;

/// One numbered inbound notification, ready to print.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct NotificationRecord {
    sequence: u32,
    source_uuid: String,
    shape: &'static str,
    value: Vec<u8>,
}

impl NotificationRecord {
    /// Returns the sequence number within the current command context.
    #[must_use]
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Returns the originating characteristic UUID.
    #[must_use]
    pub fn source_uuid(&self) -> &str {
        &self.source_uuid
    }

    /// Returns `frame`, `checksum_mismatch` or `raw`.
    #[must_use]
    pub fn shape(&self) -> &'static str {
        self.shape
    }

    /// Returns the raw payload.
    #[must_use]
    pub fn value(&self) -> &[u8] {
        &self.value
    }
}

impl fmt::Display for NotificationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:04}] {} shape={} raw={}",
            self.sequence,
            self.source_uuid,
            self.shape,
            format_hex(&self.value)
        )
    }
}

/// Numbers inbound notifications relative to the most recent command.
///
/// The counter restarts at 1 whenever [`NotificationLogger::begin_command`] is
/// called, which happens before the write is issued so that replies racing the
/// write are still numbered from 1.
///
/// ```
/// use jimu_probe::{InboundNotification, NotificationLogger};
///
/// let mut logger = NotificationLogger::new();
/// logger.begin_command();
/// let record = logger.record(&InboundNotification::new("ffe1", vec![0x01]));
/// assert_eq!("[0001] ffe1 shape=raw raw=01", record.to_string());
/// ```
#[derive(Debug)]
pub struct NotificationLogger {
    next_sequence: u32,
    total_logged: usize,
}

impl Default for NotificationLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationLogger {
    /// Creates a logger whose first record is numbered 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_sequence: 1,
            total_logged: 0,
        }
    }

    /// Resets the sequence counter ahead of a new command.
    pub fn begin_command(&mut self) {
        self.next_sequence = 1;
    }

    /// Numbers one notification and advances the counter.
    pub fn record(&mut self, notification: &InboundNotification) -> NotificationRecord {
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.saturating_add(1);
        self.total_logged += 1;

        let shape = FrameCodec::decode(notification.value()).shape_label();
        info!(
            sequence,
            source = notification.source_uuid(),
            shape,
            raw = %format_hex(notification.value()),
            "notification"
        );

        NotificationRecord {
            sequence,
            source_uuid: notification.source_uuid().to_string(),
            shape,
            value: notification.value().to_vec(),
        }
    }

    /// Returns how many notifications were logged over the whole session.
    #[must_use]
    pub fn total_logged(&self) -> usize {
        self.total_logged
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn notification(value: &[u8]) -> InboundNotification {
        InboundNotification::new("49535343-1e4d-4bd9-ba61-23c647249616", value.to_vec())
    }

    #[test]
    fn sequence_restarts_for_each_command() {
        let mut logger = NotificationLogger::new();

        logger.begin_command();
        let first = logger.record(&notification(&[0x01]));

        logger.begin_command();
        let second_command: Vec<u32> = (0..3)
            .map(|_| logger.record(&notification(&[0x02])).sequence())
            .collect();

        assert_eq!(1, first.sequence());
        assert_eq!(vec![1, 2, 3], second_command);
        assert_eq!(4, logger.total_logged());
    }

    #[test]
    fn record_renders_zero_padded_line() {
        let mut logger = NotificationLogger::new();
        let record = logger.record(&notification(&[0xFB, 0xBF, 0x06, 0x0B, 0xFF, 0xCA, 0xED]));

        assert_snapshot!(
            record.to_string(),
            @"[0001] 49535343-1e4d-4bd9-ba61-23c647249616 shape=frame raw=FB BF 06 0B FF CA ED"
        );
    }

    #[rstest]
    #[case(&[0xFB, 0xBF, 0x06, 0x0B, 0xFF, 0xCA, 0xED], "frame")]
    #[case(&[0xFB, 0xBF, 0x06, 0x0B, 0xFF, 0x00, 0xED], "checksum_mismatch")]
    #[case(&[0x01, 0x02], "raw")]
    #[case(&[], "raw")]
    fn record_tags_frame_shape(#[case] value: &[u8], #[case] expected: &str) {
        let mut logger = NotificationLogger::new();
        assert_eq!(expected, logger.record(&notification(value)).shape());
    }
}
