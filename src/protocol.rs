use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};

/// First sync byte of every wire frame.
pub(crate) const FRAME_SYNC_A: u8 = 0xFB;
/// Second sync byte of every wire frame.
pub(crate) const FRAME_SYNC_B: u8 = 0xBF;
/// Trailing sentinel byte of every wire frame.
pub(crate) const FRAME_TERMINATOR: u8 = 0xED;
/// Offset added to the payload length to form the length byte.
pub(crate) const FRAME_LENGTH_OFFSET: usize = 4;
/// Largest payload whose length byte still fits in one byte.
pub(crate) const FRAME_MAX_PAYLOAD_LEN: usize = u8::MAX as usize - FRAME_LENGTH_OFFSET;

/// Default advertised-name substring for JIMU controllers.
pub(crate) const DEFAULT_DEVICE_NAME_FILTER: &str = "jimu";

/// Hyphen-free prefix of the vendor transparent-UART service.
pub(crate) const VENDOR_SERVICE_PREFIX: &str = "49535343";

/// Characteristics that carried commands in earlier capture sessions.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, EnumIter, Display)]
pub enum KnownCharacteristic {
    /// Vendor UART RX characteristic, the primary command sink.
    #[strum(to_string = "uart_rx")]
    UartRx,
    /// Vendor UART write/notify characteristic seen on newer controllers.
    #[strum(to_string = "uart_rx_tx")]
    UartRxTx,
    /// HM-10 style serial characteristic used by some clone boards.
    #[strum(to_string = "serial_ffe1")]
    SerialFfe1,
}

impl KnownCharacteristic {
    /// Characteristic UUID in lowercase hyphenated form.
    #[must_use]
    pub const fn uuid(self) -> &'static str {
        match self {
            Self::UartRx => "49535343-8841-43f4-a8d4-ecbe34729bb3",
            Self::UartRxTx => "49535343-aca3-481c-91ec-d85e28a60318",
            Self::SerialFfe1 => "0000ffe1-0000-1000-8000-00805f9b34fb",
        }
    }
}

/// Returns the built-in write allow-list in preference order.
pub(crate) fn default_known_write_uuids() -> Vec<String> {
    KnownCharacteristic::iter()
        .map(|known| known.uuid().to_string())
        .collect()
}

/// Strips hyphens and lowercases a UUID for prefix comparisons.
pub(crate) fn normalise_uuid(uuid: &str) -> String {
    uuid.chars()
        .filter(|c| *c != '-')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn default_allow_list_preserves_declared_order() {
        assert_eq!(
            vec![
                "49535343-8841-43f4-a8d4-ecbe34729bb3".to_string(),
                "49535343-aca3-481c-91ec-d85e28a60318".to_string(),
                "0000ffe1-0000-1000-8000-00805f9b34fb".to_string(),
            ],
            default_known_write_uuids()
        );
    }

    #[test]
    fn normalise_uuid_strips_hyphens_and_case() {
        assert_eq!(
            "49535343fe7d4ae58fa99fafd205e455",
            normalise_uuid("49535343-FE7D-4AE5-8FA9-9FAFD205E455")
        );
    }

    #[test]
    fn max_payload_fits_length_byte() {
        assert_eq!(251, FRAME_MAX_PAYLOAD_LEN);
    }
}
