use std::str::FromStr;

use crate::error::FixtureError;

/// Hexadecimal bytes supplied on the command line.
#[derive(Debug, Clone, Eq, PartialEq, derive_more::From, derive_more::Into)]
pub(crate) struct HexPayload(Vec<u8>);

impl HexPayload {
    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl FromStr for HexPayload {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        parse_hex(value).map(Self)
    }
}

/// Formats bytes as uppercase hexadecimal pairs separated by spaces.
pub(crate) fn format_hex(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return "<empty>".to_string();
    }

    bytes
        .iter()
        .map(|value| hex::encode_upper([*value]))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Formats an optional advertised signal strength.
pub(crate) fn format_rssi(rssi: Option<i16>) -> String {
    rssi.map_or_else(|| "unknown".to_string(), |value| format!("{value} dBm"))
}

/// Parses hexadecimal bytes, ignoring whitespace between pairs.
pub(crate) fn parse_hex(raw_value: &str) -> Result<Vec<u8>, FixtureError> {
    let cleaned: String = raw_value.chars().filter(|c| !c.is_whitespace()).collect();
    if !cleaned.len().is_multiple_of(2) {
        return Err(FixtureError::InvalidHexLength);
    }

    hex::decode(&cleaned).map_err(|error| FixtureError::InvalidHexByte {
        value: error.to_string(),
    })
}

/// Renders the UTF-8 bytes of a character, used when echoing unrecognised keys.
pub(crate) fn char_bytes(key: char) -> Vec<u8> {
    let mut buffer = [0u8; 4];
    key.encode_utf8(&mut buffer).as_bytes().to_vec()
}
