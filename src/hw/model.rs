use std::fmt;
use std::str::FromStr;

use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

use crate::error::FixtureError;

/// A discovered BLE peripheral that matched the name filter.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FoundDevice {
    adapter_name: String,
    device_id: String,
    local_name: Option<String>,
    rssi: Option<i16>,
}

impl FoundDevice {
    /// Creates a new discovered-device record.
    pub(crate) fn new(
        adapter_name: String,
        device_id: String,
        local_name: Option<String>,
        rssi: Option<i16>,
    ) -> Self {
        Self {
            adapter_name,
            device_id,
            local_name,
            rssi,
        }
    }

    /// Returns the adapter name used to discover this device.
    #[must_use]
    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    /// Returns the backend-specific device identifier.
    #[must_use]
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Returns the advertised local name, if present.
    #[must_use]
    pub fn local_name(&self) -> Option<&str> {
        self.local_name.as_deref()
    }

    /// Returns the latest observed RSSI value, if present.
    #[must_use]
    pub fn rssi(&self) -> Option<i16> {
        self.rssi
    }
}

/// One GATT characteristic operation.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, EnumIter, EnumString, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Capability {
    Read,
    Write,
    WriteWithoutResponse,
    Notify,
    Indicate,
}

impl Capability {
    const fn bit(self) -> u8 {
        match self {
            Self::Read => 1 << 0,
            Self::Write => 1 << 1,
            Self::WriteWithoutResponse => 1 << 2,
            Self::Notify => 1 << 3,
            Self::Indicate => 1 << 4,
        }
    }
}

/// Set of operations a characteristic supports, fixed at discovery time.
///
/// ```
/// use jimu_probe::{Capabilities, Capability};
///
/// let caps = Capabilities::from_iter([Capability::Write, Capability::Notify]);
/// assert!(caps.can_write());
/// assert!(caps.can_notify());
/// assert!(!caps.contains(Capability::Read));
/// ```
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash)]
pub struct Capabilities(u8);

impl Capabilities {
    /// An empty capability set.
    pub const NONE: Self = Self(0);

    /// Returns a copy of the set with one more capability.
    #[must_use]
    pub fn with(self, capability: Capability) -> Self {
        Self(self.0 | capability.bit())
    }

    /// Returns whether the set contains one capability.
    #[must_use]
    pub fn contains(self, capability: Capability) -> bool {
        self.0 & capability.bit() != 0
    }

    /// Returns whether either write flavour is supported.
    #[must_use]
    pub fn can_write(self) -> bool {
        self.contains(Capability::Write) || self.contains(Capability::WriteWithoutResponse)
    }

    /// Returns whether write-without-response is the only write flavour.
    #[must_use]
    pub fn only_write_without_response(self) -> bool {
        self.contains(Capability::WriteWithoutResponse) && !self.contains(Capability::Write)
    }

    /// Returns whether the characteristic pushes notifications.
    ///
    /// Indicate-only characteristics do not qualify.
    #[must_use]
    pub fn can_notify(self) -> bool {
        self.contains(Capability::Notify)
    }

    /// Iterates the contained capabilities in declaration order.
    pub fn iter(self) -> impl Iterator<Item = Capability> {
        Capability::iter().filter(move |capability| self.contains(*capability))
    }
}

impl FromIterator<Capability> for Capabilities {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        iter.into_iter().fold(Self::NONE, Self::with)
    }
}

impl FromStr for Capabilities {
    type Err = FixtureError;

    /// Parses `+`-separated capability labels such as `write+notify`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        value
            .split('+')
            .map(str::trim)
            .filter(|label| !label.is_empty())
            .map(|label| {
                Capability::from_str(label).map_err(|_unknown| FixtureError::UnknownCapability {
                    value: label.to_string(),
                })
            })
            .collect()
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return write!(f, "none");
        }
        let labels = self.iter().map(|c| c.to_string()).collect::<Vec<_>>();
        write!(f, "{}", labels.join(","))
    }
}

/// A characteristic discovered on a connected peripheral.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CharacteristicInfo {
    uuid: String,
    service_uuid: String,
    capabilities: Capabilities,
}

impl CharacteristicInfo {
    /// Creates a characteristic description. UUIDs are stored lowercase.
    pub fn new(uuid: &str, service_uuid: &str, capabilities: Capabilities) -> Self {
        Self {
            uuid: uuid.to_ascii_lowercase(),
            service_uuid: service_uuid.to_ascii_lowercase(),
            capabilities,
        }
    }

    /// Returns the characteristic UUID.
    #[must_use]
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// Returns the UUID of the owning service.
    #[must_use]
    pub fn service_uuid(&self) -> &str {
        &self.service_uuid
    }

    /// Returns the capability set.
    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }
}

/// A GATT service with its characteristics in discovery order.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ServiceInfo {
    uuid: String,
    characteristics: Vec<CharacteristicInfo>,
}

impl ServiceInfo {
    /// Creates a service description.
    pub fn new(uuid: &str, characteristics: Vec<CharacteristicInfo>) -> Self {
        Self {
            uuid: uuid.to_ascii_lowercase(),
            characteristics,
        }
    }

    /// Returns the service UUID.
    #[must_use]
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// Returns all characteristics in this service.
    #[must_use]
    pub fn characteristics(&self) -> &[CharacteristicInfo] {
        &self.characteristics
    }
}

/// One inbound notification tagged with its source characteristic.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct InboundNotification {
    source_uuid: String,
    value: Vec<u8>,
}

impl InboundNotification {
    /// Creates an inbound notification.
    #[must_use]
    pub fn new(source_uuid: impl Into<String>, value: Vec<u8>) -> Self {
        Self {
            source_uuid: source_uuid.into(),
            value,
        }
    }

    /// Returns the originating characteristic UUID.
    #[must_use]
    pub fn source_uuid(&self) -> &str {
        &self.source_uuid
    }

    /// Returns the raw payload.
    #[must_use]
    pub fn value(&self) -> &[u8] {
        &self.value
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("write", true, false)]
    #[case("write_without_response", true, false)]
    #[case("notify", false, true)]
    #[case("indicate", false, false)]
    #[case("notify+indicate", false, true)]
    #[case("read", false, false)]
    #[case("write+notify", true, true)]
    fn capability_labels_parse_into_queries(
        #[case] labels: &str,
        #[case] can_write: bool,
        #[case] can_notify: bool,
    ) {
        let capabilities: Capabilities = labels.parse().expect("labels should parse");
        assert_eq!(can_write, capabilities.can_write());
        assert_eq!(can_notify, capabilities.can_notify());
    }

    #[test]
    fn unknown_capability_label_is_rejected() {
        assert_matches!(
            "broadcast".parse::<Capabilities>(),
            Err(FixtureError::UnknownCapability { value }) if value == "broadcast"
        );
    }

    #[test]
    fn only_write_without_response_requires_absence_of_confirmed_write() {
        let unconfirmed = Capabilities::from_iter([Capability::WriteWithoutResponse]);
        let both =
            Capabilities::from_iter([Capability::WriteWithoutResponse, Capability::Write]);
        assert!(unconfirmed.only_write_without_response());
        assert!(!both.only_write_without_response());
    }

    #[test]
    fn capabilities_display_in_declaration_order() {
        let capabilities = Capabilities::from_iter([Capability::Notify, Capability::Read]);
        assert_eq!("read,notify", capabilities.to_string());
        assert_eq!("none", Capabilities::NONE.to_string());
    }

    #[test]
    fn characteristic_uuids_are_lowercased() {
        let characteristic = CharacteristicInfo::new(
            "49535343-8841-43F4-A8D4-ECBE34729BB3",
            "49535343-FE7D-4AE5-8FA9-9FAFD205E455",
            Capabilities::NONE,
        );
        assert_eq!("49535343-8841-43f4-a8d4-ecbe34729bb3", characteristic.uuid());
        assert_eq!(
            "49535343-fe7d-4ae5-8fa9-9fafd205e455",
            characteristic.service_uuid()
        );
    }
}
