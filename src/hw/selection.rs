use std::collections::HashSet;

use bon::Builder;
use tracing::{debug, instrument};

use super::model::{CharacteristicInfo, ServiceInfo};
use crate::error::SelectionError;
use crate::protocol::{self, VENDOR_SERVICE_PREFIX};

/// Inputs that steer characteristic selection.
#[derive(Debug, Clone, Eq, PartialEq, Builder)]
pub struct SelectionPolicy {
    /// Known-good write characteristic UUIDs in preference order.
    #[builder(default = protocol::default_known_write_uuids())]
    known_write_uuids: Vec<String>,
    /// Hyphen-free prefix identifying the vendor service.
    #[builder(into, default = VENDOR_SERVICE_PREFIX.to_string())]
    vendor_prefix: String,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl SelectionPolicy {
    /// Returns the known-good write UUIDs in preference order.
    #[must_use]
    pub fn known_write_uuids(&self) -> &[String] {
        &self.known_write_uuids
    }

    /// Returns the vendor service prefix.
    #[must_use]
    pub fn vendor_prefix(&self) -> &str {
        &self.vendor_prefix
    }
}

/// Characteristics chosen for one connection. Built once and not mutated.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CharacteristicSelection {
    target_service: Option<String>,
    write_candidates: Vec<CharacteristicInfo>,
    notify_targets: Vec<CharacteristicInfo>,
}

impl CharacteristicSelection {
    /// Returns the UUID of the vendor-prefixed service, if one was found.
    #[must_use]
    pub fn target_service(&self) -> Option<&str> {
        self.target_service.as_deref()
    }

    /// Returns write candidates in the order they should be attempted.
    #[must_use]
    pub fn write_candidates(&self) -> &[CharacteristicInfo] {
        &self.write_candidates
    }

    /// Returns the characteristics to subscribe to.
    #[must_use]
    pub fn notify_targets(&self) -> &[CharacteristicInfo] {
        &self.notify_targets
    }
}

/// Partitions discovered characteristics into write candidates and notify targets.
///
/// Write candidates are ranked in three passes: the known-good allow-list in
/// listed order, then writable characteristics of the vendor service, then any
/// other writable characteristic. A characteristic appears at most once.
/// Notify targets come from the vendor service when it has any, otherwise from
/// the whole peripheral.
///
/// # Errors
///
/// Returns an error when no write candidate or no notify target exists.
#[instrument(skip_all, level = "debug", fields(service_count = services.len()))]
pub fn select_characteristics(
    services: &[ServiceInfo],
    policy: &SelectionPolicy,
) -> Result<CharacteristicSelection, SelectionError> {
    let all: Vec<&CharacteristicInfo> = services
        .iter()
        .flat_map(|service| service.characteristics())
        .collect();
    let target_service = find_target_service(services, policy.vendor_prefix());

    let write_candidates = rank_write_candidates(&all, target_service, policy);
    if write_candidates.is_empty() {
        return Err(SelectionError::NoWriteCandidates);
    }

    let notify_targets = select_notify_targets(&all, target_service);
    if notify_targets.is_empty() {
        return Err(SelectionError::NoNotifyTargets);
    }

    debug!(
        write_candidates = write_candidates.len(),
        notify_targets = notify_targets.len(),
        target_service = ?target_service.map(ServiceInfo::uuid),
        "selected characteristics"
    );

    Ok(CharacteristicSelection {
        target_service: target_service.map(|service| service.uuid().to_string()),
        write_candidates,
        notify_targets,
    })
}

fn find_target_service<'a>(services: &'a [ServiceInfo], prefix: &str) -> Option<&'a ServiceInfo> {
    let prefix = protocol::normalise_uuid(prefix);
    services
        .iter()
        .find(|service| protocol::normalise_uuid(service.uuid()).starts_with(&prefix))
}

fn rank_write_candidates(
    all: &[&CharacteristicInfo],
    target_service: Option<&ServiceInfo>,
    policy: &SelectionPolicy,
) -> Vec<CharacteristicInfo> {
    let mut ranked = Vec::new();
    let mut seen = HashSet::new();
    let mut push = |characteristic: &CharacteristicInfo| {
        if seen.insert(characteristic.uuid().to_string()) {
            ranked.push(characteristic.clone());
        }
    };

    for known in policy.known_write_uuids() {
        if let Some(characteristic) = all.iter().find(|characteristic| {
            characteristic.uuid().eq_ignore_ascii_case(known)
                && characteristic.capabilities().can_write()
        }) {
            push(characteristic);
        }
    }

    if let Some(service) = target_service {
        service
            .characteristics()
            .iter()
            .filter(|characteristic| characteristic.capabilities().can_write())
            .for_each(&mut push);
    }

    all.iter()
        .filter(|characteristic| characteristic.capabilities().can_write())
        .for_each(|characteristic| push(characteristic));

    ranked
}

fn select_notify_targets(
    all: &[&CharacteristicInfo],
    target_service: Option<&ServiceInfo>,
) -> Vec<CharacteristicInfo> {
    let in_service: Vec<CharacteristicInfo> = target_service
        .map(|service| {
            service
                .characteristics()
                .iter()
                .filter(|characteristic| characteristic.capabilities().can_notify())
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    if !in_service.is_empty() {
        return in_service;
    }

    let mut seen = HashSet::new();
    all.iter()
        .filter(|characteristic| characteristic.capabilities().can_notify())
        .filter(|characteristic| seen.insert(characteristic.uuid().to_string()))
        .map(|characteristic| (*characteristic).clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;
    use crate::hw::Capabilities;
    use crate::protocol::KnownCharacteristic;

    const VENDOR_SERVICE: &str = "49535343-fe7d-4ae5-8fa9-9fafd205e455";
    const VENDOR_NOTIFY: &str = "49535343-1e4d-4bd9-ba61-23c647249616";
    const OTHER_SERVICE: &str = "0000180a-0000-1000-8000-00805f9b34fb";
    const OTHER_WRITE: &str = "00002a99-0000-1000-8000-00805f9b34fb";
    const OTHER_NOTIFY: &str = "00002a37-0000-1000-8000-00805f9b34fb";
    const VENDOR_EXTRA_WRITE: &str = "49535343-6daa-4d02-abf6-19569aca69fe";

    fn characteristic(uuid: &str, service: &str, capabilities: &str) -> CharacteristicInfo {
        let capabilities: Capabilities = capabilities.parse().expect("test capabilities");
        CharacteristicInfo::new(uuid, service, capabilities)
    }

    fn service(uuid: &str, characteristics: &[(&str, &str)]) -> ServiceInfo {
        ServiceInfo::new(
            uuid,
            characteristics
                .iter()
                .map(|(char_uuid, caps)| characteristic(char_uuid, uuid, caps))
                .collect(),
        )
    }

    fn uuids(characteristics: &[CharacteristicInfo]) -> Vec<&str> {
        characteristics.iter().map(CharacteristicInfo::uuid).collect()
    }

    #[test]
    fn known_write_uuid_is_ranked_first_regardless_of_discovery_order() {
        let services = vec![
            service(OTHER_SERVICE, &[(OTHER_WRITE, "write"), (OTHER_NOTIFY, "notify")]),
            service(
                VENDOR_SERVICE,
                &[
                    (VENDOR_EXTRA_WRITE, "write"),
                    (KnownCharacteristic::UartRx.uuid(), "write_without_response"),
                    (VENDOR_NOTIFY, "notify"),
                ],
            ),
        ];

        let selection = select_characteristics(&services, &SelectionPolicy::default())
            .expect("selection should succeed");

        assert_eq!(
            vec![
                KnownCharacteristic::UartRx.uuid(),
                VENDOR_EXTRA_WRITE,
                OTHER_WRITE
            ],
            uuids(selection.write_candidates())
        );
        assert_eq!(Some(VENDOR_SERVICE), selection.target_service());
    }

    #[test]
    fn allow_list_order_wins_over_discovery_order() {
        let services = vec![service(
            VENDOR_SERVICE,
            &[
                (KnownCharacteristic::SerialFfe1.uuid(), "write"),
                (KnownCharacteristic::UartRxTx.uuid(), "write+notify"),
                (KnownCharacteristic::UartRx.uuid(), "write"),
            ],
        )];

        let selection = select_characteristics(&services, &SelectionPolicy::default())
            .expect("selection should succeed");

        assert_eq!(
            vec![
                KnownCharacteristic::UartRx.uuid(),
                KnownCharacteristic::UartRxTx.uuid(),
                KnownCharacteristic::SerialFfe1.uuid(),
            ],
            uuids(selection.write_candidates())
        );
    }

    #[test]
    fn known_uuid_without_write_capability_is_not_promoted() {
        let services = vec![service(
            OTHER_SERVICE,
            &[
                (KnownCharacteristic::UartRx.uuid(), "read+notify"),
                (OTHER_WRITE, "write"),
            ],
        )];

        let selection = select_characteristics(&services, &SelectionPolicy::default())
            .expect("selection should succeed");

        assert_eq!(vec![OTHER_WRITE], uuids(selection.write_candidates()));
    }

    #[test]
    fn duplicates_across_passes_appear_once() {
        let services = vec![
            service(
                VENDOR_SERVICE,
                &[(KnownCharacteristic::UartRx.uuid(), "write"), (VENDOR_NOTIFY, "notify")],
            ),
            service(OTHER_SERVICE, &[(KnownCharacteristic::UartRx.uuid(), "write")]),
        ];

        let selection = select_characteristics(&services, &SelectionPolicy::default())
            .expect("selection should succeed");

        assert_eq!(
            vec![KnownCharacteristic::UartRx.uuid()],
            uuids(selection.write_candidates())
        );
    }

    #[rstest]
    #[case("49535343", Some(VENDOR_SERVICE))]
    #[case("4953-5343-FE7D", Some(VENDOR_SERVICE))]
    #[case("0000180a", Some(OTHER_SERVICE))]
    #[case("deadbeef", None)]
    fn target_service_matches_normalised_prefix(
        #[case] prefix: &str,
        #[case] expected: Option<&str>,
    ) {
        let services = vec![
            service(OTHER_SERVICE, &[(OTHER_WRITE, "write"), (OTHER_NOTIFY, "notify")]),
            service(VENDOR_SERVICE, &[(VENDOR_NOTIFY, "notify")]),
        ];
        let policy = SelectionPolicy::builder().vendor_prefix(prefix).build();

        let selection =
            select_characteristics(&services, &policy).expect("selection should succeed");

        assert_eq!(expected, selection.target_service());
    }

    #[test]
    fn notify_targets_prefer_target_service() {
        let services = vec![
            service(OTHER_SERVICE, &[(OTHER_WRITE, "write"), (OTHER_NOTIFY, "notify")]),
            service(VENDOR_SERVICE, &[(VENDOR_NOTIFY, "notify")]),
        ];

        let selection = select_characteristics(&services, &SelectionPolicy::default())
            .expect("selection should succeed");

        assert_eq!(vec![VENDOR_NOTIFY], uuids(selection.notify_targets()));
    }

    #[test]
    fn notify_targets_fall_back_to_whole_peripheral() {
        let services = vec![
            service(VENDOR_SERVICE, &[(VENDOR_EXTRA_WRITE, "write")]),
            service(OTHER_SERVICE, &[(OTHER_NOTIFY, "notify")]),
        ];

        let selection = select_characteristics(&services, &SelectionPolicy::default())
            .expect("selection should succeed");

        assert_eq!(vec![OTHER_NOTIFY], uuids(selection.notify_targets()));
    }

    #[test]
    fn indicate_only_characteristics_are_not_notify_targets() {
        let services = vec![service(
            VENDOR_SERVICE,
            &[(VENDOR_EXTRA_WRITE, "write"), (VENDOR_NOTIFY, "indicate")],
        )];

        let result = select_characteristics(&services, &SelectionPolicy::default());

        assert_matches!(result, Err(SelectionError::NoNotifyTargets));
    }

    #[test]
    fn missing_notify_capability_is_a_selection_failure() {
        let services = vec![service(VENDOR_SERVICE, &[(VENDOR_EXTRA_WRITE, "write+read")])];

        let result = select_characteristics(&services, &SelectionPolicy::default());

        assert_matches!(result, Err(SelectionError::NoNotifyTargets));
    }

    #[test]
    fn missing_write_capability_is_a_selection_failure() {
        let services = vec![service(VENDOR_SERVICE, &[(VENDOR_NOTIFY, "notify+read")])];

        let result = select_characteristics(&services, &SelectionPolicy::default());

        assert_matches!(result, Err(SelectionError::NoWriteCandidates));
    }
}
