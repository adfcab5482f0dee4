use std::fmt::{self, Display, Formatter};

use crate::error::SelectionError;
use crate::hw::{CharacteristicSelection, FoundDevice, ServiceInfo, WriteMode};

use super::device_view::DeviceView;
use super::painter::Painter;
use super::table::Table;

/// Renders the write candidates, notify targets and target service.
pub(crate) struct SelectionView<'a> {
    selection: &'a CharacteristicSelection,
    painter: &'a Painter,
}

impl<'a> SelectionView<'a> {
    pub(crate) fn new(selection: &'a CharacteristicSelection, painter: &'a Painter) -> Self {
        Self { selection, painter }
    }
}

impl Display for SelectionView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let target_service = match self.selection.target_service() {
            Some(uuid) => self.painter.value(uuid),
            None => self.painter.warning("<none>"),
        };
        let summary = Table::key_value(self.painter, vec![("target_service", target_service)]);

        let candidates = Table::grid(
            ["order", "characteristic", "capabilities", "write_mode"],
            self.selection
                .write_candidates()
                .iter()
                .enumerate()
                .map(|(index, characteristic)| {
                    vec![
                        (index + 1).to_string(),
                        self.painter.value(characteristic.uuid()),
                        characteristic.capabilities().to_string(),
                        WriteMode::for_capabilities(characteristic.capabilities()).to_string(),
                    ]
                })
                .collect(),
        );

        let targets = Table::grid(
            ["characteristic", "service", "capabilities"],
            self.selection
                .notify_targets()
                .iter()
                .map(|characteristic| {
                    vec![
                        self.painter.value(characteristic.uuid()),
                        self.painter.muted(characteristic.service_uuid()),
                        characteristic.capabilities().to_string(),
                    ]
                })
                .collect(),
        );

        write!(f, "{}", self.painter.heading("Selection:"))?;
        write!(f, "\n{summary}")?;
        write!(f, "\n{}", self.painter.heading("Write candidates:"))?;
        write!(f, "\n{candidates}")?;
        write!(f, "\n{}", self.painter.heading("Notify targets:"))?;
        write!(f, "\n{targets}")
    }
}

/// Renders a full inspect report: device, GATT table and selection outcome.
pub(crate) struct InspectView<'a> {
    device: &'a FoundDevice,
    services: &'a [ServiceInfo],
    selection: Result<&'a CharacteristicSelection, &'a SelectionError>,
    painter: &'a Painter,
}

impl<'a> InspectView<'a> {
    pub(crate) fn new(
        device: &'a FoundDevice,
        services: &'a [ServiceInfo],
        selection: Result<&'a CharacteristicSelection, &'a SelectionError>,
        painter: &'a Painter,
    ) -> Self {
        Self {
            device,
            services,
            selection,
            painter,
        }
    }
}

impl Display for InspectView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let rows = self
            .services
            .iter()
            .flat_map(|service| {
                service.characteristics().iter().map(|characteristic| {
                    vec![
                        self.painter.muted(service.uuid()),
                        self.painter.value(characteristic.uuid()),
                        characteristic.capabilities().to_string(),
                    ]
                })
            })
            .collect();
        let gatt = Table::grid(["service", "characteristic", "capabilities"], rows);

        write!(f, "{}", self.painter.heading("Connected device:"))?;
        write!(f, "\n{}", DeviceView::new(self.device, self.painter))?;
        writeln!(f)?;
        write!(f, "\n{}", self.painter.heading("GATT table:"))?;
        write!(f, "\n{gatt}")?;
        writeln!(f)?;
        match self.selection {
            Ok(selection) => write!(f, "\n{}", SelectionView::new(selection, self.painter)),
            Err(error) => write!(
                f,
                "\n{} {}",
                self.painter.warning("Selection failed:"),
                error
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::{
        Capabilities, Capability, CharacteristicInfo, SelectionPolicy, select_characteristics,
    };

    const SERVICE: &str = "49535343-fe7d-4ae5-8fa9-9fafd205e455";

    fn services() -> Vec<ServiceInfo> {
        vec![ServiceInfo::new(
            SERVICE,
            vec![
                CharacteristicInfo::new(
                    "49535343-8841-43f4-a8d4-ecbe34729bb3",
                    SERVICE,
                    Capabilities::from_iter([Capability::WriteWithoutResponse]),
                ),
                CharacteristicInfo::new(
                    "49535343-1e4d-4bd9-ba61-23c647249616",
                    SERVICE,
                    Capabilities::from_iter([Capability::Notify]),
                ),
            ],
        )]
    }

    fn device() -> FoundDevice {
        FoundDevice::new(
            "hci0".into(),
            "AA:BB".into(),
            Some("JIMU-Robot".into()),
            Some(-50),
        )
    }

    #[test]
    fn inspect_view_lists_gatt_and_selection() {
        let painter = Painter::new(false);
        let services = services();
        let selection = select_characteristics(&services, &SelectionPolicy::default())
            .expect("fixture should select");
        let device = device();

        let rendered = InspectView::new(&device, &services, Ok(&selection), &painter).to_string();

        assert!(rendered.contains("GATT table:"));
        assert!(rendered.contains("write_without_response"));
        assert!(rendered.contains("Write candidates:"));
        assert!(rendered.contains("49535343-1e4d-4bd9-ba61-23c647249616"));
        assert!(rendered.contains(SERVICE));
    }

    #[test]
    fn inspect_view_reports_selection_failure() {
        let painter = Painter::new(false);
        let device = device();
        let error = SelectionError::NoNotifyTargets;

        let rendered = InspectView::new(&device, &[], Err(&error), &painter).to_string();

        assert!(rendered.contains("Selection failed: no notify-capable characteristics"));
    }
}
