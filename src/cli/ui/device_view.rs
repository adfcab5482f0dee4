use std::fmt::{self, Display, Formatter};

use crate::hw::FoundDevice;
use crate::utils::format_rssi;

use super::painter::Painter;
use super::table::Table;

/// Renders the peripheral the probe connected to.
pub(crate) struct DeviceView<'a> {
    device: &'a FoundDevice,
    painter: &'a Painter,
}

impl<'a> DeviceView<'a> {
    pub(crate) fn new(device: &'a FoundDevice, painter: &'a Painter) -> Self {
        Self { device, painter }
    }
}

impl Display for DeviceView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let painter = self.painter;
        let name = match self.device.local_name() {
            Some(name) => painter.value(name),
            None => painter.warning("<unnamed>"),
        };
        let rows = vec![
            ("name", name),
            ("address", painter.value(self.device.device_id())),
            ("signal", format_rssi(self.device.rssi())),
            ("adapter", painter.muted(self.device.adapter_name())),
        ];
        write!(f, "{}", Table::key_value(painter, rows))
    }
}
