mod device_view;
mod inspect_view;
mod painter;
mod probe_view;
mod table;

pub(crate) use self::inspect_view::InspectView;
pub(crate) use self::painter::Painter;
pub(crate) use self::probe_view::{
    FrameView, ProbeEventView, ProbeReadyView, SessionSummaryView,
};
