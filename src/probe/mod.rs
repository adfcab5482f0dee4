mod dispatcher;
mod notification_log;
mod presets;
mod session;

pub use self::dispatcher::{CommandDispatcher, DispatchReceipt, FrameWriter};
pub use self::notification_log::{NotificationLogger, NotificationRecord};
pub use self::presets::{HELP_KEY, OperatorAction, Preset, PresetTable, QUIT_KEY};
pub use self::session::{OperatorKeys, ProbeEvent, ProbeSession, SessionSummary, StopReason};
