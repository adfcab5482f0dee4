pub(crate) mod command;
pub(crate) mod encode;
pub(crate) mod inspect;
pub(crate) mod probe;
pub(crate) mod send;
pub(crate) mod ui;

pub use self::command::{
    Args, Command, EncodeArgs, FakeArgs, LogLevel, ProbeSettings, SendArgs,
};
