#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::empty_docs,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

mod client;
pub mod cli;
mod console;
mod error;
#[cfg(test)]
mod fake;
mod frames;
pub mod probe;
mod protocol;
pub mod session;
mod settings;
mod transcript;
mod ws;

pub use console::{Console, StdConsole};
pub use error::{
    CloseReason, ConfigError, Error, ProbeConfigError, Result, TranscriptError, UpgradeError,
};
pub use probe::{ProbeConfig, ProbeKind, ProbeReport, ProbeResult};
pub use protocol::Message;
pub use session::{Command, Session, SessionEnd};
pub use settings::ConnectionSettings;
pub use transcript::{Transcript, TranscriptFormat};
pub use ws::{Connection, Event, WebSocket};

pub(crate) const MAX_FRAME_PAYLOAD: usize = 32 * 1024;
