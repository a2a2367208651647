use std::{io, path::PathBuf};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Close reason codes as specified in
/// [RFC 6455](https://www.rfc-editor.org/rfc/rfc6455.html#section-7.4)
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Normal close
    Normal = 1000,
    /// Going away
    GoingAway = 1001,
    /// Websocket protocol violation
    ProtoError = 1002,
    /// Unsupported data type
    DataType = 1003,
    /// No reason code provided
    NoneGiven = 1005,
    /// Abnormal closure
    Abnormal = 1006,
    /// Invalid UTF-8 in Text message
    DataError = 1007,
    /// Generic policy violation
    Policy = 1008,
    /// Messages are too big
    TooBig = 1009,
    /// Unsupported extensions
    Extension = 1010,
    /// An unexpected condition that prevented the request from being fulfilled
    Unexpected = 1011,
    /// TLS error
    Tls = 1015,
    /// Other valid codes with unknown meanings
    Unknown = 4000, // private use code
}

impl From<CloseReason> for u16 {
    fn from(value: CloseReason) -> Self { value as u16 }
}

impl From<u16> for CloseReason {
    fn from(code: u16) -> Self {
        match code {
            1000 => CloseReason::Normal,
            1001 => CloseReason::GoingAway,
            1002 => CloseReason::ProtoError,
            1003 => CloseReason::DataType,
            1005 => CloseReason::NoneGiven,
            1006 => CloseReason::Abnormal,
            1007 => CloseReason::DataError,
            1008 => CloseReason::Policy,
            1009 => CloseReason::TooBig,
            1010 => CloseReason::Extension,
            1011 => CloseReason::Unexpected,
            1015 => CloseReason::Tls,
            _ => CloseReason::Unknown,
        }
    }
}

/// A malformed `WS_*` environment setting.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field}: {value:?} is not a valid float")]
    InvalidFloat { field: &'static str, value: String },

    #[error("{field}: {value:?} is not a valid integer")]
    InvalidInteger { field: &'static str, value: String },

    #[error("{field}: {value:?} is not in the range x>0")]
    OutOfRange { field: &'static str, value: String },

    #[error("{field}: {value:?} is not a valid header, expected name:value")]
    InvalidHeader { field: &'static str, value: String },
}

impl ConfigError {
    /// Name of the offending settings field.
    #[must_use]
    pub fn field(&self) -> &'static str {
        match self {
            Self::InvalidFloat { field, .. }
            | Self::InvalidInteger { field, .. }
            | Self::OutOfRange { field, .. }
            | Self::InvalidHeader { field, .. } => field,
        }
    }
}

/// An invalid probe configuration, rejected before connecting.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProbeConfigError {
    #[error("The number of {0} cannot be 0")]
    ZeroCount(&'static str),

    #[error("The number of {0} must be -1 or a positive integer")]
    NegativeCount(&'static str),

    #[error("{0} is not in the range x>0")]
    Interval(String),

    #[error("The message must be at most 125 bytes, got {0}")]
    MessageTooLong(usize),
}

/// Errors that can occur when upgrading a TCP stream to a WebSocket.
#[derive(Debug, Error)]
pub enum UpgradeError {
    /// Failed to read from the TCP stream.
    #[error("failed to read the handshake response: {0}")]
    Read(#[source] io::Error),
    /// Failed to write to the TCP stream.
    #[error("failed to send the handshake request: {0}")]
    Write(#[source] io::Error),
    /// Server returned an unexpected HTTP status line.
    #[error("unexpected status line: {0:?}")]
    StatusLine(String),
    /// A handshake header did not match expectations.
    #[error("handshake header {field} expected {expected:?}, got {got:?}")]
    Header {
        /// The name of the header field.
        field: &'static str,
        /// The expected value.
        expected: String,
        /// The actual value, if any.
        got: Option<String>,
    },
    /// Failed to establish TCP connection.
    #[error("could not connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    /// TLS negotiation failed.
    #[error("TLS handshake with {host} failed: {source}")]
    Tls {
        host: String,
        #[source]
        source: io::Error,
    },
    /// Attempt to connect timed out.
    #[error("connection timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Failure to open or write the session transcript.
#[derive(Debug, Error)]
#[error("cannot write transcript {}: {source}", path.display())]
pub struct TranscriptError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Crate-level error.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid settings, {0}")]
    Config(#[from] ConfigError),

    #[error("{0} is not a valid websocket url")]
    InvalidUrl(String),

    #[error(transparent)]
    Upgrade(#[from] UpgradeError),

    #[error(transparent)]
    Transcript(#[from] TranscriptError),

    #[error("no response from the server after {0:?}")]
    Timeout(std::time::Duration),

    #[error("the connection is closed")]
    Closed,

    #[error("control frame payload of {0} bytes exceeds 125 bytes")]
    ControlPayload(usize),

    #[error(transparent)]
    Io(#[from] io::Error),
}
