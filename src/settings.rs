//! Connection settings sourced from `WS_*` environment variables.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `WS_CONNECT_TIMEOUT` | 5 seconds |
//! | `WS_DISCONNECT_TIMEOUT` | 5 seconds |
//! | `WS_MESSAGE_TIMEOUT` | no timeout |
//! | `WS_MAX_MESSAGE_SIZE` | 1 MiB |
//! | `WS_EXTRA_HEADERS` | none (`name:value,name:value`) |
//!
//! Empty values are treated as unset.

use std::{env, time::Duration};

use crate::error::ConfigError;

type Result<T> = std::result::Result<T, ConfigError>;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSettings {
    /// Upper bound for TCP connect, TLS and the HTTP upgrade together.
    pub connect_timeout: Duration,
    /// How long to wait for the server to acknowledge a close.
    pub disconnect_timeout: Duration,
    /// How long to wait for a reply (e.g. the pong answering a ping); `None` waits forever.
    pub message_timeout: Option<Duration>,
    /// Largest incoming message accepted before the connection is closed with 1009.
    pub max_message_size: usize,
    /// Additional headers sent with the upgrade request.
    pub extra_headers: Vec<(String, String)>,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            disconnect_timeout: DEFAULT_DISCONNECT_TIMEOUT,
            message_timeout: None,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            extra_headers: Vec::new(),
        }
    }
}

impl ConnectionSettings {
    /// Resolves settings from the process environment.
    pub fn resolve() -> Result<Self> { Self::from_lookup(|key| env::var(key).ok()) }

    /// Resolves settings from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut settings = Self::default();

        if let Some(v) = get("WS_CONNECT_TIMEOUT") {
            settings.connect_timeout = parse_seconds("connect_timeout", &v)?;
        }
        if let Some(v) = get("WS_DISCONNECT_TIMEOUT") {
            settings.disconnect_timeout = parse_seconds("disconnect_timeout", &v)?;
        }
        if let Some(v) = get("WS_MESSAGE_TIMEOUT") {
            settings.message_timeout = Some(parse_seconds("message_timeout", &v)?);
        }
        if let Some(v) = get("WS_MAX_MESSAGE_SIZE") {
            settings.max_message_size = parse_size("max_message_size", &v)?;
        }
        if let Some(v) = get("WS_EXTRA_HEADERS") {
            settings.extra_headers = parse_headers("extra_headers", &v)?;
        }

        tracing::debug!(?settings, "resolved connection settings");
        Ok(settings)
    }
}

fn parse_seconds(field: &'static str, value: &str) -> Result<Duration> {
    let secs: f64 = value.trim().parse().map_err(|_| ConfigError::InvalidFloat {
        field,
        value: value.to_owned(),
    })?;
    // rejects NaN, zero, negatives and values Duration cannot hold
    if !(secs > 0.0) {
        return Err(ConfigError::OutOfRange {
            field,
            value: value.to_owned(),
        });
    }
    Duration::try_from_secs_f64(secs).map_err(|_| ConfigError::OutOfRange {
        field,
        value: value.to_owned(),
    })
}

fn parse_size(field: &'static str, value: &str) -> Result<usize> {
    let size: usize = value.trim().parse().map_err(|_| ConfigError::InvalidInteger {
        field,
        value: value.to_owned(),
    })?;
    if size == 0 {
        return Err(ConfigError::OutOfRange {
            field,
            value: value.to_owned(),
        });
    }
    Ok(size)
}

fn parse_headers(field: &'static str, value: &str) -> Result<Vec<(String, String)>> {
    value
        .split(',')
        .filter(|pair| !pair.trim().is_empty())
        .map(|pair| match pair.split_once(':') {
            Some((name, v)) if !name.trim().is_empty() => {
                Ok((name.trim().to_owned(), v.trim().to_owned()))
            }
            _ => Err(ConfigError::InvalidHeader {
                field,
                value: pair.to_owned(),
            }),
        })
        .collect()
}
