//! Command line interface of the `ws` binary.

use std::{path::PathBuf, time::Duration};

use clap::{Args, CommandFactory, Parser, Subcommand, error::ErrorKind};
use url::Url;

use crate::probe::{ProbeConfig, ProbeKind};

#[derive(Debug, Parser)]
#[command(name = "ws", author, version, about = "Probe and interact with websocket endpoints")]
pub struct Cli {
    #[command(subcommand)]
    pub mode: Mode,
}

#[derive(Debug, Subcommand)]
pub enum Mode {
    /// Sends pings and reports how long each pong took to come back
    Ping(ProbeArgs),
    /// Sends unsolicited pongs and reports how long each write took
    Pong(ProbeArgs),
    /// Opens an interactive session
    Session(SessionArgs),
}

#[derive(Debug, Args)]
pub struct ProbeArgs {
    /// Websocket url, `:PORT[/path]` is short for `ws://localhost:PORT[/path]`
    #[arg(value_parser = parse_url)]
    pub url: String,

    /// Number of probes to send, -1 to keep going until interrupted
    #[arg(
        short,
        long,
        default_value = "1",
        allow_negative_numbers = true,
        value_parser = parse_count
    )]
    pub number: i64,

    /// Seconds between two probes
    #[arg(
        short,
        long,
        default_value = "1.0",
        allow_negative_numbers = true,
        value_parser = parse_interval
    )]
    pub interval: Duration,

    /// Payload to send instead of the default one
    #[arg(short, long)]
    pub message: Option<String>,
}

impl ProbeArgs {
    /// Builds and validates the probe configuration, reporting problems as usage errors.
    pub fn probe_config(&self, kind: ProbeKind) -> Result<ProbeConfig, clap::Error> {
        let config = ProbeConfig {
            count: self.number,
            interval: self.interval,
            message: self.message.as_ref().map(|m| m.as_bytes().to_vec()),
            ..ProbeConfig::new(kind, self.url.clone())
        };
        config
            .validate()
            .map_err(|e| Cli::command().error(ErrorKind::ValueValidation, e))?;
        Ok(config)
    }
}

#[derive(Debug, Args)]
pub struct SessionArgs {
    /// Websocket url, `:PORT[/path]` is short for `ws://localhost:PORT[/path]`
    #[arg(value_parser = parse_url)]
    pub url: String,

    /// Also write the session to this file, as markup for .svg and .html
    #[arg(short, long, value_parser = parse_file)]
    pub file: Option<PathBuf>,
}

/// Accepts `ws://` and `wss://` urls with a host, expanding the `:PORT` shorthand.
pub fn parse_url(raw: &str) -> Result<String, String> {
    let invalid = || format!("{raw} is not a valid websocket url");

    let url = match raw.strip_prefix(':') {
        Some(rest) => format!("ws://localhost:{rest}"),
        None => raw.to_owned(),
    };
    // checked on the raw text, the parser is lenient about missing slashes
    if !(url.starts_with("ws://") || url.starts_with("wss://")) {
        return Err(invalid());
    }
    let parsed = Url::parse(&url).map_err(|_| invalid())?;
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(invalid());
    }
    Ok(url)
}

fn parse_count(raw: &str) -> Result<i64, String> {
    raw.trim()
        .parse()
        .map_err(|_| format!("'{raw}' is not a valid integer"))
}

fn parse_interval(raw: &str) -> Result<Duration, String> {
    let secs: f64 = raw
        .trim()
        .parse()
        .map_err(|_| format!("'{raw}' is not a valid float range"))?;
    if secs.is_nan() || secs <= 0.0 {
        return Err(format!("{raw} is not in the range x>0"));
    }
    Duration::try_from_secs_f64(secs).map_err(|_| format!("{raw} is not in the range x>0"))
}

fn parse_file(raw: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(raw);
    if path.is_dir() {
        return Err(format!("{raw} is a directory"));
    }
    Ok(path)
}
