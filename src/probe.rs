//! Timed ping and unsolicited pong probes.
//!
//! A probe run prints a header line, then one `sequence=N, time=T` line per iteration.
//! Iterations start `interval` apart regardless of how long each exchange took.

use std::{fmt, future::Future, io::Write, time::Duration};

use tokio::time::{Instant, sleep_until};

use crate::{
    Connection, Event,
    error::{CloseReason, Error, ProbeConfigError, Result},
    frames::MAX_CONTROL_PAYLOAD,
};

/// Probe count meaning "run until cancelled".
pub const UNBOUNDED: i64 = -1;

/// Size of the random payload a ping carries when no message is given.
pub const DEFAULT_PING_PAYLOAD_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeKind {
    /// Send pings and time the matching pongs.
    Ping,
    /// Send unsolicited pongs and time the writes.
    Pong,
}

impl ProbeKind {
    fn plural(self) -> &'static str {
        match self {
            Self::Ping => "pings",
            Self::Pong => "pongs",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub kind: ProbeKind,
    pub url: String,
    /// Number of iterations, or [`UNBOUNDED`].
    pub count: i64,
    /// Time between the starts of two iterations.
    pub interval: Duration,
    /// Explicit payload; `None` selects the default for `kind`.
    pub message: Option<Vec<u8>>,
    /// How long a ping waits for its pong; `None` waits forever.
    pub reply_timeout: Option<Duration>,
}

impl ProbeConfig {
    /// A single probe, one second apart, with the default payload.
    #[must_use]
    pub fn new(kind: ProbeKind, url: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
            count: 1,
            interval: Duration::from_secs(1),
            message: None,
            reply_timeout: None,
        }
    }

    pub fn validate(&self) -> std::result::Result<(), ProbeConfigError> {
        match self.count {
            0 => return Err(ProbeConfigError::ZeroCount(self.kind.plural())),
            c if c < UNBOUNDED => return Err(ProbeConfigError::NegativeCount(self.kind.plural())),
            _ => {}
        }
        if self.interval.is_zero() {
            return Err(ProbeConfigError::Interval(
                self.interval.as_secs_f64().to_string(),
            ));
        }
        match &self.message {
            Some(m) if m.len() > MAX_CONTROL_PAYLOAD => {
                Err(ProbeConfigError::MessageTooLong(m.len()))
            }
            _ => Ok(()),
        }
    }

    #[must_use]
    pub fn is_unbounded(&self) -> bool { self.count == UNBOUNDED }

    /// The explicit message, or 32 random bytes for a ping and nothing for a pong.
    #[must_use]
    pub fn payload(&self) -> Vec<u8> {
        if let Some(message) = &self.message {
            return message.clone();
        }
        match self.kind {
            ProbeKind::Ping => {
                let mut buf = vec![0; DEFAULT_PING_PAYLOAD_LEN];
                rand::fill(&mut buf[..]);
                buf
            }
            ProbeKind::Pong => Vec::new(),
        }
    }

    fn header(&self, payload_len: usize) -> String {
        match self.kind {
            ProbeKind::Ping => format!("PING {} with {payload_len} bytes of data", self.url),
            ProbeKind::Pong => format!(
                "Sent unsolicited PONG of {payload_len} bytes of data to {}",
                self.url
            ),
        }
    }

    // 1, 2, 3, ... up to count, forever when unbounded
    fn sequences(&self) -> impl Iterator<Item = u64> {
        let limit = u64::try_from(self.count).ok();
        (1..).take_while(move |seq| limit.is_none_or(|limit| *seq <= limit))
    }
}

/// Outcome of one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResult {
    pub sequence: u64,
    pub elapsed: Duration,
}

impl fmt::Display for ProbeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sequence={}, time={:.2?}", self.sequence, self.elapsed)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProbeReport {
    /// Every iteration that was reported, in order.
    pub results: Vec<ProbeResult>,
    /// Whether the run was stopped by `cancel` rather than running to completion.
    pub cancelled: bool,
}

/// Runs the probe described by `config` over `conn`, writing its report to `out`.
///
/// The run ends after `config.count` iterations, or when `cancel` completes, whichever
/// comes first. The connection is closed on every path, including errors.
pub async fn run<C, W, F>(
    conn: &mut C,
    config: &ProbeConfig,
    out: &mut W,
    cancel: F,
) -> Result<ProbeReport>
where
    C: Connection + ?Sized,
    W: Write,
    F: Future<Output = ()>,
{
    let payload = config.payload();
    writeln!(out, "{}", config.header(payload.len()))?;
    out.flush()?;

    let mut results = Vec::new();
    let outcome = tokio::select! {
        r = iterate(conn, config, &payload, out, &mut results) => r.map(|()| false),
        () = cancel => Ok(true),
    };
    if let Ok(true) = outcome {
        tracing::info!(completed = results.len(), "probe cancelled");
    }

    let closed = conn.close(CloseReason::Normal.into(), "").await;
    let cancelled = outcome?;
    closed?;
    Ok(ProbeReport { results, cancelled })
}

async fn iterate<C, W>(
    conn: &mut C,
    config: &ProbeConfig,
    payload: &[u8],
    out: &mut W,
    results: &mut Vec<ProbeResult>,
) -> Result<()>
where
    C: Connection + ?Sized,
    W: Write,
{
    let last = u64::try_from(config.count).ok();
    for sequence in config.sequences() {
        let started = Instant::now();
        let elapsed = match config.kind {
            ProbeKind::Ping => ping_once(conn, payload, config.reply_timeout).await?,
            ProbeKind::Pong => {
                conn.pong(payload).await?;
                started.elapsed()
            }
        };

        // report and record together so a cancellation never splits them
        let result = ProbeResult { sequence, elapsed };
        writeln!(out, "{result}")?;
        out.flush()?;
        results.push(result);
        tracing::debug!(sequence, ?elapsed, "probe iteration");

        if last != Some(sequence) {
            sleep_until(started + config.interval).await;
        }
    }
    Ok(())
}

async fn ping_once<C>(conn: &mut C, payload: &[u8], timeout: Option<Duration>) -> Result<Duration>
where
    C: Connection + ?Sized,
{
    let started = Instant::now();
    conn.ping(payload).await?;

    let wait = async {
        loop {
            match conn.next_event().await {
                Some(Event::Pong(p)) if p == payload => return Ok(started.elapsed()),
                Some(Event::Closed(_)) | None => return Err(Error::Closed),
                Some(other) => tracing::debug!(event = ?other, "skipping event while waiting for PONG"),
            }
        }
    };

    match timeout {
        Some(t) => tokio::time::timeout(t, wait)
            .await
            .map_err(|_| Error::Timeout(t))?,
        None => wait.await,
    }
}
