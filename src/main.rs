#![warn(clippy::all, clippy::pedantic)]

use std::{io, process::ExitCode};

use clap::Parser;
use tracing_subscriber::EnvFilter;
use ws_probe::{
    ConnectionSettings, ProbeConfig, ProbeKind, Result, Session, StdConsole, Transcript,
    WebSocket,
    cli::{Cli, Mode, ProbeArgs, SessionArgs},
    probe,
};

enum Job {
    Probe(ProbeConfig),
    Session(SessionArgs),
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ws_probe=warn")),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();
    let job = match cli.mode {
        Mode::Ping(args) => probe_job(&args, ProbeKind::Ping),
        Mode::Pong(args) => probe_job(&args, ProbeKind::Pong),
        Mode::Session(args) => Job::Session(args),
    };

    let settings = match ConnectionSettings::resolve() {
        Ok(settings) => settings,
        Err(e) => return failure(&e.into()),
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => return failure(&e.into()),
    };
    let outcome = runtime.block_on(run(job, &settings));
    // a pending stdin read would otherwise keep the process alive
    runtime.shutdown_background();

    match outcome {
        Ok(Some(signal)) => {
            println!("Program was interrupted by {signal}, good bye! 👋");
            ExitCode::SUCCESS
        }
        Ok(None) => ExitCode::SUCCESS,
        Err(e) => failure(&e),
    }
}

// usage errors exit here with code 2
fn probe_job(args: &ProbeArgs, kind: ProbeKind) -> Job {
    Job::Probe(args.probe_config(kind).unwrap_or_else(|e| e.exit()))
}

fn failure(e: &ws_probe::Error) -> ExitCode {
    eprintln!("Error: {e}");
    ExitCode::FAILURE
}

/// Runs the job, returning the name of the signal that interrupted it, if any.
async fn run(job: Job, settings: &ConnectionSettings) -> Result<Option<&'static str>> {
    let mut interrupted_by = None;
    let cancel = async { interrupted_by = Some(interrupted().await) };

    match job {
        Job::Probe(mut config) => {
            config.reply_timeout = settings.message_timeout;
            let mut ws = WebSocket::connect(&config.url, settings).await?;
            let report = probe::run(&mut ws, &config, &mut io::stdout(), cancel).await?;
            tracing::info!(iterations = report.results.len(), "probe done");
        }
        Job::Session(args) => {
            let transcript = args.file.as_deref().map(Transcript::create).transpose()?;
            let ws = WebSocket::connect(&args.url, settings).await?;
            let end = Session::new(ws, StdConsole::new())
                .with_transcript(transcript)
                .with_reply_timeout(settings.message_timeout)
                .run(cancel)
                .await?;
            tracing::info!(?end, "session done");
        }
    }
    Ok(interrupted_by)
}

/// Completes on Ctrl+C, or SIGTERM on unix.
#[cfg(unix)]
async fn interrupted() -> &'static str {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => tokio::select! {
            () = ctrl_c() => "Ctrl+C",
            _ = term.recv() => "SIGTERM",
        },
        Err(e) => {
            tracing::warn!("cannot listen for SIGTERM: {e}");
            ctrl_c().await;
            "Ctrl+C"
        }
    }
}

#[cfg(not(unix))]
async fn interrupted() -> &'static str {
    ctrl_c().await;
    "Ctrl+C"
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("cannot listen for Ctrl+C: {e}");
        std::future::pending::<()>().await;
    }
}
