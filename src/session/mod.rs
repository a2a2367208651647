//! Interactive session over a single connection.
//!
//! The loop greets the user, then alternates between prompting and dispatching commands
//! until `quit`, `close`, end of input, cancellation or a server-side close. While it waits
//! for input it keeps servicing the connection and prints whatever the server sends.

mod command;

use std::{future::Future, time::Duration};

pub use command::Command;
use tokio::time::Instant;

use crate::{
    Connection, Event, Message,
    console::Console,
    error::{CloseReason, Error, Result},
    frames::MAX_CONTROL_PAYLOAD,
    transcript::Transcript,
};

const BANNER: [&str; 5] = [
    "Welcome to the interactive websocket session! 🌟",
    "For more information about commands, type the help command.",
    "When you see <> around a word, it means this argument is optional.",
    "To know more about a particular command type help <command>.",
    "To close the session, you can type Ctrl+D or the quit command.",
];

const HELP_INTRO: &str =
    "The session program lets you interact with a websocket endpoint with the following commands:";

pub const FAREWELL: &str = "Bye! 👋";

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The `quit` command.
    Quit,
    /// The `close` command.
    Closed,
    /// End of input on the console.
    EndOfInput,
    /// The server closed the connection.
    ServerClosed,
    /// The cancel future completed.
    Cancelled,
}

pub struct Session<C, K> {
    conn: C,
    console: K,
    transcript: Option<Transcript>,
    reply_timeout: Option<Duration>,
    running: bool,
}

impl<C: Connection, K: Console> Session<C, K> {
    pub fn new(conn: C, console: K) -> Self {
        Self {
            conn,
            console,
            transcript: None,
            reply_timeout: None,
            running: false,
        }
    }

    /// Mirrors every printed line to `transcript`.
    #[must_use]
    pub fn with_transcript(mut self, transcript: Option<Transcript>) -> Self {
        self.transcript = transcript;
        self
    }

    /// Bounds how long `ping` waits for its pong.
    #[must_use]
    pub fn with_reply_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.reply_timeout = timeout;
        self
    }

    /// Runs the session to completion.
    ///
    /// However it ends, the connection is closed, the farewell is printed and the
    /// transcript is flushed and closed. A transport error is printed before that and then
    /// returned.
    pub async fn run<F>(mut self, cancel: F) -> Result<SessionEnd>
    where
        F: Future<Output = ()>,
    {
        self.running = true;
        let outcome = self.serve(cancel).await;
        tracing::info!(?outcome, "session ending");
        if let Err(e) = &outcome {
            // best effort, the console may be what failed
            let _ = self.emit(&format!("Error: {e}"));
        }

        let terminated = self.terminate().await;
        let end = outcome?;
        terminated?;
        Ok(end)
    }

    async fn serve<F>(&mut self, cancel: F) -> Result<SessionEnd>
    where
        F: Future<Output = ()>,
    {
        for line in BANNER {
            self.emit(line)?;
        }

        tokio::pin!(cancel);
        while self.running {
            self.console.prompt()?;
            let line = loop {
                tokio::select! {
                    () = &mut cancel => return Ok(SessionEnd::Cancelled),
                    line = self.console.read_line() => break line?,
                    event = self.conn.next_event() => {
                        if let Some(end) = self.on_event(event)? {
                            return Ok(end);
                        }
                        // the prompt scrolled away with the server output
                        self.console.prompt()?;
                    }
                }
            };

            let Some(line) = line else {
                return Ok(SessionEnd::EndOfInput);
            };
            // commands may wait on the server indefinitely
            let dispatched = tokio::select! {
                () = &mut cancel => return Ok(SessionEnd::Cancelled),
                r = self.dispatch(&line) => r?,
            };
            if let Some(end) = dispatched {
                return Ok(end);
            }
        }
        Ok(SessionEnd::Quit)
    }

    async fn terminate(&mut self) -> Result<()> {
        self.running = false;
        let closed = self.conn.close(CloseReason::Normal.into(), "").await;
        let farewell = self.emit(FAREWELL);
        let transcript = self.transcript.take().map(Transcript::close).transpose();
        closed?;
        farewell?;
        transcript?;
        Ok(())
    }

    /// Prints a line on the console and mirrors it to the transcript.
    fn emit(&mut self, line: &str) -> Result<()> {
        self.console.write_line(line)?;
        if let Some(transcript) = &mut self.transcript {
            transcript.write(line)?;
        }
        Ok(())
    }

    // Something arrived while nobody asked for it
    fn on_event(&mut self, event: Option<Event>) -> Result<Option<SessionEnd>> {
        match event {
            Some(Event::Message(Message::Text(text))) => self.emit(&format!("< TEXT {text}"))?,
            Some(Event::Message(Message::Binary(bytes))) => {
                self.emit(&format!("< BYTE {}", String::from_utf8_lossy(&bytes)))?;
            }
            Some(Event::Pong(payload)) => {
                self.emit(&format!("< PONG {}", String::from_utf8_lossy(&payload)))?;
            }
            event @ (Some(Event::Closed(_)) | None) => {
                tracing::info!(?event, "server closed the connection");
                self.emit("Connection closed by the server")?;
                return Ok(Some(SessionEnd::ServerClosed));
            }
        }
        Ok(None)
    }

    async fn dispatch(&mut self, line: &str) -> Result<Option<SessionEnd>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let (token, args) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(token, args)| (token, args.trim()));

        let Some(command) = Command::lookup(token) else {
            self.unknown_command(token)?;
            return Ok(None);
        };
        tracing::debug!(%command, args, "dispatching");

        match command {
            Command::Help => self.help(args)?,
            Command::Ping => self.ping(args).await?,
            Command::Pong => {
                if self.check_control_payload(args)? {
                    self.conn.pong(args.as_bytes()).await?;
                    self.emit(&format!("> PONG {args}"))?;
                }
            }
            Command::Text => {
                if self.check_message(command, args)? {
                    self.conn.send_text(args).await?;
                    self.emit(&format!("> TEXT {args}"))?;
                }
            }
            Command::Byte => {
                if self.check_message(command, args)? {
                    self.conn.send_bytes(args.as_bytes()).await?;
                    self.emit(&format!("> BYTE {args}"))?;
                }
            }
            Command::Close => return self.close(args).await,
            Command::Quit => {
                self.running = false;
                return Ok(Some(SessionEnd::Quit));
            }
        }
        Ok(None)
    }

    fn unknown_command(&mut self, token: &str) -> Result<()> {
        self.emit(&format!("Unknown command {token}, available commands are:"))?;
        for command in Command::all() {
            self.emit(&format!("• {command}"))?;
        }
        Ok(())
    }

    fn help(&mut self, topic: &str) -> Result<()> {
        if topic.is_empty() {
            self.emit(HELP_INTRO)?;
            for command in Command::all() {
                self.emit(&format!("• {}: {}", command.usage(), command.summary()))?;
            }
            return Ok(());
        }

        let token = topic.split_whitespace().next().unwrap_or(topic);
        match Command::lookup(token) {
            Some(command) => {
                self.emit(&format!("Usage: {}", command.usage()))?;
                self.emit(command.summary())
            }
            None => self.unknown_command(token),
        }
    }

    async fn ping(&mut self, message: &str) -> Result<()> {
        if !self.check_control_payload(message)? {
            return Ok(());
        }

        let started = Instant::now();
        self.conn.ping(message.as_bytes()).await?;
        self.emit(&format!("> PING {message}"))?;

        let elapsed = match self.reply_timeout {
            Some(t) => tokio::time::timeout(t, self.await_pong(message.as_bytes(), started))
                .await
                .map_err(|_| Error::Timeout(t))??,
            None => self.await_pong(message.as_bytes(), started).await?,
        };

        self.emit(&format!("< PONG {message}"))?;
        self.emit(&format!("Took {elapsed:.2?}"))
    }

    async fn await_pong(&mut self, payload: &[u8], started: Instant) -> Result<Duration> {
        loop {
            match self.conn.next_event().await {
                Some(Event::Pong(p)) if p == payload => return Ok(started.elapsed()),
                Some(Event::Closed(_)) | None => return Err(Error::Closed),
                // anything else is shown as it arrives
                event => {
                    self.on_event(event)?;
                }
            }
        }
    }

    async fn close(&mut self, args: &str) -> Result<Option<SessionEnd>> {
        let (code, reason) = match args.split_once(char::is_whitespace) {
            Some((code, reason)) => (code, reason.trim()),
            None => (args, ""),
        };
        let code = if code.is_empty() {
            CloseReason::Normal.into()
        } else {
            match code.parse::<u16>() {
                Ok(code) if (1000..=4999).contains(&code) => code,
                _ => {
                    self.emit(&format!(
                        "{code} is not a valid close code, expected an integer between 1000 and 4999"
                    ))?;
                    return Ok(None);
                }
            }
        };

        self.conn.close(code, reason).await?;
        self.emit(&format!("Connection closed with code {code}"))?;
        self.running = false;
        Ok(Some(SessionEnd::Closed))
    }

    // text and byte need something to send
    fn check_message(&mut self, command: Command, message: &str) -> Result<bool> {
        if message.is_empty() {
            self.emit(&format!("Missing message, usage: {}", command.usage()))?;
            return Ok(false);
        }
        Ok(true)
    }

    fn check_control_payload(&mut self, message: &str) -> Result<bool> {
        if message.len() > MAX_CONTROL_PAYLOAD {
            self.emit(&format!(
                "The message must be at most {MAX_CONTROL_PAYLOAD} bytes, got {}",
                message.len()
            ))?;
            return Ok(false);
        }
        Ok(true)
    }
}
