//! In-memory [`Connection`] and [`Console`] for unit tests.

use std::{collections::VecDeque, io};

use async_trait::async_trait;

use crate::{Connection, Event, Message, console::Console, error::Result};

#[derive(Debug, Default)]
pub(crate) struct FakeConnection {
    /// Answer every ping with a pong carrying the same payload.
    pub(crate) answer_pings: bool,
    /// Events handed out by `next_event`; once empty it waits forever.
    pub(crate) events: VecDeque<Event>,
    pub(crate) pings: Vec<Vec<u8>>,
    pub(crate) pongs: Vec<Vec<u8>>,
    pub(crate) sent: Vec<Message>,
    pub(crate) closed_with: Option<(u16, String)>,
    pub(crate) close_calls: usize,
}

impl FakeConnection {
    pub(crate) fn answering() -> Self {
        Self {
            answer_pings: true,
            ..Self::default()
        }
    }

    pub(crate) fn silent() -> Self { Self::default() }
}

#[async_trait]
impl Connection for FakeConnection {
    async fn send_text(&mut self, text: &str) -> Result<()> {
        self.sent.push(Message::Text(text.to_owned()));
        Ok(())
    }

    async fn send_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.sent.push(Message::Binary(bytes.to_vec()));
        Ok(())
    }

    async fn ping(&mut self, payload: &[u8]) -> Result<()> {
        self.pings.push(payload.to_vec());
        if self.answer_pings {
            self.events.push_back(Event::Pong(payload.to_vec()));
        }
        Ok(())
    }

    async fn pong(&mut self, payload: &[u8]) -> Result<()> {
        self.pongs.push(payload.to_vec());
        Ok(())
    }

    async fn next_event(&mut self) -> Option<Event> {
        match self.events.pop_front() {
            Some(event) => Some(event),
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<()> {
        self.close_calls += 1;
        if self.closed_with.is_none() {
            self.closed_with = Some((code, reason.to_owned()));
        }
        Ok(())
    }
}

/// [`Console`] fed from a fixed script, recording everything printed.
#[derive(Debug, Default)]
pub(crate) struct ScriptedConsole {
    inputs: VecDeque<String>,
    /// Wait forever once the script runs out instead of reporting end of input.
    hang_at_end: bool,
    pub(crate) prompts: usize,
    pub(crate) output: Vec<String>,
}

impl ScriptedConsole {
    pub(crate) fn new(inputs: &[&str]) -> Self {
        Self {
            inputs: inputs.iter().map(|&s| s.to_owned()).collect(),
            ..Self::default()
        }
    }

    pub(crate) fn waiting(inputs: &[&str]) -> Self {
        Self {
            hang_at_end: true,
            ..Self::new(inputs)
        }
    }
}

#[async_trait]
impl Console for ScriptedConsole {
    fn prompt(&mut self) -> io::Result<()> {
        self.prompts += 1;
        Ok(())
    }

    async fn read_line(&mut self) -> io::Result<Option<String>> {
        match self.inputs.pop_front() {
            Some(line) => Ok(Some(line)),
            None if self.hang_at_end => std::future::pending().await,
            None => Ok(None),
        }
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.output.push(line.to_owned());
        Ok(())
    }
}
