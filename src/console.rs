use std::io::{self, Stdout, Write};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

const PROMPT: &str = "> ";

/// Line oriented terminal used by the session loop.
#[async_trait]
pub trait Console: Send {
    /// Shows the input prompt. The prompt is not session output.
    fn prompt(&mut self) -> io::Result<()>;

    /// Reads the next line without its terminator, `None` at end of input (Ctrl+D).
    ///
    /// Must be cancel safe: the session polls it alongside the connection.
    async fn read_line(&mut self) -> io::Result<Option<String>>;

    /// Prints one line of session output.
    fn write_line(&mut self, line: &str) -> io::Result<()>;
}

#[async_trait]
impl<K: Console + ?Sized> Console for &mut K {
    fn prompt(&mut self) -> io::Result<()> { (**self).prompt() }

    async fn read_line(&mut self) -> io::Result<Option<String>> { (**self).read_line().await }

    fn write_line(&mut self, line: &str) -> io::Result<()> { (**self).write_line(line) }
}

/// [`Console`] over the process stdin and stdout.
pub struct StdConsole {
    lines: Lines<BufReader<Stdin>>,
    out: Stdout,
}

impl StdConsole {
    #[must_use]
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
            out: io::stdout(),
        }
    }
}

impl Default for StdConsole {
    fn default() -> Self { Self::new() }
}

#[async_trait]
impl Console for StdConsole {
    fn prompt(&mut self) -> io::Result<()> {
        let mut out = self.out.lock();
        out.write_all(PROMPT.as_bytes())?;
        out.flush()
    }

    async fn read_line(&mut self) -> io::Result<Option<String>> {
        // next_line is cancel safe
        self.lines.next_line().await
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        let mut out = self.out.lock();
        writeln!(out, "{line}")?;
        out.flush()
    }
}
