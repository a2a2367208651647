//! Session transcripts.
//!
//! Markup destinations (`.svg`, `.html`, `.htm`) get each line escaped with spaces turned
//! into `&#160;` so the layout survives rendering; everything else is written verbatim.

use std::{
    borrow::Cow,
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use crate::error::TranscriptError;

type Result<T> = std::result::Result<T, TranscriptError>;

const MARKUP_EXTENSIONS: [&str; 3] = ["svg", "html", "htm"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptFormat {
    Plain,
    Markup,
}

impl TranscriptFormat {
    /// Picks the format from the file extension, case-insensitively.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        let markup = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                MARKUP_EXTENSIONS
                    .iter()
                    .any(|m| ext.eq_ignore_ascii_case(m))
            });
        if markup { Self::Markup } else { Self::Plain }
    }

    #[must_use]
    pub fn render(self, line: &str) -> Cow<'_, str> {
        match self {
            Self::Plain => Cow::Borrowed(line),
            Self::Markup => {
                let mut out = String::with_capacity(line.len());
                for c in line.chars() {
                    match c {
                        '&' => out.push_str("&amp;"),
                        '<' => out.push_str("&lt;"),
                        '>' => out.push_str("&gt;"),
                        ' ' => out.push_str("&#160;"),
                        c => out.push(c),
                    }
                }
                Cow::Owned(out)
            }
        }
    }
}

/// A file mirroring the session output, one rendered line at a time.
///
/// Every line is flushed as it is written, so the file survives an abrupt exit.
#[derive(Debug)]
pub struct Transcript {
    path: PathBuf,
    format: TranscriptFormat,
    file: BufWriter<File>,
}

impl Transcript {
    /// Creates (or truncates) the transcript file.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|source| TranscriptError {
            path: path.clone(),
            source,
        })?;
        let format = TranscriptFormat::from_path(&path);
        tracing::debug!(path = %path.display(), ?format, "transcript opened");
        Ok(Self {
            path,
            format,
            file: BufWriter::new(file),
        })
    }

    #[must_use]
    pub fn format(&self) -> TranscriptFormat { self.format }

    #[must_use]
    pub fn path(&self) -> &Path { &self.path }

    /// Appends one rendered line and flushes it to disk.
    pub fn write(&mut self, line: &str) -> Result<()> {
        writeln!(self.file, "{}", self.format.render(line))
            .and_then(|()| self.file.flush())
            .map_err(|e| self.error(e))
    }

    /// Flushes and closes the file.
    pub fn close(mut self) -> Result<()> {
        self.file.flush().map_err(|e| self.error(e))?;
        tracing::debug!(path = %self.path.display(), "transcript closed");
        Ok(())
    }

    fn error(&self, source: std::io::Error) -> TranscriptError {
        TranscriptError {
            path: self.path.clone(),
            source,
        }
    }
}
