//! The stdout line protocol between the capture helper and its supervisor
//!
//! One event per line, tag first, then a single space and the payload:
//!
//! ```text
//! READY: Global key monitoring started
//! KEY: KeyA
//! RELEASE: KeyA
//! ERROR: Failed to create event tap
//! SHUTDOWN: Received SIGTERM
//! ```
//!
//! Key lines carry canonical key names; lifecycle lines carry free text.
//! Every line is flushed as it is written so a pipe reader sees events
//! without delay.

use std::io::{self, Write};

use crate::event::{KeyEvent, KeyKind};

/// A single protocol line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// Capture is installed and key lines will follow.
    Ready(String),
    /// A key went down.
    Key(String),
    /// A key came back up.
    Release(String),
    /// Capture could not be installed. The helper stays alive but inert.
    Error(String),
    /// The helper is exiting in response to a signal.
    Shutdown(String),
}

/// Line that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LineParseError {
    #[error("empty line")]
    Empty,

    #[error("unknown line tag: {0}")]
    UnknownTag(String),
}

impl Line {
    pub fn tag(&self) -> &'static str {
        match self {
            Line::Ready(_) => "READY:",
            Line::Key(_) => "KEY:",
            Line::Release(_) => "RELEASE:",
            Line::Error(_) => "ERROR:",
            Line::Shutdown(_) => "SHUTDOWN:",
        }
    }

    pub fn payload(&self) -> &str {
        match self {
            Line::Ready(payload)
            | Line::Key(payload)
            | Line::Release(payload)
            | Line::Error(payload)
            | Line::Shutdown(payload) => payload,
        }
    }

    /// Parse one newline-stripped line.
    ///
    /// The payload is everything after the first space; a line with no
    /// space at all is a tag with an empty payload.
    pub fn parse(line: &str) -> Result<Self, LineParseError> {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            return Err(LineParseError::Empty);
        }

        let (tag, payload) = match line.split_once(' ') {
            Some((tag, payload)) => (tag, payload),
            None => (line, ""),
        };

        match tag {
            "READY:" => Ok(Line::Ready(payload.to_string())),
            "KEY:" => Ok(Line::Key(payload.to_string())),
            "RELEASE:" => Ok(Line::Release(payload.to_string())),
            "ERROR:" => Ok(Line::Error(payload.to_string())),
            "SHUTDOWN:" => Ok(Line::Shutdown(payload.to_string())),
            other => Err(LineParseError::UnknownTag(other.to_string())),
        }
    }

    /// The key transition carried by this line, if it is a key line.
    pub fn key_event(&self) -> Option<KeyEvent> {
        match self {
            Line::Key(name) => Some(KeyEvent::press(name.clone())),
            Line::Release(name) => Some(KeyEvent::release(name.clone())),
            _ => None,
        }
    }
}

impl std::fmt::Display for Line {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.tag(), self.payload())
    }
}

impl From<&KeyEvent> for Line {
    fn from(event: &KeyEvent) -> Self {
        match event.kind {
            KeyKind::Press => Line::Key(event.name.to_string()),
            KeyKind::Release => Line::Release(event.name.to_string()),
        }
    }
}

/// Writes protocol lines, flushing after every one.
pub struct LineEmitter<W: Write> {
    out: W,
}

impl LineEmitter<io::Stdout> {
    /// Emitter over the process stdout.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> LineEmitter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Write one line and flush it.
    pub fn emit(&mut self, line: &Line) -> io::Result<()> {
        writeln!(self.out, "{line}")?;
        self.out.flush()
    }

    pub fn key_event(&mut self, event: &KeyEvent) -> io::Result<()> {
        self.emit(&Line::from(event))
    }

    pub fn ready(&mut self, message: &str) -> io::Result<()> {
        self.emit(&Line::Ready(message.to_string()))
    }

    pub fn error(&mut self, message: &str) -> io::Result<()> {
        self.emit(&Line::Error(message.to_string()))
    }

    pub fn shutdown(&mut self, message: &str) -> io::Result<()> {
        self.emit(&Line::Shutdown(message.to_string()))
    }
}
