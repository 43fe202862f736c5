//! User-visible session log.
//!
//! This is the scrolling log a viewer sees, not diagnostic logging (that goes
//! through the `log` facade). Lines are timestamped with local wall-clock time
//! and the buffer keeps only the newest `capacity` lines.

use std::collections::VecDeque;
use std::fmt;

pub const DEFAULT_LOG_CAPACITY: usize = 200;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogKind {
    System,
    Error,
    /// Backend-supplied, stored verbatim.
    Backend,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogLine {
    /// Local time, `HH:MM:SS`.
    pub at: String,
    pub kind: LogKind,
    pub text: String,
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.at, self.text)
    }
}

#[derive(Clone, Debug)]
pub struct SessionLog {
    lines: VecDeque<LogLine>,
    capacity: usize,
    dropped: u64,
}

impl SessionLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            dropped: 0,
        }
    }

    pub fn system(&mut self, message: impl AsRef<str>) {
        self.push(LogKind::System, format!("[System] {}", message.as_ref()));
    }

    pub fn error(&mut self, message: impl AsRef<str>) {
        self.push(LogKind::Error, format!("[Error] {}", message.as_ref()));
    }

    /// Append backend log lines exactly as received.
    pub fn extend_backend<I, S>(&mut self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for line in lines {
            self.push(LogKind::Backend, line.into());
        }
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn lines(&self) -> impl Iterator<Item = &LogLine> {
        self.lines.iter()
    }

    pub fn last(&self) -> Option<&LogLine> {
        self.lines.back()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Lines evicted because the buffer was full.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn count(&self, kind: LogKind) -> usize {
        self.lines.iter().filter(|line| line.kind == kind).count()
    }

    fn push(&mut self, kind: LogKind, text: String) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
            self.dropped += 1;
        }
        self.lines.push_back(LogLine {
            at: chrono::Local::now().format("%H:%M:%S").to_string(),
            kind,
            text,
        });
    }
}

impl Default for SessionLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}
