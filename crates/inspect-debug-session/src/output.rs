//! Bounded per-session output buffer.

use std::collections::VecDeque;

use inspect_debug_core::LogLevel;

/// One captured line of target output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    /// Position in the session's output
    pub sequence: u64,
    /// Stream the line came from
    pub level: LogLevel,
    /// Line text
    pub text: String,
}

/// Line buffer that keeps the newest `capacity` lines.
#[derive(Debug)]
pub struct OutputBuffer {
    lines: VecDeque<OutputLine>,
    capacity: usize,
    next_sequence: u64,
    /// Sequence of the first line not yet returned by a read
    read_cursor: u64,
}

impl OutputBuffer {
    /// Create a buffer holding at most `capacity` lines.
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
            next_sequence: 0,
            read_cursor: 0,
        }
    }

    /// Append a line, evicting the oldest one when full.
    pub fn append(&mut self, level: LogLevel, text: impl Into<String>) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(OutputLine {
            sequence: self.next_sequence,
            level,
            text: text.into(),
        });
        self.next_sequence += 1;
    }

    /// Every retained line; marks everything as read.
    pub fn read_all(&mut self) -> OutputRead {
        let lines: Vec<OutputLine> = self.lines.iter().cloned().collect();
        let dropped = self.oldest_sequence().saturating_sub(self.read_cursor);
        self.read_cursor = self.next_sequence;
        OutputRead::new(lines, dropped)
    }

    /// Lines appended since the previous read.
    pub fn read_since_last(&mut self) -> OutputRead {
        let oldest = self.oldest_sequence();
        let dropped = oldest.saturating_sub(self.read_cursor);
        let lines: Vec<OutputLine> = self
            .lines
            .iter()
            .filter(|line| line.sequence >= self.read_cursor)
            .cloned()
            .collect();
        self.read_cursor = self.next_sequence;
        OutputRead::new(lines, dropped)
    }

    fn oldest_sequence(&self) -> u64 {
        self.lines
            .front()
            .map_or(self.next_sequence, |line| line.sequence)
    }

    /// Number of retained lines.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Whether the buffer holds no lines.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Lines appended but not yet read (including evicted ones).
    pub fn unread_count(&self) -> u64 {
        self.next_sequence - self.read_cursor
    }

    /// Drop every line.
    pub fn clear(&mut self) {
        self.lines.clear();
        self.read_cursor = self.next_sequence;
    }
}

/// Result of reading session output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRead {
    /// Lines joined with `\n`
    pub output: String,
    /// Individual lines
    pub lines: Vec<OutputLine>,
    /// Unread lines that were evicted before this read
    pub dropped: u64,
}

impl OutputRead {
    fn new(lines: Vec<OutputLine>, dropped: u64) -> Self {
        let output = lines
            .iter()
            .map(|line| line.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        Self {
            output,
            lines,
            dropped,
        }
    }
}
