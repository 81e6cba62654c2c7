//! Stack samples and stability tracking.

use std::time::Duration;

use inspect_debug_core::{CallFrame, SourceLocation};

/// One stack sample taken by forcing a pause.
#[derive(Debug, Clone, PartialEq)]
pub struct StackSample {
    /// Top-of-stack location, if the target reported frames
    pub location: Option<SourceLocation>,
    /// Full call stack
    pub call_stack: Vec<CallFrame>,
    /// Time since the run started
    pub elapsed: Duration,
}

/// Counts consecutive samples at the same location.
///
/// Locations compare by file and line; columns are ignored so a loop body
/// spanning several expressions on one line still counts as one location.
/// A sample without a location breaks the current run.
#[derive(Debug, Clone, Default)]
pub struct StabilityTracker {
    last: Option<(String, u32)>,
    current_run: usize,
    longest_run: usize,
    samples: usize,
}

impl StabilityTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sample location; returns the current run length.
    pub fn record(&mut self, location: Option<&SourceLocation>) -> usize {
        self.samples += 1;
        let key = location.map(|loc| (loc.file.clone(), loc.line));

        match (&self.last, &key) {
            (Some(last), Some(key)) if last == key => self.current_run += 1,
            (_, Some(_)) => self.current_run = 1,
            (_, None) => self.current_run = 0,
        }
        self.last = key;
        self.longest_run = self.longest_run.max(self.current_run);
        self.current_run
    }

    /// Length of the run ending at the latest sample.
    pub fn current_run(&self) -> usize {
        self.current_run
    }

    /// Longest run seen so far.
    pub fn longest_run(&self) -> usize {
        self.longest_run
    }

    /// Number of samples recorded.
    pub fn sample_count(&self) -> usize {
        self.samples
    }

    /// Whether the latest `min_run` samples share one location.
    pub fn is_stable(&self, min_run: usize) -> bool {
        min_run > 0 && self.current_run >= min_run
    }
}
