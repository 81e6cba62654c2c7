//! Hang detection result types.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{CallFrame, SourceLocation};

/// Outcome of a hang detection run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum HangVerdict {
    /// Location stopped advancing and the timeout elapsed
    Hung,
    /// Target exited before the timeout
    Completed,
    /// Timeout elapsed but the location kept changing (slow, not stuck)
    TimedOut,
}

/// Result of one hang detection run.
///
/// Serialized output also carries a `hung` flag derived from the verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(into = "HangDetectionReport")]
pub struct HangDetectionResult {
    /// Classification
    pub verdict: HangVerdict,
    /// Last location observed by sampling
    pub location: Option<SourceLocation>,
    /// Last call stack observed by sampling
    pub call_stack: Vec<CallFrame>,
    /// Number of samples taken
    pub sample_count: usize,
    /// Longest run of consecutive samples at the same location
    pub longest_stable_run: usize,
    /// Time from start to classification in milliseconds
    pub elapsed_ms: u64,
}

/// Serialized form of [`HangDetectionResult`].
#[derive(Serialize, JsonSchema)]
struct HangDetectionReport {
    hung: bool,
    verdict: HangVerdict,
    location: Option<SourceLocation>,
    call_stack: Vec<CallFrame>,
    sample_count: usize,
    longest_stable_run: usize,
    elapsed_ms: u64,
}

impl From<HangDetectionResult> for HangDetectionReport {
    fn from(result: HangDetectionResult) -> Self {
        Self {
            hung: result.hung(),
            verdict: result.verdict,
            location: result.location,
            call_stack: result.call_stack,
            sample_count: result.sample_count,
            longest_stable_run: result.longest_stable_run,
            elapsed_ms: result.elapsed_ms,
        }
    }
}

impl HangDetectionResult {
    /// Whether the target was classified as hung.
    pub fn hung(&self) -> bool {
        self.verdict == HangVerdict::Hung
    }

    /// Whether the target ran to completion.
    pub fn completed(&self) -> bool {
        self.verdict == HangVerdict::Completed
    }

    /// Whether the run was inconclusive.
    pub fn timed_out(&self) -> bool {
        self.verdict == HangVerdict::TimedOut
    }
}
