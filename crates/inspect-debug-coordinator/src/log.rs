//! Bounded log aggregated across targets.

use std::collections::VecDeque;

use chrono::Utc;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use inspect_debug_core::{LogEntry, LogLevel, TargetId};

/// Insertion-ordered log that evicts its oldest entry once full.
///
/// Sequence numbers and timestamps are assigned by [`append`](Self::append),
/// so callers holding the log behind a lock get entries whose order matches
/// both fields.
#[derive(Debug)]
pub struct AggregatedLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
    next_sequence: u64,
}

impl AggregatedLog {
    /// Create a log holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
            next_sequence: 0,
        }
    }

    /// Append an entry, evicting the oldest one when at capacity.
    pub fn append(
        &mut self,
        target_id: &TargetId,
        target_name: &str,
        level: LogLevel,
        message: impl Into<String>,
    ) -> LogEntry {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }

        let entry = LogEntry {
            sequence: self.next_sequence,
            timestamp: Utc::now(),
            target_id: target_id.clone(),
            target_name: target_name.to_string(),
            level,
            message: message.into(),
        };
        self.next_sequence += 1;
        self.entries.push_back(entry.clone());
        entry
    }

    /// Entries matching `query`, oldest first.
    pub fn query(&self, query: &LogQuery) -> Vec<LogEntry> {
        let matching: Vec<&LogEntry> = self
            .entries
            .iter()
            .filter(|entry| query.matches(entry))
            .collect();

        let skip = match query.limit {
            Some(limit) => matching.len().saturating_sub(limit),
            None => 0,
        };
        matching.into_iter().skip(skip).cloned().collect()
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of retained entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total entries ever appended, including evicted ones.
    pub fn total_appended(&self) -> u64 {
        self.next_sequence
    }

    /// Drop every entry. Sequence numbers keep increasing.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Filter for reading the aggregated log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LogQuery {
    /// Only entries from this target
    pub target_id: Option<TargetId>,
    /// Only entries of this level
    pub level: Option<LogLevel>,
    /// Only the newest `limit` matching entries
    pub limit: Option<usize>,
}

impl LogQuery {
    /// Match every entry.
    pub fn all() -> Self {
        Self::default()
    }

    /// Restrict to one target.
    pub fn for_target(mut self, target_id: impl Into<TargetId>) -> Self {
        self.target_id = Some(target_id.into());
        self
    }

    /// Restrict to one level.
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = Some(level);
        self
    }

    /// Keep only the newest `limit` matches.
    pub fn tail(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, entry: &LogEntry) -> bool {
        self.target_id
            .as_ref()
            .map_or(true, |id| *id == entry.target_id)
            && self.level.map_or(true, |level| level == entry.level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(log: &mut AggregatedLog, target: &str, count: usize) {
        let id = TargetId::from(target);
        for i in 0..count {
            log.append(&id, target, LogLevel::Stdout, format!("{target}-{i}"));
        }
    }

    #[test]
    fn test_append_assigns_increasing_sequence() {
        let mut log = AggregatedLog::new(10);
        let a = log.append(&TargetId::from("a"), "a", LogLevel::Stdout, "one");
        let b = log.append(&TargetId::from("b"), "b", LogLevel::Stderr, "two");
        assert_eq!(a.sequence + 1, b.sequence);
        assert!(a.timestamp <= b.timestamp);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_eviction_drops_oldest() {
        let mut log = AggregatedLog::new(3);
        fill(&mut log, "a", 5);

        let messages: Vec<String> = log
            .query(&LogQuery::all())
            .into_iter()
            .map(|e| e.message)
            .collect();
        assert_eq!(messages, vec!["a-2", "a-3", "a-4"]);
        assert_eq!(log.total_appended(), 5);
    }

    #[test]
    fn test_query_filters_and_tail() {
        let mut log = AggregatedLog::new(20);
        fill(&mut log, "api", 3);
        fill(&mut log, "worker", 2);
        log.append(&TargetId::from("api"), "api", LogLevel::Debug, "paused");

        assert_eq!(log.query(&LogQuery::all().for_target("worker")).len(), 2);
        assert_eq!(log.query(&LogQuery::all().with_level(LogLevel::Debug)).len(), 1);

        let tail = log.query(&LogQuery::all().for_target("api").tail(2));
        let messages: Vec<&str> = tail.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["api-2", "paused"]);
    }

    #[test]
    fn test_zero_capacity_keeps_one_entry() {
        let mut log = AggregatedLog::new(0);
        fill(&mut log, "a", 2);
        assert_eq!(log.capacity(), 1);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_clear() {
        let mut log = AggregatedLog::new(4);
        fill(&mut log, "a", 2);
        log.clear();
        assert!(log.is_empty());
        let next = log.append(&TargetId::from("a"), "a", LogLevel::Stdout, "x");
        assert_eq!(next.sequence, 2);
    }
}
