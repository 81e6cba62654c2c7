//! Property-based tests for the aggregated log.
//!
//! Uses proptest to generate append sequences from several targets and
//! verify the bounded FIFO behaviour.

use proptest::prelude::*;

use inspect_debug_core::{LogLevel, TargetId};
use inspect_debug_coordinator::{AggregatedLog, LogQuery};

fn level() -> impl Strategy<Value = LogLevel> {
    prop_oneof![
        Just(LogLevel::Stdout),
        Just(LogLevel::Stderr),
        Just(LogLevel::Debug),
    ]
}

fn appends() -> impl Strategy<Value = Vec<(u8, LogLevel)>> {
    prop::collection::vec((0u8..4, level()), 0..200)
}

proptest! {
    /// The log never exceeds capacity and keeps exactly the newest entries in order.
    #[test]
    fn retains_newest_entries_in_order(capacity in 1usize..40, appends in appends()) {
        let mut log = AggregatedLog::new(capacity);
        for (i, (target, level)) in appends.iter().enumerate() {
            let id = TargetId::new(format!("t{target}"));
            log.append(&id, id.as_str(), *level, format!("m{i}"));
            prop_assert!(log.len() <= capacity);
        }

        let retained = log.query(&LogQuery::all());
        let expected_len = appends.len().min(capacity);
        prop_assert_eq!(retained.len(), expected_len);

        let first = appends.len() - expected_len;
        for (offset, entry) in retained.iter().enumerate() {
            let index = first + offset;
            prop_assert_eq!(entry.sequence, index as u64);
            prop_assert_eq!(&entry.message, &format!("m{index}"));
            prop_assert_eq!(entry.level, appends[index].1);
        }
    }

    /// Filtered tails are suffixes of the filtered log.
    #[test]
    fn filtered_tail_is_suffix(appends in appends(), limit in 0usize..20) {
        let mut log = AggregatedLog::new(64);
        for (i, (target, level)) in appends.iter().enumerate() {
            let id = TargetId::new(format!("t{target}"));
            log.append(&id, id.as_str(), *level, format!("m{i}"));
        }

        let all = log.query(&LogQuery::all().for_target("t1"));
        let tail = log.query(&LogQuery::all().for_target("t1").tail(limit));
        prop_assert_eq!(tail.len(), all.len().min(limit));
        prop_assert_eq!(&all[all.len() - tail.len()..], &tail[..]);
        prop_assert!(tail.iter().all(|e| e.target_id.as_str() == "t1"));
    }
}
