//! Property-based tests for stability tracking.

use proptest::prelude::*;

use inspect_debug_core::SourceLocation;
use inspect_debug_detector::StabilityTracker;

fn sample() -> impl Strategy<Value = Option<(u32, u32)>> {
    prop_oneof![
        1 => Just(None),
        8 => (1u32..4, 1u32..6).prop_map(Some),
    ]
}

fn location(line: u32, column: u32) -> SourceLocation {
    SourceLocation::new("/app/main.js", line, column)
}

proptest! {
    /// The current run equals the number of trailing samples on the latest line.
    #[test]
    fn current_run_counts_trailing_identical_lines(samples in prop::collection::vec(sample(), 1..64)) {
        let mut tracker = StabilityTracker::new();
        for s in &samples {
            let loc = s.map(|(line, column)| location(line, column));
            tracker.record(loc.as_ref());
        }

        let expected = match samples.last().copied().flatten() {
            None => 0,
            Some((line, _)) => samples
                .iter()
                .rev()
                .take_while(|s| matches!(s, Some((l, _)) if *l == line))
                .count(),
        };
        prop_assert_eq!(tracker.current_run(), expected);
        prop_assert_eq!(tracker.sample_count(), samples.len());
        prop_assert!(tracker.longest_run() >= tracker.current_run());
        prop_assert!(tracker.longest_run() <= samples.len());
    }

    /// Stability at `n` implies stability at every smaller positive run length.
    #[test]
    fn stability_is_monotonic(samples in prop::collection::vec(sample(), 1..32), min in 1usize..8) {
        let mut tracker = StabilityTracker::new();
        for s in &samples {
            let loc = s.map(|(line, column)| location(line, column));
            tracker.record(loc.as_ref());
        }
        if tracker.is_stable(min) {
            for smaller in 1..min {
                prop_assert!(tracker.is_stable(smaller));
            }
        }
        prop_assert!(!tracker.is_stable(0));
    }
}
