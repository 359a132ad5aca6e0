//! Property-based tests for the span-stack state machine
//!
//! Invariants under test:
//! 1. Balanced start/end sequences always leave the stack empty
//! 2. Aggregation counts equal the number of ends resolved per log path
//! 3. Elapsed duration is floored at 0.001ms for any clock values
//! 4. Log paths compose as parent#child for arbitrary names
//! 5. Trace admission is capped per path while aggregation keeps counting

use cronometro::tracker::{SpanTracker, TrackerConfig};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_balanced_nesting_empties_stack(names in prop::collection::vec("[a-z]{1,8}", 1..10)) {
        let mut sw = SpanTracker::default();

        // Open all spans innermost-last, then close in LIFO order.
        sw.start_at("root", 0.0);
        for (i, name) in names.iter().enumerate() {
            sw.start_at(name, (i + 1) as f64);
            prop_assert_eq!(sw.depth(), i + 2);
        }
        for (i, name) in names.iter().enumerate().rev() {
            sw.end_at(name, (100 + i) as f64, None);
        }
        prop_assert_eq!(sw.depth(), 1);
        sw.end_at("root", 1000.0, None);
        prop_assert_eq!(sw.depth(), 0);

        // A root completed, so the reports exist.
        prop_assert!(sw.last_aggregated_report().is_some());
    }

    #[test]
    fn prop_aggregation_count_equals_closes(repeats in 1usize..50) {
        let mut sw = SpanTracker::default();
        sw.start_at("root", 0.0);
        for i in 0..repeats {
            let t = i as f64;
            sw.start_at("child", t);
            sw.end_at("child", t + 0.25, None);
        }
        sw.end_at("root", 10_000.0, None);

        let report = sw.last_aggregated_report().unwrap();
        prop_assert_eq!(report.entries["root#child"].count, repeats as u64);
        prop_assert_eq!(report.entries["root"].count, 1);
        prop_assert_eq!(report.entries.len(), 2);
    }

    #[test]
    fn prop_elapsed_floor_for_any_clock(start in -1.0e6..1.0e6f64, end in -1.0e6..1.0e6f64) {
        let mut sw = SpanTracker::default();
        sw.start_at("root", start);
        sw.end_at("root", end, None);

        let report = sw.last_aggregated_report().unwrap();
        prop_assert!(report.entries["root"].total_ms >= 0.001);
    }

    #[test]
    fn prop_log_path_composition(outer in "[a-z]{1,8}", inner in "[a-z]{1,8}") {
        let mut sw = SpanTracker::default();
        sw.start_at(&outer, 0.0);
        sw.start_at(&inner, 1.0);
        sw.end_at(&inner, 2.0, None);
        sw.end_at(&outer, 3.0, None);

        let report = sw.last_aggregated_report().unwrap();
        let expected = format!("{outer}#{inner}");
        prop_assert!(report.entries.contains_key(&expected));
    }

    #[test]
    fn prop_trace_cap_bounds_buffer_not_table(closes in 1u64..40, cap in 1u64..40) {
        let config = TrackerConfig::new()
            .with_max_tracing_spans_per_path(cap)
            .with_min_tracing_ms(0.0);
        let mut sw = SpanTracker::new(config);

        sw.start_at("root", 0.0);
        for i in 0..closes {
            let t = i as f64;
            sw.start_at("loop", t);
            sw.end_at("loop", t + 0.5, None);
        }
        sw.end_at("root", 1000.0, None);

        let traced = sw
            .last_trace_report()
            .unwrap()
            .iter()
            .filter(|t| t.name == "loop")
            .count() as u64;
        prop_assert_eq!(traced, closes.min(cap));

        let report = sw.last_aggregated_report().unwrap();
        prop_assert_eq!(report.entries["root#loop"].count, closes);
    }

    #[test]
    fn prop_lenient_mode_never_panics_on_misuse(
        ops in prop::collection::vec(prop::bool::ANY, 1..30),
    ) {
        let config = TrackerConfig::new().with_strict_assert(false);
        let mut sw = SpanTracker::new(config);

        // Arbitrary interleaving of starts and ends must never panic in
        // lenient mode, whatever state it leaves behind.
        let mut t = 0.0;
        for op in ops {
            t += 1.0;
            if op {
                sw.start_at("a", t);
            } else {
                sw.end_at("b", t, None);
            }
        }
    }
}
