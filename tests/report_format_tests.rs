//! Formatted report output tests
//!
//! Pins the exact text produced by `format_report` for the canonical
//! scenario: sorting, indentation by depth, bucket columns, truncated
//! percentages, and the annotation footer.

use cronometro::report::format_report;
use cronometro::tracker::SpanTracker;

fn run_scenario(sw: &mut SpanTracker) {
    sw.add_annotation_at("Cooltag", "1", 25.0);
    sw.add_slow_annotation("Slowtag", 100.0);
    sw.add_slow_annotation("MegaSlowtag", 1000.0);

    sw.start_at("root", 20.0);
    sw.start_at("child1", 40.0);
    sw.start_at("grand_children1", 60.0);
    sw.end_at("grand_children1", 80.0, None);
    sw.start_at("grand_children2", 100.0);
    sw.end_at("grand_children2", 120.0, None);
    sw.end_at("child1", 140.0, Some("BUCKET_A"));
    sw.start_at("child1", 160.0);
    sw.start_at("grand_children3", 180.0);
    sw.end_at("grand_children3", 190.0, None);
    sw.start_at("grand_children2", 220.0);
    sw.end_at("grand_children2", 280.0, None);
    sw.end_at("child1", 300.0, Some("BUCKET_A"));
    sw.start_at("child2", 320.0);
    sw.start_at("grand_children3", 380.0);
    sw.end_at("grand_children3", 390.0, None);
    sw.start_at("grand_children1", 520.0);
    sw.end_at("grand_children1", 780.0, None);
    sw.end_at("child2", 880.0, Some("BUCKET_B"));
    sw.end_at("root", 920.0, None);
}

#[test]
fn test_format_report_full_scenario() {
    let mut sw = SpanTracker::default();
    run_scenario(&mut sw);

    let formatted = format_report(sw.last_aggregated_report().unwrap()).unwrap();
    let expected = [
        "************************",
        "***   Span Report   ***",
        "************************",
        "root                    900000.000ms (100%)",
        "    BUCKET_A        child1                  2  240000.000ms (26%)",
        "                        grand_children1         1  20000.000ms (2%)",
        "                        grand_children2         2  80000.000ms (8%)",
        "                        grand_children3         1  10000.000ms (1%)",
        "    BUCKET_B        child2                  1  560000.000ms (62%)",
        "                        grand_children1         1  260000.000ms (28%)",
        "                        grand_children3         1  10000.000ms (1%)",
        "Annotations: Cooltag, Slowtag",
    ]
    .join("\n");
    assert_eq!(formatted, expected);
}

#[test]
fn test_format_report_percentages_truncate() {
    let mut sw = SpanTracker::default();
    run_scenario(&mut sw);

    let formatted = format_report(sw.last_aggregated_report().unwrap()).unwrap();
    // 240000/900000 = 26.67%: truncated, never rounded up.
    assert!(formatted.contains("(26%)"));
    assert!(!formatted.contains("(27%)"));
}

#[test]
fn test_format_report_root_line_shows_mean() {
    let mut sw = SpanTracker::default();
    sw.start_at("root", 0.0);
    sw.end_at("root", 2.0, None);

    let formatted = format_report(sw.last_aggregated_report().unwrap()).unwrap();
    assert!(formatted.contains("root                    2000.000ms (100%)"));
    assert!(formatted.ends_with("Annotations: "));
}
