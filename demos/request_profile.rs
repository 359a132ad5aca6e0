//! Demo: instrument a simulated request and print the aggregated report
//!
//! Run with: cargo run --example request_profile

use cronometro::report::format_report;
use cronometro::tracker::{SpanTracker, TrackerConfig};
use std::thread;
use std::time::Duration;

fn fetch_user(sw: &mut SpanTracker) {
    let mut span = sw.span("fetch_user");
    span.set_bucket("DATABASE");
    thread::sleep(Duration::from_millis(20));
}

fn fetch_items(sw: &mut SpanTracker) {
    // Same log path on every loop iteration: the report aggregates all ten
    // queries into one line while the trace keeps individual spans.
    for _ in 0..10 {
        let mut span = sw.span("fetch_item");
        span.set_bucket("DATABASE");
        thread::sleep(Duration::from_millis(5));
    }
}

fn render(sw: &mut SpanTracker) {
    let _span = sw.span("render");
    thread::sleep(Duration::from_millis(10));
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = TrackerConfig::new()
        .with_tracing_export(|traces| {
            eprintln!("traced {} spans", traces.len());
        })
        .with_aggregated_export(|report| {
            if let Some(text) = format_report(report) {
                println!("{text}");
            }
        });

    let mut sw = SpanTracker::new(config);
    sw.add_annotation("request.id", "b7ad6b7169203331");
    sw.add_slow_annotation("slow_request", 0.050);

    {
        let mut request = sw.span("request");
        fetch_user(&mut request);
        fetch_items(&mut request);
        render(&mut request);
    }
}
