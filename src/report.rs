//! Aggregated reports and the plain-text report formatter
//!
//! One `AggregationEntry` accumulates every close of a given log path since
//! the last root completion. The formatter is a pure function from a
//! completed snapshot to deterministic multi-line text.

use crate::span::{Span, PATH_SEPARATOR};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Accumulated timing for one log path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AggregationEntry {
    /// Total milliseconds across all closes of this path
    pub total_ms: f64,
    /// Number of closes resolved to this path
    pub count: u64,
    /// Caller-supplied bucket label; first provided value wins
    pub bucket: Option<String>,
}

impl AggregationEntry {
    /// Mean milliseconds per close
    pub fn mean_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_ms / self.count as f64
        }
    }
}

/// Snapshot produced when a root span closes
///
/// `entries` maps log path to its accumulated entry; `root` is the closed
/// root span carrying its final annotations. Callers must treat a snapshot
/// as read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedReport {
    pub entries: HashMap<String, AggregationEntry>,
    pub root: Span,
}

impl AggregatedReport {
    /// Total milliseconds accumulated by the root path
    pub fn root_total_ms(&self) -> f64 {
        self.entries
            .get(&self.root.log_path)
            .map(|entry| entry.total_ms)
            .unwrap_or_default()
    }

    /// Serialize the snapshot to JSON for export callbacks
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Render a completed snapshot as a human-readable report
///
/// Lines are sorted lexicographically by log path. The root line shows the
/// mean duration and 100%; every other line shows indentation by nesting
/// depth, the bucket label (blank if none), the last path segment, the
/// occurrence count, the accumulated duration, and the percentage of the
/// root's accumulated duration truncated to a whole integer. The report
/// closes with the sorted annotation keys of the root span.
///
/// Returns None when the snapshot has no entries.
pub fn format_report(report: &AggregatedReport) -> Option<String> {
    let mut log_paths: Vec<&String> = report.entries.keys().collect();
    if log_paths.is_empty() {
        return None;
    }
    log_paths.sort();

    // The root sorts first: every other path extends it with '#'.
    let root_path = log_paths[0].as_str();
    let root_entry = &report.entries[root_path];
    let root_total = root_entry.total_ms;

    let mut buf = vec![
        "************************".to_string(),
        "***   Span Report   ***".to_string(),
        "************************".to_string(),
        format!("{:<20}    {:.3}ms (100%)", root_path, root_entry.mean_ms()),
    ];

    for log_path in &log_paths[1..] {
        let entry = &report.entries[*log_path];
        let depth = log_path[root_path.len()..]
            .chars()
            .filter(|&c| c == PATH_SEPARATOR)
            .count();
        let short_name = match log_path.rfind(PATH_SEPARATOR) {
            Some(pos) => &log_path[pos + 1..],
            None => log_path.as_str(),
        };
        let bucket_name = entry.bucket.as_deref().unwrap_or("");
        let percent = (entry.total_ms / root_total * 100.0) as u64;

        buf.push(format!(
            "{}{:<12}    {:<20} {:>4}  {:.3}ms ({}%)",
            "    ".repeat(depth),
            bucket_name,
            short_name,
            entry.count,
            entry.total_ms,
            percent,
        ));
    }

    let mut keys: Vec<&str> = report
        .root
        .annotations
        .iter()
        .map(|a| a.key.as_str())
        .collect();
    keys.sort_unstable();
    keys.dedup();
    buf.push(format!("Annotations: {}", keys.join(", ")));

    Some(buf.join("\n"))
}
