//! Span-stack state machine
//!
//! `SpanTracker` owns the span stack, aggregation table, trace buffer, and
//! annotation bookkeeping for one logical execution context (one request, one
//! thread, one task). It is deliberately single-owner: every method takes
//! `&mut self` and nothing blocks or yields. Use one tracker per independent
//! unit of concurrent work (see [`crate::registry`] for the per-thread
//! convenience wrapper).
//!
//! Closing the outermost ("root") span produces two artifacts: an aggregated
//! per-path report and an ordered trace list, both handed to the configured
//! export callbacks, after which all per-root state is reset.

use crate::error::ContractViolation;
use crate::report::{AggregatedReport, AggregationEntry};
use crate::span::{Annotation, Span};
use std::collections::HashMap;
use std::fmt;
use std::mem;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Pluggable time source: current time in seconds
pub type ClockFn = Arc<dyn Fn() -> f64 + Send + Sync>;

/// Callback invoked with the ordered trace list when a root span completes
pub type TracingExportFn = Arc<dyn Fn(&[Span]) + Send + Sync>;

/// Callback invoked with the aggregated snapshot when a root span completes
pub type AggregatedExportFn = Arc<dyn Fn(&AggregatedReport) + Send + Sync>;

/// Default clock: wall-clock seconds since the UNIX epoch
pub fn wall_clock_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

/// Construction-time configuration for a tracker
///
/// Cloning shares the clock and export callbacks, so one config can seed any
/// number of trackers (the registry relies on this).
#[derive(Clone)]
pub struct TrackerConfig {
    /// Panic on stack misuse (caller bug) instead of tolerating it
    pub strict_assert: bool,
    /// Trace-buffer admission cap per log path
    pub max_tracing_spans_per_path: u64,
    /// Trace-buffer admission floor on span duration
    pub min_tracing_ms: f64,
    clock: ClockFn,
    tracing_export: TracingExportFn,
    aggregated_export: AggregatedExportFn,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            strict_assert: true,
            max_tracing_spans_per_path: 1000,
            min_tracing_ms: 3.0,
            clock: Arc::new(wall_clock_seconds),
            tracing_export: Arc::new(|_| {}),
            aggregated_export: Arc::new(|_| {}),
        }
    }
}

impl TrackerConfig {
    /// Create a config with the documented defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Panic on stack misuse (true) vs. tolerate it silently (false)
    pub fn with_strict_assert(mut self, strict: bool) -> Self {
        self.strict_assert = strict;
        self
    }

    /// Cap the number of traced spans per unique log path per root
    pub fn with_max_tracing_spans_per_path(mut self, max: u64) -> Self {
        self.max_tracing_spans_per_path = max;
        self
    }

    /// Skip tracing spans shorter than this many milliseconds
    pub fn with_min_tracing_ms(mut self, min_ms: f64) -> Self {
        self.min_tracing_ms = min_ms;
        self
    }

    /// Replace the time source (seconds as f64), for deterministic testing
    pub fn with_clock(mut self, clock: impl Fn() -> f64 + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Register the trace-list export callback
    pub fn with_tracing_export(mut self, export: impl Fn(&[Span]) + Send + Sync + 'static) -> Self {
        self.tracing_export = Arc::new(export);
        self
    }

    /// Register the aggregated-snapshot export callback
    pub fn with_aggregated_export(
        mut self,
        export: impl Fn(&AggregatedReport) + Send + Sync + 'static,
    ) -> Self {
        self.aggregated_export = Arc::new(export);
        self
    }
}

impl fmt::Debug for TrackerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackerConfig")
            .field("strict_assert", &self.strict_assert)
            .field("max_tracing_spans_per_path", &self.max_tracing_spans_per_path)
            .field("min_tracing_ms", &self.min_tracing_ms)
            .finish_non_exhaustive()
    }
}

/// Tracks a stack of nested spans and aggregates their timings by log path
pub struct SpanTracker {
    config: TrackerConfig,
    /// Open spans, root first, current span last
    stack: Vec<Span>,
    /// log path -> accumulated entry, since the last root completion
    aggregated: HashMap<String, AggregationEntry>,
    /// Closed spans admitted by the sampling policy, in close order
    traces: Vec<Span>,
    /// Annotations queued for the eventual root span
    pending_annotations: Vec<Annotation>,
    /// tag -> threshold seconds, evaluated when the root closes
    slow_rules: HashMap<String, f64>,
    last_trace_report: Option<Vec<Span>>,
    last_aggregated_report: Option<AggregatedReport>,
}

impl Default for SpanTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

impl SpanTracker {
    /// Create a tracker with the given configuration
    pub fn new(config: TrackerConfig) -> Self {
        SpanTracker {
            config,
            stack: Vec::new(),
            aggregated: HashMap::new(),
            traces: Vec::new(),
            pending_annotations: Vec::new(),
            slow_rules: HashMap::new(),
            last_trace_report: None,
            last_aggregated_report: None,
        }
    }

    /// Current time in seconds from the configured clock
    pub fn now(&self) -> f64 {
        (self.config.clock)()
    }

    /// Number of currently open spans (0 means no root is open)
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Begin a span, starting now
    pub fn start(&mut self, name: &str) {
        let start_time = self.now();
        self.start_at(name, start_time);
    }

    /// Begin a span at an explicit start time (seconds)
    pub fn start_at(&mut self, name: &str, start_time: f64) {
        let parent_path = self.stack.last().map(|span| span.log_path.as_str());
        let span = Span::new(name, start_time, parent_path);
        self.stack.push(span);
    }

    /// End the current span, which must match `name`
    pub fn end(&mut self, name: &str) {
        self.finish(name, None, None);
    }

    /// End the current span, labelling its log path with a bucket
    ///
    /// The first bucket value provided for a path wins; later closes of the
    /// same path never overwrite it.
    pub fn end_in_bucket(&mut self, name: &str, bucket: &str) {
        self.finish(name, None, Some(bucket));
    }

    /// End the current span at an explicit end time (seconds)
    pub fn end_at(&mut self, name: &str, end_time: f64, bucket: Option<&str>) {
        self.finish(name, Some(end_time), bucket);
    }

    /// Begin a scoped span that ends when the guard drops
    ///
    /// The guard derefs to the tracker, so nested spans and annotations can
    /// be made through it. The span is closed on every exit path, including
    /// unwinding; on unwind an `("error", "panic")` annotation is recorded on
    /// the span first.
    pub fn span(&mut self, name: &str) -> SpanGuard<'_> {
        self.start(name);
        SpanGuard {
            name: name.to_string(),
            bucket: None,
            tracker: self,
        }
    }

    /// Queue an annotation for the eventual root span
    ///
    /// The annotation attaches when the root closes, not now, so this is
    /// legal even before a root span has started. The timestamp is captured
    /// at call time.
    pub fn add_annotation(&mut self, key: &str, value: &str) {
        let time = self.now();
        self.add_annotation_at(key, value, time);
    }

    /// Queue a root annotation with an explicit timestamp
    pub fn add_annotation_at(&mut self, key: &str, value: &str, time: f64) {
        self.pending_annotations.push(Annotation::new(key, value, time));
    }

    /// Attach an annotation to the currently open span
    ///
    /// Contract violation if no span is open.
    pub fn add_span_annotation(&mut self, key: &str, value: &str) {
        let time = self.now();
        self.add_span_annotation_at(key, value, time);
    }

    /// Attach an annotation to the currently open span with an explicit time
    pub fn add_span_annotation_at(&mut self, key: &str, value: &str, time: f64) {
        match self.stack.last_mut() {
            Some(span) => span.annotations.push(Annotation::new(key, value, time)),
            None => self.violation(ContractViolation::AnnotationWithoutSpan {
                key: key.to_string(),
            }),
        }
    }

    /// Register a rule that annotates the root span with `tag` if the root
    /// takes at least `threshold_seconds`
    ///
    /// Re-registering a tag overwrites its threshold. Rules are cleared when
    /// the root completes.
    pub fn add_slow_annotation(&mut self, tag: &str, threshold_seconds: f64) {
        self.slow_rules.insert(tag.to_string(), threshold_seconds);
    }

    /// Keys of the root annotations queued so far
    pub fn root_annotation_keys(&self) -> Vec<String> {
        self.pending_annotations
            .iter()
            .map(|a| a.key.clone())
            .collect()
    }

    /// Trace list from the most recently completed root (None before any)
    pub fn last_trace_report(&self) -> Option<&[Span]> {
        self.last_trace_report.as_deref()
    }

    /// Aggregated snapshot from the most recently completed root
    pub fn last_aggregated_report(&self) -> Option<&AggregatedReport> {
        self.last_aggregated_report.as_ref()
    }

    fn violation(&self, violation: ContractViolation) {
        if self.config.strict_assert {
            panic!("cronometro contract violation: {violation}");
        }
        tracing::warn!(%violation, "span stack misuse tolerated (strict_assert=false)");
    }

    /// Trace admission: long enough, and the path is not already saturated.
    /// The aggregation table keeps counting unconditionally either way.
    fn should_trace(&self, path_count: u64, elapsed_ms: f64) -> bool {
        elapsed_ms >= self.config.min_tracing_ms
            && path_count <= self.config.max_tracing_spans_per_path
    }

    fn finish(&mut self, name: &str, end_time: Option<f64>, bucket: Option<&str>) {
        let Some(mut span) = self.stack.pop() else {
            self.violation(ContractViolation::EndWithoutStart {
                name: name.to_string(),
            });
            return;
        };

        if span.name != name {
            self.violation(ContractViolation::EndNameMismatch {
                expected: name.to_string(),
                actual: span.name.clone(),
            });
            // Best-effort resynchronization after misuse: keep popping until
            // a span matches, or the stack is exhausted.
            while span.name != name {
                match self.stack.pop() {
                    Some(outer) => span = outer,
                    None => break,
                }
            }
        }

        let end_time = end_time.unwrap_or_else(|| self.now());
        span.end_time = Some(end_time);
        let elapsed_ms = span.elapsed_ms().unwrap_or(0.001);

        let entry = self.aggregated.entry(span.log_path.clone()).or_default();
        entry.total_ms += elapsed_ms;
        entry.count += 1;
        if entry.bucket.is_none() {
            if let Some(bucket) = bucket {
                entry.bucket = Some(bucket.to_string());
            }
        }
        let path_count = entry.count;

        let root_closing = self.stack.is_empty();
        if root_closing {
            // Pending root annotations attach in registration order, then
            // satisfied slow rules in tag order.
            span.annotations.extend(self.pending_annotations.drain(..));
            let mut rules: Vec<(String, f64)> = self.slow_rules.drain().collect();
            rules.sort_by(|a, b| a.0.cmp(&b.0));
            for (tag, threshold_seconds) in rules {
                if threshold_seconds * 1000.0 <= elapsed_ms {
                    span.annotations.push(Annotation::new(&tag, "1", end_time));
                }
            }
        }

        let admitted = self.should_trace(path_count, elapsed_ms);
        if admitted {
            span.parent_id = self.stack.last().map(|parent| parent.id);
        }

        if !root_closing {
            if admitted {
                self.traces.push(span);
            }
            return;
        }

        let mut trace_report = mem::take(&mut self.traces);
        if admitted {
            trace_report.push(span.clone());
        }
        let aggregated = AggregatedReport {
            entries: mem::take(&mut self.aggregated),
            root: span,
        };
        tracing::debug!(
            root = %aggregated.root.log_path,
            paths = aggregated.entries.len(),
            traced = trace_report.len(),
            "root span completed"
        );

        // Per-root state is fully reset before the callbacks run, so a
        // panicking callback cannot leak state into the next root.
        self.pending_annotations.clear();
        self.last_trace_report = Some(trace_report);
        self.last_aggregated_report = Some(aggregated);

        let tracing_export = Arc::clone(&self.config.tracing_export);
        let aggregated_export = Arc::clone(&self.config.aggregated_export);
        if let Some(traces) = self.last_trace_report.as_deref() {
            tracing_export(traces);
        }
        if let Some(report) = self.last_aggregated_report.as_ref() {
            aggregated_export(report);
        }
    }
}

impl fmt::Debug for SpanTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpanTracker")
            .field("config", &self.config)
            .field("depth", &self.stack.len())
            .field("aggregated_paths", &self.aggregated.len())
            .field("traced_spans", &self.traces.len())
            .finish_non_exhaustive()
    }
}

/// RAII guard pairing every `start` with exactly one `end`
///
/// Created by [`SpanTracker::span`]. Ends the span when dropped, on normal
/// return or unwind alike, as long as spans are opened and closed in
/// strictly nested fashion.
pub struct SpanGuard<'a> {
    name: String,
    bucket: Option<String>,
    tracker: &'a mut SpanTracker,
}

impl SpanGuard<'_> {
    /// Bucket label applied when this span closes
    pub fn set_bucket(&mut self, bucket: &str) {
        self.bucket = Some(bucket.to_string());
    }
}

impl Deref for SpanGuard<'_> {
    type Target = SpanTracker;

    fn deref(&self) -> &SpanTracker {
        self.tracker
    }
}

impl DerefMut for SpanGuard<'_> {
    fn deref_mut(&mut self) -> &mut SpanTracker {
        self.tracker
    }
}

impl Drop for SpanGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            // Record the failure on the span before closing it. The panic
            // payload's type is not recoverable here, so the annotation is a
            // fixed marker.
            let time = self.tracker.now();
            if let Some(span) = self.tracker.stack.last_mut() {
                span.annotations.push(Annotation::new("error", "panic", time));
            }
        }
        let bucket = self.bucket.take();
        self.tracker.finish(&self.name, None, bucket.as_deref());
    }
}
