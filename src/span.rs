//! Span records and identifiers
//!
//! A span is a measured interval of work, possibly nested inside another
//! span. While a span sits on the tracker stack it is a single-owner mutable
//! record; once it is admitted into the trace buffer it is treated as an
//! immutable snapshot.

use rand::Rng;
use serde::de::{self, Deserializer, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator joining parent and child names into a log path
pub const PATH_SEPARATOR: char = '#';

/// 128-bit random span identifier
///
/// Unique per span instance with negligible collision probability. Not
/// cryptographically secure, and does not need to be. Displays as 32
/// lowercase hex characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpanId(u128);

impl SpanId {
    /// Generate a fresh random identifier
    pub fn generate() -> Self {
        SpanId(rand::thread_rng().gen::<u128>())
    }

    /// Construct from a raw 128-bit value (primarily for tests)
    pub fn from_raw(raw: u128) -> Self {
        SpanId(raw)
    }

    /// Raw 128-bit value
    pub fn as_raw(&self) -> u128 {
        self.0
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl Serialize for SpanId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

struct SpanIdVisitor;

impl Visitor<'_> for SpanIdVisitor {
    type Value = SpanId;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a 32-character hex span id")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<SpanId, E> {
        u128::from_str_radix(value, 16)
            .map(SpanId)
            .map_err(|_| E::custom(format!("invalid span id: {value:?}")))
    }
}

impl<'de> Deserialize<'de> for SpanId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_str(SpanIdVisitor)
    }
}

/// Key/value annotation with the time (seconds) it was recorded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub key: String,
    pub value: String,
    pub time: f64,
}

impl Annotation {
    pub fn new(key: &str, value: &str, time: f64) -> Self {
        Annotation {
            key: key.to_string(),
            value: value.to_string(),
            time,
        }
    }
}

/// A single measured scope
///
/// `log_path` is the `#`-joined chain of names from the root span down to
/// this span. It identifies a *position* in the nesting tree, not a single
/// invocation: repeated invocations of the same position aggregate together.
/// The path is fixed at creation and never recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    /// Random 128-bit identifier for this invocation
    pub id: SpanId,
    /// Caller-supplied name, not globally unique
    pub name: String,
    /// Aggregation key: parent path + `#` + name (or bare name for root)
    pub log_path: String,
    /// Start time in seconds
    pub start_time: f64,
    /// End time in seconds (None until the span closes)
    pub end_time: Option<f64>,
    /// Identifier of the enclosing span, filled in at close (None for root)
    pub parent_id: Option<SpanId>,
    /// Annotations attached to this exact span, in attachment order
    pub annotations: Vec<Annotation>,
}

impl Span {
    /// Create a new span nested under `parent_path` (None for a root span)
    pub fn new(name: &str, start_time: f64, parent_path: Option<&str>) -> Self {
        let log_path = match parent_path {
            Some(parent) => format!("{parent}{PATH_SEPARATOR}{name}"),
            None => name.to_string(),
        };
        Span {
            id: SpanId::generate(),
            name: name.to_string(),
            log_path,
            start_time,
            end_time: None,
            parent_id: None,
            annotations: Vec::new(),
        }
    }

    /// Elapsed milliseconds, floored at 0.001ms
    ///
    /// The floor prevents a zero or negative duration (possible with coarse
    /// or mocked clocks) from producing degenerate percentages downstream.
    /// Returns None while the span is still open.
    pub fn elapsed_ms(&self) -> Option<f64> {
        self.end_time
            .map(|end| ((end - self.start_time) * 1000.0).max(0.001))
    }
}
