//! Contract violations
//!
//! The tracker never raises ordinary errors for stack misuse: a violation is
//! a caller bug, not a recoverable runtime condition. Under strict mode it is
//! surfaced as a panic (equivalent to an assertion failure); under lenient
//! mode it is logged and the tracker degrades gracefully, so the library can
//! be dropped into production code paths without crashing the host.

use thiserror::Error;

/// Span-stack discipline violations detected by the tracker
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContractViolation {
    #[error("end called for '{name}' but the span stack is empty")]
    EndWithoutStart { name: String },

    #[error("end called for '{expected}' but the current span is '{actual}'")]
    EndNameMismatch { expected: String, actual: String },

    #[error("annotation '{key}' targets the current span but no span is open")]
    AnnotationWithoutSpan { key: String },
}
