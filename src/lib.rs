//! Cronometro - In-process span instrumentation for performance monitoring
//!
//! This library measures nested execution time as "spans": a caller marks the
//! start and end of a scope, nested scopes are tracked on a stack, aggregated
//! by logical path, and optionally emitted as individual trace records for
//! offline inspection (e.g. waterfall graphs).
//!
//! A root span is required; when it closes, one aggregated report and one
//! trace report are produced and handed to the configured export callbacks.

pub mod error;
pub mod registry;
pub mod report;
pub mod span;
pub mod tracker;
