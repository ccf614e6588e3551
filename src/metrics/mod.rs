//! Prometheus metrics for the Jaeger Operator
//!
//! Reconcile counters and durations, object writes, readiness waits, and the
//! HTTP endpoint exposing them next to the health probes.

mod prometheus;

pub use prometheus::*;
