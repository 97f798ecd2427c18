//! Observability: execution telemetry sinks.
//!
//! This module never touches storage or mediation internals; the
//! executor reports events into whatever sink the caller installs.

pub(crate) mod sink;

pub use sink::{ExecKind, MetricsEvent, MetricsSink, with_metrics_sink};
