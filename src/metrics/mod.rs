//! In-process metrics registry
//!
//! Keeps the most recent observations per metric name in bounded FIFO
//! buffers and computes aggregates on demand. Long-term storage is left to
//! whatever [`MetricSink`] the samples are forwarded to.

pub mod registry;
pub mod sink;
pub mod summary;

pub use registry::{MetricSample, MetricsRegistry, DEFAULT_METRIC_CAPACITY};
pub use sink::{LogSink, MetricSink, SinkError};
pub use summary::MetricSummary;
