//! Downstream destinations for recorded samples

use super::registry::MetricSample;

/// Receives every sample recorded in the registry
///
/// Forwarding is fire-and-forget: the registry logs a returned error and
/// carries on, so a slow or broken sink never fails a `record` call.
pub trait MetricSink: Send + Sync {
    fn name(&self) -> &str;

    fn forward(&self, sample: &MetricSample) -> Result<(), SinkError>;
}

/// Sink that emits each sample as a trace event
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl MetricSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    fn forward(&self, sample: &MetricSample) -> Result<(), SinkError> {
        tracing::trace!(
            metric = %sample.name,
            value = sample.value,
            timestamp = sample.timestamp,
            tags = ?sample.tags,
            "metric recorded"
        );
        Ok(())
    }
}

/// Sink errors
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Sink unavailable: {0}")]
    Unavailable(String),
}
