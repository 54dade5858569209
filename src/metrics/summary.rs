//! Aggregate summaries over a metric's retained samples

use serde::{Deserialize, Serialize};

use super::registry::MetricSample;

/// Aggregates over the currently retained window of one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSummary {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub last_value: f64,
    pub last_timestamp: i64,
}

impl MetricSummary {
    /// Summarize samples in insertion order; `None` when there are none
    pub fn from_samples<'a, I>(samples: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a MetricSample>,
    {
        let mut iter = samples.into_iter();
        let first = iter.next()?;

        let mut summary = Self {
            count: 1,
            min: first.value,
            max: first.value,
            avg: 0.0,
            last_value: first.value,
            last_timestamp: first.timestamp,
        };
        let mut sum = first.value;

        for sample in iter {
            summary.count += 1;
            summary.min = summary.min.min(sample.value);
            summary.max = summary.max.max(sample.value);
            summary.last_value = sample.value;
            summary.last_timestamp = sample.timestamp;
            sum += sample.value;
        }

        summary.avg = sum / summary.count as f64;
        Some(summary)
    }
}
