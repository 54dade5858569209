use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use super::sink::MetricSink;
use super::summary::MetricSummary;
use crate::clock::{Clock, SystemClock};
use crate::data::nest_dotted;

/// Samples retained per metric name
pub const DEFAULT_METRIC_CAPACITY: usize = 1000;

/// One numeric observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub name: String,
    pub value: f64,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    /// Unix millis
    pub timestamp: i64,
}

/// Bounded, queryable store of recent metric observations
pub struct MetricsRegistry {
    /// Samples per metric name, oldest first
    series: DashMap<String, VecDeque<MetricSample>>,
    capacity: usize,
    clock: Arc<dyn Clock>,
    sinks: Vec<Arc<dyn MetricSink>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            series: DashMap::new(),
            capacity: DEFAULT_METRIC_CAPACITY,
            clock,
            sinks: Vec::new(),
        }
    }

    /// Override the per-metric retention (minimum 1)
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Forward every recorded sample to `sink`
    pub fn with_sink(mut self, sink: Arc<dyn MetricSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Record a sample stamped with the current time
    pub fn record(&self, name: &str, value: f64, tags: HashMap<String, String>) {
        let timestamp = self.clock.now_millis();
        self.record_sample(MetricSample {
            name: name.to_string(),
            value,
            tags,
            timestamp,
        });
    }

    /// Record a fully formed sample, evicting the oldest when over capacity
    pub fn record_sample(&self, sample: MetricSample) {
        if !sample.value.is_finite() {
            tracing::debug!(metric = %sample.name, value = sample.value, "Ignoring non-finite sample");
            return;
        }

        for sink in &self.sinks {
            if let Err(e) = sink.forward(&sample) {
                tracing::warn!(
                    sink = sink.name(),
                    metric = %sample.name,
                    error = %e,
                    "Failed to forward metric sample"
                );
            }
        }

        let mut series = self.series.entry(sample.name.clone()).or_insert_with(VecDeque::new);
        series.push_back(sample);
        while series.len() > self.capacity {
            series.pop_front();
        }
    }

    /// Aggregates for one metric, `None` if nothing has been recorded
    pub fn summarize(&self, name: &str) -> Option<MetricSummary> {
        let series = self.series.get(name)?;
        MetricSummary::from_samples(series.iter())
    }

    /// Aggregates for every known metric, keyed by name
    pub fn summarize_all(&self) -> BTreeMap<String, MetricSummary> {
        self.series
            .iter()
            .filter_map(|entry| {
                MetricSummary::from_samples(entry.value().iter())
                    .map(|summary| (entry.key().clone(), summary))
            })
            .collect()
    }

    /// Average of samples no older than `window_millis` before `now`
    pub fn window_average(&self, name: &str, window_millis: i64, now: i64) -> Option<f64> {
        let series = self.series.get(name)?;
        let cutoff = now.saturating_sub(window_millis);

        let (sum, count) = series
            .iter()
            .filter(|s| s.timestamp >= cutoff)
            .fold((0.0, 0usize), |(sum, count), s| (sum + s.value, count + 1));

        if count == 0 {
            None
        } else {
            Some(sum / count as f64)
        }
    }

    /// Retained samples for one metric, oldest first
    pub fn samples(&self, name: &str) -> Vec<MetricSample> {
        self.series
            .get(name)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// All summaries as a nested JSON object
    ///
    /// Dotted names nest, so `"db.errors"` is reachable at path
    /// `db.errors.avg` when evaluating alert conditions.
    pub fn snapshot(&self) -> serde_json::Value {
        let mut root = serde_json::Map::new();
        for (name, summary) in self.summarize_all() {
            match serde_json::to_value(summary) {
                Ok(value) => nest_dotted(&mut root, &name, value),
                Err(e) => tracing::warn!(metric = %name, error = %e, "Failed to serialize summary"),
            }
        }
        serde_json::Value::Object(root)
    }

    pub fn metric_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.series.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn clear(&self) {
        self.series.clear();
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
