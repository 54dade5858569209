//! Alert history entries and their lifecycle

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default number of records returned by history queries
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Coarse severity bucket assigned at fire time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    /// Bucket a rule by its configured threshold, not the observed value
    pub fn from_threshold(threshold: f64) -> Self {
        if threshold > 1000.0 {
            Severity::Critical
        } else if threshold > 100.0 {
            Severity::High
        } else if threshold > 10.0 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "critical" => Ok(Severity::Critical),
            "high" => Ok(Severity::High),
            "medium" => Ok(Severity::Medium),
            "low" => Ok(Severity::Low),
            other => Err(format!("unknown severity '{}'", other)),
        }
    }
}

/// Alert record status
///
/// Records start `Active`. Acknowledge and resolve may be applied in any
/// order and repeatedly; nothing moves a record back to `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Active => "active",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Resolved => "resolved",
        }
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(AlertStatus::Active),
            "acknowledged" => Ok(AlertStatus::Acknowledged),
            "resolved" => Ok(AlertStatus::Resolved),
            other => Err(format!("unknown status '{}'", other)),
        }
    }
}

/// One fire of one rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRecord {
    /// `alert_<timestamp>_<random>`
    pub id: String,
    /// Name of the rule that fired; the rule may since have been removed
    pub rule_name: String,
    /// Unix millis
    pub timestamp: i64,
    /// Sample that triggered the rule, stored verbatim
    pub data: serde_json::Value,
    pub severity: Severity,
    pub status: AlertStatus,
    pub acknowledged_by: Option<String>,
    pub acknowledged_at: Option<i64>,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<i64>,
}

impl AlertRecord {
    pub fn new(
        rule_name: impl Into<String>,
        data: serde_json::Value,
        severity: Severity,
        timestamp: i64,
    ) -> Self {
        Self {
            id: generate_alert_id(timestamp),
            rule_name: rule_name.into(),
            timestamp,
            data,
            severity,
            status: AlertStatus::Active,
            acknowledged_by: None,
            acknowledged_at: None,
            resolved_by: None,
            resolved_at: None,
        }
    }

    pub fn acknowledge(&mut self, user_id: &str, now: i64) {
        self.status = AlertStatus::Acknowledged;
        self.acknowledged_by = Some(user_id.to_string());
        self.acknowledged_at = Some(now);
    }

    pub fn resolve(&mut self, user_id: &str, now: i64) {
        self.status = AlertStatus::Resolved;
        self.resolved_by = Some(user_id.to_string());
        self.resolved_at = Some(now);
    }
}

fn generate_alert_id(timestamp: i64) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect();
    format!("alert_{}_{}", timestamp, suffix)
}

/// History query parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryFilter {
    pub limit: usize,
    pub status: Option<AlertStatus>,
    pub severity: Option<Severity>,
}

impl HistoryFilter {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    pub fn matches(&self, record: &AlertRecord) -> bool {
        self.status.map_or(true, |s| record.status == s)
            && self.severity.map_or(true, |s| record.severity == s)
    }
}

impl Default for HistoryFilter {
    fn default() -> Self {
        Self {
            limit: DEFAULT_HISTORY_LIMIT,
            status: None,
            severity: None,
        }
    }
}

/// Per-severity tallies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

/// Summary over the full alert history
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertStats {
    pub total: usize,
    pub active: usize,
    pub acknowledged: usize,
    pub resolved: usize,
    pub by_severity: SeverityCounts,
}

impl AlertStats {
    /// Tally records in a single pass
    pub fn tally<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a AlertRecord>,
    {
        records.into_iter().fold(Self::default(), |mut stats, record| {
            stats.total += 1;
            match record.status {
                AlertStatus::Active => stats.active += 1,
                AlertStatus::Acknowledged => stats.acknowledged += 1,
                AlertStatus::Resolved => stats.resolved += 1,
            }
            match record.severity {
                Severity::Critical => stats.by_severity.critical += 1,
                Severity::High => stats.by_severity.high += 1,
                Severity::Medium => stats.by_severity.medium += 1,
                Severity::Low => stats.by_severity.low += 1,
            }
            stats
        })
    }
}
