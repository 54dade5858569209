//! Beacon: Rule-Based Alerting and In-Process Metrics
//!
//! An alert engine that evaluates threshold rules against arbitrary JSON
//! sample data or windowed metric averages, throttles each rule with a
//! cooldown and trigger cap, fans out notifications over email, SMS,
//! webhooks and Slack, and keeps an acknowledgeable alert history.
//!
//! # Features
//!
//! - **Alert Rules**: Dotted metric paths compared with `>`, `>=`, `<`, `<=`, `==`, `!=`
//! - **Throttling**: Per-rule cooldown and lifetime trigger cap
//! - **Notifications**: Email and SMS gateways, webhooks, Slack
//! - **Alert History**: Bounded, with acknowledge/resolve lifecycle and stats
//! - **Metrics Registry**: Bounded per-metric sample buffers with summaries
//! - **Background Evaluation**: Periodic rule checks against metric snapshots
//!
//! # Example
//!
//! ```no_run
//! use beacon::alerts::{AlertCondition, AlertEngine, AlertRule, HttpNotifier, NotificationAction, NotifierConfig, Operator};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let notifier = Arc::new(HttpNotifier::new(NotifierConfig::default())?);
//! let engine = AlertEngine::new(notifier);
//!
//! engine.define_rule(
//!     AlertRule::new("low_disk", AlertCondition::new("disk.freePct", Operator::LessThan, 10.0))
//!         .with_action(NotificationAction::email(["ops@example.com".to_string()])),
//! )?;
//!
//! let fired = engine
//!     .check_alert("low_disk", &serde_json::json!({"disk": {"freePct": 5}}))
//!     .await;
//! assert!(fired);
//! # Ok(())
//! # }
//! ```

pub mod alerts;
pub mod api;
pub mod clock;
pub mod data;
pub mod metrics;

// Re-export commonly used types
pub use alerts::{AlertEngine, AlertRecord, AlertRule, RuleError};
pub use clock::{Clock, SystemClock};
pub use metrics::{MetricSummary, MetricsRegistry};
