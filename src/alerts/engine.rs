//! Rule evaluation, alert history and notification dispatch

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::json;

use super::config::{AlertCondition, AlertRule, NotificationAction, RuleError, RuleOptions, RuleUpdate};
use super::notifier::Notifier;
use super::record::{AlertRecord, AlertStats, AlertStatus, HistoryFilter, Severity};
use crate::clock::{Clock, SystemClock};
use crate::data::resolve_number;
use crate::metrics::MetricsRegistry;

/// Default cap on retained alert records
pub const DEFAULT_MAX_HISTORY: usize = 10_000;

/// Engine tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Oldest records are dropped once history grows past this
    pub max_history: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_history: DEFAULT_MAX_HISTORY,
        }
    }
}

/// Outcome of an operator-triggered test fire
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "alertId", skip_serializing_if = "Option::is_none")]
    pub alert_id: Option<String>,
}

/// Rule-based alert engine
///
/// Holds rules by name, decides when they fire, keeps a bounded history of
/// fired alerts and drives each rule's notification actions. Missing,
/// disabled, cooling-down and exhausted rules are reported as `false`,
/// never as errors.
pub struct AlertEngine {
    rules: RwLock<HashMap<String, AlertRule>>,
    /// Oldest first
    history: RwLock<VecDeque<AlertRecord>>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    /// Source of time-windowed averages
    metrics: Option<Arc<MetricsRegistry>>,
    config: EngineConfig,
}

impl AlertEngine {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self::with_clock(notifier, Arc::new(SystemClock))
    }

    pub fn with_clock(notifier: Arc<dyn Notifier>, clock: Arc<dyn Clock>) -> Self {
        Self {
            rules: RwLock::new(HashMap::new()),
            history: RwLock::new(VecDeque::new()),
            notifier,
            clock,
            metrics: None,
            config: EngineConfig::default(),
        }
    }

    /// Resolve time-windowed conditions against `registry`
    pub fn with_metrics(mut self, registry: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(registry);
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = EngineConfig {
            max_history: config.max_history.max(1),
        };
        self
    }

    pub fn config(&self) -> EngineConfig {
        self.config
    }

    // ------------------------------------------------------------------
    // Rule management
    // ------------------------------------------------------------------

    /// Insert or replace a rule
    ///
    /// Replacing a rule starts it over: trigger count and last fire time
    /// are cleared.
    pub fn define_rule(&self, mut rule: AlertRule) -> Result<(), RuleError> {
        rule.validate()?;
        rule.trigger_count = 0;
        rule.last_triggered_at = None;
        rule.created_at = self.clock.now_millis();

        let name = rule.name.clone();
        let replaced = self.rules.write().insert(name.clone(), rule).is_some();
        tracing::info!(rule = %name, replaced, "Alert rule defined");
        Ok(())
    }

    /// Build and insert a rule from its parts
    pub fn define(
        &self,
        name: &str,
        condition: AlertCondition,
        actions: Vec<NotificationAction>,
        options: RuleOptions,
    ) -> Result<(), RuleError> {
        self.define_rule(
            AlertRule::new(name, condition)
                .with_actions(actions)
                .with_options(options),
        )
    }

    pub fn get_rule(&self, name: &str) -> Option<AlertRule> {
        self.rules.read().get(name).cloned()
    }

    /// All rules, sorted by name
    pub fn list_rules(&self) -> Vec<AlertRule> {
        let mut rules: Vec<AlertRule> = self.rules.read().values().cloned().collect();
        rules.sort_by(|a, b| a.name.cmp(&b.name));
        rules
    }

    /// Patch an existing rule, keeping its runtime counters
    pub fn update_rule(&self, name: &str, update: RuleUpdate) -> Result<Option<AlertRule>, RuleError> {
        let mut rules = self.rules.write();
        let Some(existing) = rules.get(name) else {
            return Ok(None);
        };

        let mut patched = existing.clone();
        patched.apply(update);
        patched.validate()?;

        rules.insert(name.to_string(), patched.clone());
        tracing::info!(rule = %name, "Alert rule updated");
        Ok(Some(patched))
    }

    pub fn remove_rule(&self, name: &str) -> Option<AlertRule> {
        let removed = self.rules.write().remove(name);
        if removed.is_some() {
            tracing::info!(rule = %name, "Alert rule removed");
        }
        removed
    }

    /// Flip `enabled`, returning the new state
    pub fn toggle_rule(&self, name: &str) -> Option<bool> {
        let mut rules = self.rules.write();
        let rule = rules.get_mut(name)?;
        rule.enabled = !rule.enabled;
        tracing::info!(rule = %name, enabled = rule.enabled, "Alert rule toggled");
        Some(rule.enabled)
    }

    pub fn rule_count(&self) -> usize {
        self.rules.read().len()
    }

    // ------------------------------------------------------------------
    // Evaluation
    // ------------------------------------------------------------------

    /// Evaluate one rule against `data`, firing it if the condition holds
    ///
    /// Returns whether the rule fired. The throttling checks and the state
    /// update happen under one short write lock; notification runs after
    /// the lock is released.
    pub async fn check_alert(&self, rule_name: &str, data: &serde_json::Value) -> bool {
        let now = self.clock.now_millis();

        let rule = {
            let mut rules = self.rules.write();
            let Some(rule) = rules.get_mut(rule_name) else {
                tracing::debug!(rule = %rule_name, "Alert rule not found");
                return false;
            };

            if !rule.enabled {
                tracing::debug!(rule = %rule_name, "Alert rule disabled");
                return false;
            }
            if rule.is_cooling_down(now) {
                tracing::debug!(rule = %rule_name, "Alert rule cooling down");
                return false;
            }
            if rule.is_exhausted() {
                tracing::debug!(
                    rule = %rule_name,
                    trigger_count = rule.trigger_count,
                    "Alert rule reached its trigger cap"
                );
                return false;
            }
            if !self.evaluate(&rule.condition, data, now) {
                return false;
            }

            Self::mark_fired(rule, now);
            rule.clone()
        };

        self.fire(rule, data.clone(), now).await;
        true
    }

    /// Evaluate every rule against the same data; returns how many fired
    pub async fn check_all(&self, data: &serde_json::Value) -> usize {
        let names: Vec<String> = self.rules.read().keys().cloned().collect();

        let mut fired = 0;
        for name in names {
            if self.check_alert(&name, data).await {
                fired += 1;
            }
        }
        fired
    }

    /// Evaluate only the rules backed by recorded metrics; returns how many fired
    ///
    /// A windowed rule qualifies when its metric has samples inside the
    /// window, an unwindowed one when its path resolves in `snapshot`. Rules
    /// meant for caller-supplied data are skipped rather than evaluated
    /// against values nobody recorded.
    pub async fn check_metrics(&self, snapshot: &serde_json::Value) -> usize {
        let now = self.clock.now_millis();
        let names: Vec<String> = self
            .rules
            .read()
            .values()
            .filter(|rule| self.is_metric_backed(&rule.condition, snapshot, now))
            .map(|rule| rule.name.clone())
            .collect();

        let mut fired = 0;
        for name in names {
            if self.check_alert(&name, snapshot).await {
                fired += 1;
            }
        }
        fired
    }

    fn is_metric_backed(&self, condition: &AlertCondition, snapshot: &serde_json::Value, now: i64) -> bool {
        match condition.time_window_millis {
            Some(window) => self
                .metrics
                .as_ref()
                .and_then(|m| m.window_average(&condition.metric_path, window, now))
                .is_some(),
            None => resolve_number(snapshot, &condition.metric_path).is_some(),
        }
    }

    /// Whether `condition` holds for `data` at time `now`
    pub fn evaluate(&self, condition: &AlertCondition, data: &serde_json::Value, now: i64) -> bool {
        let value = match condition.time_window_millis {
            Some(window) => Some(
                self.metrics
                    .as_ref()
                    .and_then(|m| m.window_average(&condition.metric_path, window, now))
                    .unwrap_or(0.0),
            ),
            None => resolve_number(data, &condition.metric_path),
        };

        condition.operator.evaluate(value, condition.threshold)
    }

    /// Fire a rule immediately, skipping cooldown and trigger cap
    pub async fn test_alert(&self, rule_name: &str) -> TestOutcome {
        let now = self.clock.now_millis();

        let rule = {
            let mut rules = self.rules.write();
            match rules.get_mut(rule_name) {
                Some(rule) => {
                    Self::mark_fired(rule, now);
                    rule.clone()
                }
                None => {
                    return TestOutcome {
                        success: false,
                        message: None,
                        error: Some(format!("Alert rule '{}' not found", rule_name)),
                        alert_id: None,
                    }
                }
            }
        };

        let data = json!({ "timestamp": now, "test": true });
        let record = self.fire(rule, data, now).await;

        TestOutcome {
            success: true,
            message: Some(format!("Test alert '{}' triggered", rule_name)),
            error: None,
            alert_id: Some(record.id),
        }
    }

    fn mark_fired(rule: &mut AlertRule, now: i64) {
        rule.last_triggered_at = Some(now);
        rule.trigger_count = rule.trigger_count.saturating_add(1);
    }

    /// Record the alert and run every action; failures are logged per action
    async fn fire(&self, rule: AlertRule, data: serde_json::Value, now: i64) -> AlertRecord {
        let severity = Severity::from_threshold(rule.condition.threshold);
        let record = AlertRecord::new(rule.name.clone(), data, severity, now);

        {
            let mut history = self.history.write();
            history.push_back(record.clone());
            while history.len() > self.config.max_history {
                history.pop_front();
            }
        }

        tracing::warn!(
            rule = %rule.name,
            alert_id = %record.id,
            severity = %severity,
            trigger_count = rule.trigger_count,
            "Alert fired"
        );

        for action in &rule.actions {
            if let Err(e) = action.dispatch(self.notifier.as_ref(), &rule, &record).await {
                tracing::error!(
                    rule = %rule.name,
                    alert_id = %record.id,
                    channel = e.channel,
                    error = %e,
                    "Failed to send alert notification"
                );
            }
        }

        record
    }

    // ------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------

    pub fn acknowledge_alert(&self, alert_id: &str, user_id: &str) -> bool {
        let now = self.clock.now_millis();
        self.with_record(alert_id, |record| record.acknowledge(user_id, now))
    }

    pub fn resolve_alert(&self, alert_id: &str, user_id: &str) -> bool {
        let now = self.clock.now_millis();
        self.with_record(alert_id, |record| record.resolve(user_id, now))
    }

    fn with_record(&self, alert_id: &str, f: impl FnOnce(&mut AlertRecord)) -> bool {
        let mut history = self.history.write();
        match history.iter_mut().find(|r| r.id == alert_id) {
            Some(record) => {
                f(record);
                tracing::info!(alert_id = %alert_id, status = %record.status, "Alert status changed");
                true
            }
            None => false,
        }
    }

    pub fn get_alert(&self, alert_id: &str) -> Option<AlertRecord> {
        self.history.read().iter().find(|r| r.id == alert_id).cloned()
    }

    /// Up to `limit` most recent records, newest first
    pub fn get_alert_history(&self, limit: usize) -> Vec<AlertRecord> {
        self.history(HistoryFilter::with_limit(limit))
    }

    /// Filtered history, newest first; filters apply before the limit
    pub fn history(&self, filter: HistoryFilter) -> Vec<AlertRecord> {
        self.history
            .read()
            .iter()
            .rev()
            .filter(|r| filter.matches(r))
            .take(filter.limit)
            .cloned()
            .collect()
    }

    /// Records still `active`, newest first
    pub fn get_active_alerts(&self) -> Vec<AlertRecord> {
        self.history
            .read()
            .iter()
            .rev()
            .filter(|r| r.status == AlertStatus::Active)
            .cloned()
            .collect()
    }

    pub fn get_alert_stats(&self) -> AlertStats {
        AlertStats::tally(self.history.read().iter())
    }

    pub fn history_len(&self) -> usize {
        self.history.read().len()
    }

    /// Drop all rules and history
    pub fn dispose(&self) {
        let rules = {
            let mut rules = self.rules.write();
            let count = rules.len();
            rules.clear();
            count
        };
        let alerts = {
            let mut history = self.history.write();
            let count = history.len();
            history.clear();
            count
        };
        tracing::info!(rules, alerts, "Alert engine disposed");
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::alerts::config::Operator;
    use crate::alerts::notifier::NotifierError;
    use crate::clock::ManualClock;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Captures every notifier call; channels in `failing` return an error
    #[derive(Default)]
    pub(crate) struct RecordingNotifier {
        pub calls: Mutex<Vec<(String, Vec<String>)>>,
        pub failing: Vec<&'static str>,
    }

    impl RecordingNotifier {
        pub fn failing(channels: &[&'static str]) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                failing: channels.to_vec(),
            }
        }

        pub fn calls_for(&self, channel: &str) -> Vec<Vec<String>> {
            self.calls
                .lock()
                .iter()
                .filter(|(c, _)| c == channel)
                .map(|(_, targets)| targets.clone())
                .collect()
        }

        pub fn total_calls(&self) -> usize {
            self.calls.lock().len()
        }

        fn record(&self, channel: &str, targets: Vec<String>) -> Result<(), NotifierError> {
            self.calls.lock().push((channel.to_string(), targets));
            if self.failing.iter().any(|c| *c == channel) {
                Err(NotifierError::Http(format!("{} unavailable", channel)))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send_email(
            &self,
            recipients: &[String],
            _subject: &str,
            _body: &str,
        ) -> Result<(), NotifierError> {
            self.record("email", recipients.to_vec())
        }

        async fn send_sms(&self, recipients: &[String], _body: &str) -> Result<(), NotifierError> {
            self.record("sms", recipients.to_vec())
        }

        async fn send_webhook(
            &self,
            url: &str,
            _payload: &serde_json::Value,
            _auth_token: Option<&str>,
        ) -> Result<(), NotifierError> {
            self.record("webhook", vec![url.to_string()])
        }

        async fn send_chat_message(
            &self,
            webhook_url: &str,
            _payload: &serde_json::Value,
        ) -> Result<(), NotifierError> {
            self.record("slack", vec![webhook_url.to_string()])
        }
    }

    fn setup() -> (Arc<RecordingNotifier>, Arc<ManualClock>, AlertEngine) {
        let notifier = Arc::new(RecordingNotifier::default());
        let clock = Arc::new(ManualClock::new(1_000_000));
        let engine = AlertEngine::with_clock(notifier.clone(), clock.clone());
        (notifier, clock, engine)
    }

    fn gt_rule(name: &str, threshold: f64) -> AlertRule {
        AlertRule::new(name, AlertCondition::new("value", Operator::GreaterThan, threshold))
    }

    #[tokio::test]
    async fn test_low_disk_scenario() {
        let (notifier, _clock, engine) = setup();
        engine
            .define(
                "low_disk",
                AlertCondition::new("disk.freePct", Operator::LessThan, 10.0),
                vec![NotificationAction::email(["ops@x.com"])],
                RuleOptions {
                    enabled: true,
                    cooldown_millis: 0,
                    max_triggers: 1,
                },
            )
            .unwrap();

        let data = json!({"disk": {"freePct": 5}});
        assert!(engine.check_alert("low_disk", &data).await);

        let history = engine.get_alert_history(100);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].severity, Severity::Low);
        assert_eq!(history[0].status, AlertStatus::Active);
        assert_eq!(history[0].rule_name, "low_disk");
        assert_eq!(history[0].data, data);
        assert_eq!(notifier.calls_for("email"), vec![vec!["ops@x.com".to_string()]]);

        assert!(!engine.check_alert("low_disk", &data).await);
        assert_eq!(engine.history_len(), 1);
        assert_eq!(notifier.total_calls(), 1);
    }

    #[tokio::test]
    async fn test_missing_and_disabled_rules() {
        let (_notifier, _clock, engine) = setup();
        assert!(!engine.check_alert("nope", &json!({"value": 100})).await);

        engine
            .define_rule(gt_rule("r", 1.0).with_enabled(false))
            .unwrap();
        assert!(!engine.check_alert("r", &json!({"value": 100})).await);
        assert_eq!(engine.history_len(), 0);
    }

    #[tokio::test]
    async fn test_cooldown_enforcement() {
        let (_notifier, clock, engine) = setup();
        engine
            .define_rule(gt_rule("r", 1.0).with_cooldown(60_000))
            .unwrap();
        let data = json!({"value": 5});

        assert!(engine.check_alert("r", &data).await);
        clock.advance(59_999);
        assert!(!engine.check_alert("r", &data).await);
        assert_eq!(engine.history_len(), 1);

        clock.advance(1);
        assert!(engine.check_alert("r", &data).await);
        assert_eq!(engine.history_len(), 2);
    }

    #[tokio::test]
    async fn test_max_trigger_cap() {
        let (_notifier, _clock, engine) = setup();
        engine
            .define_rule(gt_rule("r", 1.0).with_cooldown(0).with_max_triggers(3))
            .unwrap();

        let mut fired = 0;
        for _ in 0..10 {
            if engine.check_alert("r", &json!({"value": 5})).await {
                fired += 1;
            }
        }
        assert_eq!(fired, 3);
        assert_eq!(engine.history_len(), 3);
        assert_eq!(engine.get_rule("r").unwrap().trigger_count, 3);
    }

    #[tokio::test]
    async fn test_concurrent_checks_fire_once() {
        let (notifier, _clock, engine) = setup();
        engine
            .define_rule(
                gt_rule("r", 1.0)
                    .with_action(NotificationAction::email(["ops@x.com"]))
                    .with_cooldown(0)
                    .with_max_triggers(1),
            )
            .unwrap();
        let data = json!({"value": 5});

        let (first, second) = tokio::join!(
            engine.check_alert("r", &data),
            engine.check_alert("r", &data)
        );
        assert!(first ^ second);
        assert_eq!(engine.history_len(), 1);
        assert_eq!(notifier.total_calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_checks_across_tasks() {
        let (_notifier, _clock, engine) = setup();
        let engine = Arc::new(engine);
        engine
            .define_rule(gt_rule("r", 1.0).with_cooldown(60_000))
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = Arc::clone(&engine);
                tokio::spawn(async move { engine.check_alert("r", &json!({"value": 5})).await })
            })
            .collect();

        let mut fired = 0;
        for handle in handles {
            if handle.await.unwrap() {
                fired += 1;
            }
        }
        assert_eq!(fired, 1);
        assert_eq!(engine.get_rule("r").unwrap().trigger_count, 1);
    }

    #[tokio::test]
    async fn test_redefinition_resets_state() {
        let (_notifier, _clock, engine) = setup();
        let rule = gt_rule("r", 1.0).with_cooldown(0).with_max_triggers(1);
        engine.define_rule(rule.clone()).unwrap();

        assert!(engine.check_alert("r", &json!({"value": 5})).await);
        assert!(!engine.check_alert("r", &json!({"value": 5})).await);

        engine.define_rule(rule).unwrap();
        let redefined = engine.get_rule("r").unwrap();
        assert_eq!(redefined.trigger_count, 0);
        assert!(redefined.last_triggered_at.is_none());
        assert!(engine.check_alert("r", &json!({"value": 5})).await);
    }

    #[tokio::test]
    async fn test_condition_not_met() {
        let (notifier, _clock, engine) = setup();
        engine.define_rule(gt_rule("r", 10.0).with_cooldown(0)).unwrap();

        assert!(!engine.check_alert("r", &json!({"value": 3})).await);
        assert!(!engine.check_alert("r", &json!({"other": 30})).await);
        assert_eq!(notifier.total_calls(), 0);
        assert!(engine.get_rule("r").unwrap().last_triggered_at.is_none());
    }

    #[tokio::test]
    async fn test_absent_value_only_fires_not_equal() {
        let (_notifier, _clock, engine) = setup();
        engine
            .define_rule(
                AlertRule::new("ne", AlertCondition::new("a.b", Operator::NotEqual, 1.0))
                    .with_cooldown(0),
            )
            .unwrap();
        engine
            .define_rule(
                AlertRule::new("eq", AlertCondition::new("a.b", Operator::Equal, 1.0))
                    .with_cooldown(0),
            )
            .unwrap();

        let data = json!({"a": {}});
        assert!(engine.check_alert("ne", &data).await);
        assert!(!engine.check_alert("eq", &data).await);
    }

    #[tokio::test]
    async fn test_unknown_operator_is_noop() {
        let (_notifier, _clock, engine) = setup();
        engine
            .define_rule(AlertRule::new(
                "r",
                AlertCondition::new("value", Operator::parse("=~"), 1.0),
            ))
            .unwrap();
        assert!(!engine.check_alert("r", &json!({"value": 1})).await);
    }

    #[tokio::test]
    async fn test_severity_from_threshold() {
        let (_notifier, _clock, engine) = setup();
        let cases = [
            (2000.0, Severity::Critical),
            (150.0, Severity::High),
            (50.0, Severity::Medium),
            (5.0, Severity::Low),
        ];
        for (threshold, _) in &cases {
            let name = format!("t{}", threshold);
            engine
                .define_rule(AlertRule::new(
                    name.clone(),
                    AlertCondition::new("value", Operator::GreaterOrEqual, *threshold),
                ))
                .unwrap();
            // Observed value far above every threshold
            assert!(engine.check_alert(&name, &json!({"value": 1e9})).await);
        }

        let history = engine.get_alert_history(10);
        for (threshold, severity) in &cases {
            let record = history
                .iter()
                .find(|r| r.rule_name == format!("t{}", threshold))
                .unwrap();
            assert_eq!(record.severity, *severity);
        }
    }

    #[tokio::test]
    async fn test_time_window_uses_registry_average() {
        let notifier = Arc::new(RecordingNotifier::default());
        let clock = Arc::new(ManualClock::new(0));
        let registry = Arc::new(MetricsRegistry::with_clock(clock.clone()));
        let engine = AlertEngine::with_clock(notifier, clock.clone()).with_metrics(registry.clone());

        engine
            .define_rule(
                AlertRule::new(
                    "errors",
                    AlertCondition::new("error_rate", Operator::GreaterThan, 5.0)
                        .with_time_window(60_000),
                )
                .with_cooldown(0),
            )
            .unwrap();

        // Sample data is ignored for windowed conditions
        clock.set(100_000);
        assert!(!engine.check_alert("errors", &json!({"error_rate": 99})).await);

        registry.record("error_rate", 2.0, HashMap::new());
        clock.set(110_000);
        registry.record("error_rate", 10.0, HashMap::new());
        assert!(engine.check_alert("errors", &json!({})).await);

        // Both samples age out of the window
        clock.set(200_000);
        assert!(!engine.check_alert("errors", &json!({})).await);
    }

    #[tokio::test]
    async fn test_time_window_without_registry_is_zero() {
        let (_notifier, _clock, engine) = setup();
        engine
            .define_rule(
                AlertRule::new(
                    "zero",
                    AlertCondition::new("anything", Operator::Equal, 0.0).with_time_window(1_000),
                )
                .with_cooldown(0),
            )
            .unwrap();
        assert!(engine.check_alert("zero", &json!({})).await);
    }

    #[tokio::test]
    async fn test_action_failure_does_not_block_siblings() {
        let notifier = Arc::new(RecordingNotifier::failing(&["email"]));
        let engine = AlertEngine::with_clock(notifier.clone(), Arc::new(ManualClock::new(0)));

        engine
            .define_rule(
                gt_rule("r", 1.0)
                    .with_action(NotificationAction::email(["a@x.com"]))
                    .with_action(NotificationAction::sms(["+15550100"]))
                    .with_action(NotificationAction::Slack {
                        webhook_url: "https://hooks.slack.com/x".to_string(),
                    }),
            )
            .unwrap();

        assert!(engine.check_alert("r", &json!({"value": 5})).await);
        assert_eq!(notifier.total_calls(), 3);
        assert_eq!(notifier.calls_for("sms").len(), 1);
        assert_eq!(notifier.calls_for("slack").len(), 1);
        assert_eq!(engine.history_len(), 1);
    }

    #[tokio::test]
    async fn test_history_ordering_and_limit() {
        let (_notifier, clock, engine) = setup();
        engine.define_rule(gt_rule("r", 1.0).with_cooldown(0)).unwrap();

        let mut times = Vec::new();
        for _ in 0..5 {
            clock.advance(1_000);
            times.push(clock.now_millis());
            assert!(engine.check_alert("r", &json!({"value": 5})).await);
        }

        let recent = engine.get_alert_history(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].timestamp, times[4]);
        assert_eq!(recent[1].timestamp, times[3]);
    }

    #[tokio::test]
    async fn test_history_cap_drops_oldest() {
        let (_notifier, _clock, engine) = setup();
        let engine = engine.with_config(EngineConfig { max_history: 3 });
        engine
            .define_rule(gt_rule("r", 1.0).with_cooldown(0).with_max_triggers(100))
            .unwrap();

        for i in 0..5 {
            assert!(engine.check_alert("r", &json!({"value": 5, "i": i})).await);
        }

        assert_eq!(engine.history_len(), 3);
        let oldest = engine.get_alert_history(3).pop().unwrap();
        assert_eq!(oldest.data["i"], 2);
    }

    #[tokio::test]
    async fn test_acknowledge_and_resolve() {
        let (_notifier, clock, engine) = setup();
        engine.define_rule(gt_rule("r", 1.0)).unwrap();
        assert!(engine.check_alert("r", &json!({"value": 5})).await);
        let id = engine.get_alert_history(1)[0].id.clone();

        assert!(!engine.acknowledge_alert("missing", "u"));
        assert!(!engine.resolve_alert("missing", "u"));

        clock.advance(10);
        assert!(engine.acknowledge_alert(&id, "alice"));
        let record = engine.get_alert(&id).unwrap();
        assert_eq!(record.status, AlertStatus::Acknowledged);
        assert_eq!(record.acknowledged_by.as_deref(), Some("alice"));
        assert_eq!(record.acknowledged_at, Some(1_000_010));
        assert!(engine.get_active_alerts().is_empty());

        assert!(engine.resolve_alert(&id, "bob"));
        clock.advance(10);
        assert!(engine.resolve_alert(&id, "carol"));
        let record = engine.get_alert(&id).unwrap();
        assert_eq!(record.status, AlertStatus::Resolved);
        assert_eq!(record.resolved_by.as_deref(), Some("carol"));
        assert_eq!(record.resolved_at, Some(1_000_020));
    }

    #[tokio::test]
    async fn test_stats_and_filters() {
        let (_notifier, _clock, engine) = setup();
        engine
            .define_rule(gt_rule("big", 5000.0).with_cooldown(0))
            .unwrap();
        engine.define_rule(gt_rule("small", 1.0).with_cooldown(0)).unwrap();

        assert!(engine.check_alert("big", &json!({"value": 6000})).await);
        assert!(engine.check_alert("small", &json!({"value": 6000})).await);
        assert!(engine.check_alert("small", &json!({"value": 6000})).await);

        let small_id = engine.get_alert_history(1)[0].id.clone();
        engine.resolve_alert(&small_id, "u");

        let stats = engine.get_alert_stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.active, 2);
        assert_eq!(stats.resolved, 1);
        assert_eq!(stats.by_severity.critical, 1);
        assert_eq!(stats.by_severity.low, 2);

        let critical = engine.history(HistoryFilter {
            severity: Some(Severity::Critical),
            ..Default::default()
        });
        assert_eq!(critical.len(), 1);
        assert_eq!(critical[0].rule_name, "big");

        let active_low = engine.history(HistoryFilter {
            limit: 10,
            status: Some(AlertStatus::Active),
            severity: Some(Severity::Low),
        });
        assert_eq!(active_low.len(), 1);
        assert_eq!(engine.get_active_alerts().len(), 2);
    }

    #[tokio::test]
    async fn test_test_alert_bypasses_throttling() {
        let (notifier, _clock, engine) = setup();
        engine
            .define_rule(
                gt_rule("r", 1.0)
                    .with_max_triggers(1)
                    .with_action(NotificationAction::email(["ops@x.com"])),
            )
            .unwrap();
        assert!(engine.check_alert("r", &json!({"value": 5})).await);

        let outcome = engine.test_alert("r").await;
        assert!(outcome.success);
        assert!(outcome.message.is_some());
        assert_eq!(engine.history_len(), 2);
        assert_eq!(notifier.calls_for("email").len(), 2);

        let latest = &engine.get_alert_history(1)[0];
        assert_eq!(latest.data["test"], true);
        assert_eq!(outcome.alert_id.as_deref(), Some(latest.id.as_str()));
        assert_eq!(engine.get_rule("r").unwrap().trigger_count, 2);

        let missing = engine.test_alert("nope").await;
        assert!(!missing.success);
        assert!(missing.error.unwrap().contains("nope"));
    }

    #[tokio::test]
    async fn test_rule_management() {
        let (_notifier, _clock, engine) = setup();
        engine.define_rule(gt_rule("b", 1.0)).unwrap();
        engine.define_rule(gt_rule("a", 1.0)).unwrap();

        let names: Vec<String> = engine.list_rules().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["a", "b"]);

        assert_eq!(engine.toggle_rule("a"), Some(false));
        assert_eq!(engine.toggle_rule("a"), Some(true));
        assert_eq!(engine.toggle_rule("zzz"), None);

        let updated = engine
            .update_rule(
                "a",
                RuleUpdate {
                    cooldown_millis: Some(5),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated.cooldown_millis, 5);
        assert!(engine.update_rule("zzz", RuleUpdate::default()).unwrap().is_none());

        let invalid = engine.update_rule(
            "a",
            RuleUpdate {
                cooldown_millis: Some(-1),
                ..Default::default()
            },
        );
        assert_eq!(invalid, Err(RuleError::NegativeCooldown(-1)));
        assert_eq!(engine.get_rule("a").unwrap().cooldown_millis, 5);

        assert!(engine.remove_rule("a").is_some());
        assert!(engine.remove_rule("a").is_none());
        assert_eq!(engine.rule_count(), 1);
    }

    #[tokio::test]
    async fn test_update_keeps_trigger_state() {
        let (_notifier, _clock, engine) = setup();
        engine
            .define_rule(gt_rule("r", 1.0).with_cooldown(0).with_max_triggers(1))
            .unwrap();
        assert!(engine.check_alert("r", &json!({"value": 5})).await);

        engine
            .update_rule(
                "r",
                RuleUpdate {
                    enabled: Some(true),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(!engine.check_alert("r", &json!({"value": 5})).await);
    }

    #[tokio::test]
    async fn test_check_all_and_dispose() {
        let (_notifier, _clock, engine) = setup();
        engine.define_rule(gt_rule("a", 1.0)).unwrap();
        engine.define_rule(gt_rule("b", 100.0)).unwrap();

        assert_eq!(engine.check_all(&json!({"value": 50})).await, 1);

        engine.dispose();
        assert_eq!(engine.rule_count(), 0);
        assert_eq!(engine.history_len(), 0);
    }

    #[test]
    fn test_define_rejects_invalid() {
        let (_notifier, _clock, engine) = setup();
        let result = engine.define_rule(AlertRule::new(
            "",
            AlertCondition::new("x", Operator::GreaterThan, 1.0),
        ));
        assert_eq!(result, Err(RuleError::MissingName));
        assert_eq!(engine.rule_count(), 0);
    }
}
