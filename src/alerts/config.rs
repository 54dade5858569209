//! Alert rule definitions

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Minimum time between consecutive fires of one rule
pub const DEFAULT_COOLDOWN_MILLIS: i64 = 300_000;
/// Lifetime fire cap before a rule goes quiet until redefined
pub const DEFAULT_MAX_TRIGGERS: u32 = 10;

/// Alert rule: a named condition bound to notification actions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRule {
    /// Unique rule name
    pub name: String,
    /// Condition checked against incoming data
    pub condition: AlertCondition,
    /// Dispatched in order on every fire
    #[serde(default)]
    pub actions: Vec<NotificationAction>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_cooldown")]
    pub cooldown_millis: i64,
    #[serde(default = "default_max_triggers")]
    pub max_triggers: u32,
    /// Set by the engine on fire
    #[serde(default)]
    pub last_triggered_at: Option<i64>,
    /// Set by the engine on fire, never decremented
    #[serde(default)]
    pub trigger_count: u32,
    /// When this definition was installed (unix millis)
    #[serde(default)]
    pub created_at: i64,
}

impl AlertRule {
    /// Create a rule with default throttling and no actions
    pub fn new(name: impl Into<String>, condition: AlertCondition) -> Self {
        Self {
            name: name.into(),
            condition,
            actions: Vec::new(),
            enabled: true,
            cooldown_millis: DEFAULT_COOLDOWN_MILLIS,
            max_triggers: DEFAULT_MAX_TRIGGERS,
            last_triggered_at: None,
            trigger_count: 0,
            created_at: 0,
        }
    }

    /// Add notification action
    pub fn with_action(mut self, action: NotificationAction) -> Self {
        self.actions.push(action);
        self
    }

    /// Replace all notification actions
    pub fn with_actions(mut self, actions: Vec<NotificationAction>) -> Self {
        self.actions = actions;
        self
    }

    /// Apply throttling options
    pub fn with_options(mut self, options: RuleOptions) -> Self {
        self.enabled = options.enabled;
        self.cooldown_millis = options.cooldown_millis;
        self.max_triggers = options.max_triggers;
        self
    }

    pub fn with_cooldown(mut self, cooldown_millis: i64) -> Self {
        self.cooldown_millis = cooldown_millis;
        self
    }

    pub fn with_max_triggers(mut self, max_triggers: u32) -> Self {
        self.max_triggers = max_triggers;
        self
    }

    /// Set enabled state
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Whether the last fire is still inside the cooldown interval
    pub fn is_cooling_down(&self, now: i64) -> bool {
        self.last_triggered_at
            .is_some_and(|last| now.saturating_sub(last) < self.cooldown_millis)
    }

    /// Whether the rule has used up its fire budget
    pub fn is_exhausted(&self) -> bool {
        self.trigger_count >= self.max_triggers
    }

    /// Check the fields a caller must supply
    pub fn validate(&self) -> Result<(), RuleError> {
        if self.name.trim().is_empty() {
            return Err(RuleError::MissingName);
        }
        self.condition.validate()?;
        if self.cooldown_millis < 0 {
            return Err(RuleError::NegativeCooldown(self.cooldown_millis));
        }
        for action in &self.actions {
            action.validate()?;
        }
        Ok(())
    }

    /// Apply a partial update; runtime counters are left untouched
    pub fn apply(&mut self, update: RuleUpdate) {
        if let Some(condition) = update.condition {
            self.condition = condition;
        }
        if let Some(actions) = update.actions {
            self.actions = actions;
        }
        if let Some(enabled) = update.enabled {
            self.enabled = enabled;
        }
        if let Some(cooldown) = update.cooldown_millis {
            self.cooldown_millis = cooldown;
        }
        if let Some(max) = update.max_triggers {
            self.max_triggers = max;
        }
    }
}

/// Condition evaluated against a data sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertCondition {
    /// Dot-separated path into the sample, or a metric name when windowed
    #[serde(alias = "metric")]
    pub metric_path: String,
    pub operator: Operator,
    pub threshold: f64,
    /// Compare the metric's average over this window instead of the sample
    #[serde(default, alias = "timeWindow", skip_serializing_if = "Option::is_none")]
    pub time_window_millis: Option<i64>,
}

impl AlertCondition {
    pub fn new(metric_path: impl Into<String>, operator: Operator, threshold: f64) -> Self {
        Self {
            metric_path: metric_path.into(),
            operator,
            threshold,
            time_window_millis: None,
        }
    }

    pub fn with_time_window(mut self, window_millis: i64) -> Self {
        self.time_window_millis = Some(window_millis);
        self
    }

    fn validate(&self) -> Result<(), RuleError> {
        if self.metric_path.trim().is_empty() {
            return Err(RuleError::MissingMetricPath);
        }
        if !self.threshold.is_finite() {
            return Err(RuleError::InvalidThreshold(self.threshold));
        }
        if let Some(window) = self.time_window_millis {
            if window <= 0 {
                return Err(RuleError::InvalidTimeWindow(window));
            }
        }
        Ok(())
    }
}

/// Comparison between the observed value and the threshold
///
/// Serialized as its symbol. Unrecognized symbols are kept as `Unknown`
/// and never match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operator {
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,
    Equal,
    NotEqual,
    Unknown(String),
}

impl Operator {
    pub fn parse(symbol: &str) -> Self {
        match symbol.trim() {
            ">" => Operator::GreaterThan,
            ">=" => Operator::GreaterOrEqual,
            "<" => Operator::LessThan,
            "<=" => Operator::LessOrEqual,
            "==" => Operator::Equal,
            "!=" => Operator::NotEqual,
            other => Operator::Unknown(other.to_string()),
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            Operator::GreaterThan => ">",
            Operator::GreaterOrEqual => ">=",
            Operator::LessThan => "<",
            Operator::LessOrEqual => "<=",
            Operator::Equal => "==",
            Operator::NotEqual => "!=",
            Operator::Unknown(s) => s,
        }
    }

    /// Compare `value` against `threshold`
    ///
    /// An absent value only satisfies `!=`.
    pub fn evaluate(&self, value: Option<f64>, threshold: f64) -> bool {
        let Some(value) = value else {
            return matches!(self, Operator::NotEqual);
        };

        match self {
            Operator::GreaterThan => value > threshold,
            Operator::GreaterOrEqual => value >= threshold,
            Operator::LessThan => value < threshold,
            Operator::LessOrEqual => value <= threshold,
            Operator::Equal => value == threshold,
            Operator::NotEqual => value != threshold,
            Operator::Unknown(_) => false,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl Serialize for Operator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.symbol())
    }
}

impl<'de> Deserialize<'de> for Operator {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let symbol = String::deserialize(deserializer)?;
        Ok(Operator::parse(&symbol))
    }
}

/// Notification channel bound to a rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NotificationAction {
    Email {
        recipients: Vec<String>,
    },
    Sms {
        recipients: Vec<String>,
    },
    Webhook {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        auth: Option<String>,
    },
    Slack {
        #[serde(rename = "webhookUrl")]
        webhook_url: String,
    },
}

impl NotificationAction {
    pub fn email<I, S>(recipients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        NotificationAction::Email {
            recipients: recipients.into_iter().map(Into::into).collect(),
        }
    }

    pub fn sms<I, S>(recipients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        NotificationAction::Sms {
            recipients: recipients.into_iter().map(Into::into).collect(),
        }
    }

    /// Channel name used in logs and errors
    pub fn channel(&self) -> &'static str {
        match self {
            NotificationAction::Email { .. } => "email",
            NotificationAction::Sms { .. } => "sms",
            NotificationAction::Webhook { .. } => "webhook",
            NotificationAction::Slack { .. } => "slack",
        }
    }

    fn validate(&self) -> Result<(), RuleError> {
        match self {
            NotificationAction::Email { recipients } | NotificationAction::Sms { recipients } => {
                if recipients.iter().all(|r| r.trim().is_empty()) {
                    return Err(RuleError::NoRecipients(self.channel()));
                }
            }
            NotificationAction::Webhook { url, .. } => {
                if url.trim().is_empty() {
                    return Err(RuleError::MissingUrl(self.channel()));
                }
            }
            NotificationAction::Slack { webhook_url } => {
                if webhook_url.trim().is_empty() {
                    return Err(RuleError::MissingUrl(self.channel()));
                }
            }
        }
        Ok(())
    }
}

/// Throttling options supplied when defining a rule
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuleOptions {
    pub enabled: bool,
    #[serde(alias = "cooldown")]
    pub cooldown_millis: i64,
    pub max_triggers: u32,
}

impl Default for RuleOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            cooldown_millis: DEFAULT_COOLDOWN_MILLIS,
            max_triggers: DEFAULT_MAX_TRIGGERS,
        }
    }
}

/// Partial rule update; absent fields are left as they are
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleUpdate {
    pub condition: Option<AlertCondition>,
    pub actions: Option<Vec<NotificationAction>>,
    pub enabled: Option<bool>,
    #[serde(alias = "cooldown")]
    pub cooldown_millis: Option<i64>,
    pub max_triggers: Option<u32>,
}

/// Rejected rule definitions
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuleError {
    #[error("Rule name is required")]
    MissingName,

    #[error("Condition metric path is required")]
    MissingMetricPath,

    #[error("Threshold must be a finite number, got {0}")]
    InvalidThreshold(f64),

    #[error("Time window must be positive, got {0}")]
    InvalidTimeWindow(i64),

    #[error("Cooldown must not be negative, got {0}")]
    NegativeCooldown(i64),

    #[error("{0} action requires at least one recipient")]
    NoRecipients(&'static str),

    #[error("{0} action requires a URL")]
    MissingUrl(&'static str),
}

fn default_enabled() -> bool {
    true
}

fn default_cooldown() -> i64 {
    DEFAULT_COOLDOWN_MILLIS
}

fn default_max_triggers() -> u32 {
    DEFAULT_MAX_TRIGGERS
}
