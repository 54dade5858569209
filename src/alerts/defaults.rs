//! Built-in operational alert rules

use super::config::{AlertCondition, AlertRule, NotificationAction, Operator, RuleError};
use super::engine::AlertEngine;

const MINUTE_MILLIS: i64 = 60_000;

/// Where the built-in rules send their notifications
///
/// A channel with no configured destination is left out of the rule's
/// actions; the rule still fires and is recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefaultTargets {
    pub email_recipients: Vec<String>,
    pub sms_recipients: Vec<String>,
    pub slack_webhook_url: Option<String>,
}

impl DefaultTargets {
    fn email(&self) -> Option<NotificationAction> {
        (!self.email_recipients.is_empty())
            .then(|| NotificationAction::email(self.email_recipients.iter().cloned()))
    }

    fn sms(&self) -> Option<NotificationAction> {
        (!self.sms_recipients.is_empty())
            .then(|| NotificationAction::sms(self.sms_recipients.iter().cloned()))
    }

    fn slack(&self) -> Option<NotificationAction> {
        self.slack_webhook_url
            .as_ref()
            .filter(|url| !url.trim().is_empty())
            .map(|url| NotificationAction::Slack {
                webhook_url: url.clone(),
            })
    }
}

/// The three built-in rules
///
/// - `high_error_rate`: error rate above 5% over 5 minutes
/// - `high_response_time`: response time above 2000ms over 5 minutes
/// - `database_connection_error`: any database connection error in 1 minute
pub fn default_rules(targets: &DefaultTargets) -> Vec<AlertRule> {
    vec![
        AlertRule::new(
            "high_error_rate",
            AlertCondition::new("error_rate", Operator::GreaterThan, 5.0)
                .with_time_window(5 * MINUTE_MILLIS),
        )
        .with_actions([targets.email(), targets.slack()].into_iter().flatten().collect())
        .with_cooldown(10 * MINUTE_MILLIS)
        .with_max_triggers(5),
        AlertRule::new(
            "high_response_time",
            AlertCondition::new("response_time", Operator::GreaterThan, 2000.0)
                .with_time_window(5 * MINUTE_MILLIS),
        )
        .with_actions(targets.email().into_iter().collect())
        .with_cooldown(5 * MINUTE_MILLIS)
        .with_max_triggers(10),
        AlertRule::new(
            "database_connection_error",
            AlertCondition::new("database_errors", Operator::GreaterThan, 0.0)
                .with_time_window(MINUTE_MILLIS),
        )
        .with_actions([targets.email(), targets.sms()].into_iter().flatten().collect())
        .with_cooldown(5 * MINUTE_MILLIS)
        .with_max_triggers(3),
    ]
}

impl AlertEngine {
    /// Define the built-in rules, replacing any rules with the same names
    pub fn initialize_defaults(&self, targets: &DefaultTargets) -> Result<Vec<String>, RuleError> {
        let mut names = Vec::new();
        for rule in default_rules(targets) {
            names.push(rule.name.clone());
            self.define_rule(rule)?;
        }
        tracing::info!(rules = ?names, "Default alert rules initialized");
        Ok(names)
    }
}
