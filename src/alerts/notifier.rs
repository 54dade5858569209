//! Notification delivery for fired alerts

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

use super::config::{AlertRule, NotificationAction};
use super::record::{AlertRecord, Severity};

/// Default transport timeout for every outbound call
pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Capability for delivering a message over one of the supported channels
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_email(
        &self,
        recipients: &[String],
        subject: &str,
        body: &str,
    ) -> Result<(), NotifierError>;

    async fn send_sms(&self, recipients: &[String], body: &str) -> Result<(), NotifierError>;

    /// POST `payload` as JSON, with a bearer token when `auth_token` is set
    async fn send_webhook(
        &self,
        url: &str,
        payload: &serde_json::Value,
        auth_token: Option<&str>,
    ) -> Result<(), NotifierError>;

    /// POST a chat-formatted payload to an incoming-webhook URL
    async fn send_chat_message(
        &self,
        webhook_url: &str,
        payload: &serde_json::Value,
    ) -> Result<(), NotifierError>;
}

/// Endpoints used by [`HttpNotifier`]
#[derive(Debug, Clone, Default)]
pub struct NotifierConfig {
    /// Gateway accepting `{to, subject, body}`; unset means log only
    pub email_gateway_url: Option<String>,
    /// Gateway accepting `{to, message}`; unset means log only
    pub sms_gateway_url: Option<String>,
    /// Bearer key sent to both gateways
    pub gateway_api_key: Option<String>,
    pub timeout: Option<Duration>,
}

/// Notifier that delivers everything over HTTP
pub struct HttpNotifier {
    client: reqwest::Client,
    config: NotifierConfig,
}

impl HttpNotifier {
    pub fn new(config: NotifierConfig) -> Result<Self, NotifierError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout.unwrap_or(DEFAULT_NOTIFY_TIMEOUT))
            .build()
            .map_err(|e| NotifierError::Http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    async fn post_json(
        &self,
        url: &str,
        payload: &serde_json::Value,
        bearer: Option<&str>,
    ) -> Result<(), NotifierError> {
        let mut request = self.client.post(url).json(payload);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| NotifierError::Http(format!("Request to {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(NotifierError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        tracing::debug!(url = %url, "Notification delivered");
        Ok(())
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn send_email(
        &self,
        recipients: &[String],
        subject: &str,
        body: &str,
    ) -> Result<(), NotifierError> {
        let Some(gateway) = self.config.email_gateway_url.as_deref() else {
            tracing::info!(
                recipients = ?recipients,
                subject = %subject,
                "No email gateway configured, logging notification instead"
            );
            return Ok(());
        };

        let payload = json!({
            "to": recipients,
            "subject": subject,
            "body": body,
        });
        self.post_json(gateway, &payload, self.config.gateway_api_key.as_deref())
            .await
    }

    async fn send_sms(&self, recipients: &[String], body: &str) -> Result<(), NotifierError> {
        let Some(gateway) = self.config.sms_gateway_url.as_deref() else {
            tracing::info!(
                recipients = ?recipients,
                "No SMS gateway configured, logging notification instead: {}",
                body
            );
            return Ok(());
        };

        let mut failures = Vec::new();
        for phone in recipients {
            let payload = json!({ "to": phone, "message": body });
            if let Err(e) = self
                .post_json(gateway, &payload, self.config.gateway_api_key.as_deref())
                .await
            {
                tracing::warn!(phone = %phone, error = %e, "SMS delivery failed");
                failures.push(e);
            }
        }

        match failures.len() {
            0 => Ok(()),
            1 => Err(failures.remove(0)),
            _ => Err(NotifierError::Multiple(failures)),
        }
    }

    async fn send_webhook(
        &self,
        url: &str,
        payload: &serde_json::Value,
        auth_token: Option<&str>,
    ) -> Result<(), NotifierError> {
        self.post_json(url, payload, auth_token).await
    }

    async fn send_chat_message(
        &self,
        webhook_url: &str,
        payload: &serde_json::Value,
    ) -> Result<(), NotifierError> {
        self.post_json(webhook_url, payload, None).await
    }
}

impl NotificationAction {
    /// Deliver `record` for `rule` over this action's channel
    pub async fn dispatch(
        &self,
        notifier: &dyn Notifier,
        rule: &AlertRule,
        record: &AlertRecord,
    ) -> Result<(), DispatchError> {
        let result = match self {
            NotificationAction::Email { recipients } => {
                notifier
                    .send_email(recipients, &email_subject(rule, record), &email_body(rule, record))
                    .await
            }
            NotificationAction::Sms { recipients } => {
                notifier.send_sms(recipients, &sms_body(rule, record)).await
            }
            NotificationAction::Webhook { url, auth } => {
                notifier
                    .send_webhook(url, &webhook_payload(rule, record), auth.as_deref())
                    .await
            }
            NotificationAction::Slack { webhook_url } => {
                notifier
                    .send_chat_message(webhook_url, &slack_payload(rule, record))
                    .await
            }
        };

        result.map_err(|source| DispatchError {
            channel: self.channel(),
            source,
        })
    }
}

fn fired_at(record: &AlertRecord) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp_millis(record.timestamp)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| record.timestamp.to_string())
}

fn severity_label(severity: Severity) -> String {
    severity.as_str().to_uppercase()
}

pub(crate) fn email_subject(rule: &AlertRule, record: &AlertRecord) -> String {
    format!("[{}] Alert: {}", severity_label(record.severity), rule.name)
}

pub(crate) fn email_body(rule: &AlertRule, record: &AlertRecord) -> String {
    let data = serde_json::to_string_pretty(&record.data).unwrap_or_else(|_| record.data.to_string());
    format!(
        "Alert rule '{}' fired.\n\n\
         Alert ID: {}\n\
         Severity: {}\n\
         Condition: {} {} {}\n\
         Time: {}\n\n\
         Data:\n{}\n",
        rule.name,
        record.id,
        record.severity,
        rule.condition.metric_path,
        rule.condition.operator,
        rule.condition.threshold,
        fired_at(record),
        data
    )
}

pub(crate) fn sms_body(rule: &AlertRule, record: &AlertRecord) -> String {
    format!(
        "[{}] {} alert fired at {}",
        severity_label(record.severity),
        rule.name,
        fired_at(record)
    )
}

pub(crate) fn webhook_payload(rule: &AlertRule, record: &AlertRecord) -> serde_json::Value {
    json!({
        "alert": record,
        "rule": {
            "name": rule.name,
            "condition": rule.condition,
        },
        "timestamp": fired_at(record),
    })
}

pub(crate) fn slack_payload(rule: &AlertRule, record: &AlertRecord) -> serde_json::Value {
    let color = match record.severity {
        Severity::Critical | Severity::High => "danger",
        Severity::Medium => "warning",
        Severity::Low => "good",
    };

    json!({
        "text": format!("Alert: {}", rule.name),
        "attachments": [{
            "color": color,
            "fields": [
                { "title": "Rule", "value": rule.name, "short": true },
                { "title": "Severity", "value": record.severity.as_str(), "short": true },
                { "title": "Time", "value": fired_at(record), "short": false },
            ],
        }],
    })
}

/// Notifier errors
#[derive(Debug, thiserror::Error)]
pub enum NotifierError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("Multiple notification failures: {0:?}")]
    Multiple(Vec<NotifierError>),
}

/// A single action that failed during a fire
#[derive(Debug, thiserror::Error)]
#[error("{channel} dispatch failed: {source}")]
pub struct DispatchError {
    pub channel: &'static str,
    #[source]
    pub source: NotifierError,
}
