//! Beacon Server
//!
//! Run with: cargo run
//!
//! Environment variables:
//! - BEACON_HOST: Bind address (default: 0.0.0.0)
//! - BEACON_PORT: Port number (default: 8080)
//! - BEACON_ADMIN_TOKEN: Bearer token for admin routes (default: unset, routes open)
//! - BEACON_MAX_HISTORY: Alert records kept in memory (default: 10000)
//! - BEACON_EVAL_INTERVAL_SECS: Background rule evaluation period, 0 disables (default: 60)
//! - BEACON_SEED_DEFAULTS: Define the built-in rules at startup (default: false)
//! - RUST_LOG: Log level (default: info)
//!
//! Notification delivery:
//! - BEACON_EMAIL_GATEWAY_URL / BEACON_SMS_GATEWAY_URL: HTTP gateways (unset: log only)
//! - BEACON_GATEWAY_API_KEY: Bearer key sent to both gateways
//! - BEACON_NOTIFY_TIMEOUT_SECS: Per-request timeout (default: 10)
//!
//! Built-in rule destinations:
//! - BEACON_ALERT_EMAILS / BEACON_ALERT_PHONES: Comma-separated lists
//! - BEACON_SLACK_WEBHOOK_URL: Slack incoming webhook

use beacon::alerts::{DefaultTargets, NotifierConfig};
use beacon::api::{run_server, ServerConfig};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|v| v.parse().ok())
}

fn env_list(key: &str) -> Vec<String> {
    env_string(key)
        .map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

fn env_flag(key: &str) -> bool {
    env_string(key)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "beacon=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let defaults = ServerConfig::default();

    let notifier = NotifierConfig {
        email_gateway_url: env_string("BEACON_EMAIL_GATEWAY_URL"),
        sms_gateway_url: env_string("BEACON_SMS_GATEWAY_URL"),
        gateway_api_key: env_string("BEACON_GATEWAY_API_KEY"),
        timeout: env_parse::<u64>("BEACON_NOTIFY_TIMEOUT_SECS").map(Duration::from_secs),
    };

    let default_targets = DefaultTargets {
        email_recipients: env_list("BEACON_ALERT_EMAILS"),
        sms_recipients: env_list("BEACON_ALERT_PHONES"),
        slack_webhook_url: env_string("BEACON_SLACK_WEBHOOK_URL"),
    };

    let config = ServerConfig {
        host: env_string("BEACON_HOST").unwrap_or(defaults.host),
        port: env_parse("BEACON_PORT").unwrap_or(defaults.port),
        admin_token: env_string("BEACON_ADMIN_TOKEN"),
        max_history: env_parse("BEACON_MAX_HISTORY").unwrap_or(defaults.max_history),
        eval_interval_secs: env_parse("BEACON_EVAL_INTERVAL_SECS")
            .unwrap_or(defaults.eval_interval_secs),
        seed_defaults: env_flag("BEACON_SEED_DEFAULTS"),
        notifier,
        default_targets,
    };

    tracing::info!("Beacon configuration:");
    tracing::info!("  Host: {}:{}", config.host, config.port);
    tracing::info!("  Max history: {} alerts", config.max_history);
    tracing::info!(
        "  Evaluation interval: {} seconds",
        config.eval_interval_secs
    );
    tracing::info!(
        "  Email gateway: {}",
        config.notifier.email_gateway_url.as_deref().unwrap_or("(log only)")
    );
    tracing::info!(
        "  SMS gateway: {}",
        config.notifier.sms_gateway_url.as_deref().unwrap_or("(log only)")
    );
    tracing::info!("  Seed default rules: {}", config.seed_defaults);

    run_server(config).await
}
