use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    acknowledge_alert, active_alerts, alert_history, alert_stats, define_rule, delete_rule,
    health_check, initialize_defaults, list_metrics, list_rules, metric_summary, record_metrics,
    require_admin, resolve_alert, test_alert, toggle_rule, update_rule, AppState,
};
use crate::alerts::{AlertEngine, AlertWorker, DefaultTargets, EngineConfig, HttpNotifier, NotifierConfig};
use crate::metrics::{LogSink, MetricsRegistry};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub admin_token: Option<String>,
    pub max_history: usize,
    /// Background evaluation period; 0 disables the worker
    pub eval_interval_secs: u64,
    pub seed_defaults: bool,
    pub notifier: NotifierConfig,
    pub default_targets: DefaultTargets,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            admin_token: None,
            max_history: EngineConfig::default().max_history,
            eval_interval_secs: 60,
            seed_defaults: false,
            notifier: NotifierConfig::default(),
            default_targets: DefaultTargets::default(),
        }
    }
}

/// Build the application router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Alert history
        .route("/alerts/history", get(alert_history))
        .route("/alerts/active", get(active_alerts))
        .route("/alerts/stats", get(alert_stats))
        .route("/alerts/:id/acknowledge", post(acknowledge_alert))
        .route("/alerts/:id/resolve", post(resolve_alert))
        // Rule management
        .route("/alerts/rules", get(list_rules))
        .route("/alerts/rules", post(define_rule))
        .route("/alerts/rules/:name", put(update_rule).delete(delete_rule))
        .route("/alerts/rules/:name/toggle", post(toggle_rule))
        .route("/alerts/test/:rule_name", post(test_alert))
        .route("/alerts/initialize-defaults", post(initialize_defaults))
        // Metrics
        .route("/metrics", get(list_metrics))
        .route("/metrics", post(record_metrics))
        .route("/metrics/:name", get(metric_summary))
        // Everything above requires the admin token
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            require_admin,
        ))
        // Health check
        .route("/health", get(health_check))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the HTTP server
pub async fn run_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let metrics = Arc::new(MetricsRegistry::new().with_sink(Arc::new(LogSink)));
    let notifier = Arc::new(HttpNotifier::new(config.notifier.clone())?);
    let engine = Arc::new(
        AlertEngine::new(notifier)
            .with_metrics(Arc::clone(&metrics))
            .with_config(EngineConfig {
                max_history: config.max_history,
            }),
    );

    if config.seed_defaults {
        engine.initialize_defaults(&config.default_targets)?;
    }

    if config.admin_token.is_none() {
        tracing::warn!("BEACON_ADMIN_TOKEN is not set, admin routes are open");
    }

    let state = Arc::new(AppState {
        engine: Arc::clone(&engine),
        metrics: Arc::clone(&metrics),
        admin_token: config.admin_token.clone(),
        default_targets: config.default_targets.clone(),
    });

    // Start background worker
    let worker = if config.eval_interval_secs > 0 {
        let worker = Arc::new(AlertWorker::new(
            Arc::clone(&engine),
            Arc::clone(&metrics),
            Duration::from_secs(config.eval_interval_secs),
        ));
        let handle = Arc::clone(&worker).start();
        Some((worker, handle))
    } else {
        tracing::info!("Background alert evaluation disabled");
        None
    };

    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Starting beacon server on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some((worker, handle)) = worker {
        worker.stop();
        handle.abort();
    }
    engine.dispose();

    tracing::info!("Beacon server stopped");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");

    tracing::info!("Shutdown signal received, stopping...");
}
