use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, Request, State,
    },
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::alerts::{
    AlertCondition, AlertEngine, AlertRecord, AlertRule, AlertStats, AlertStatus, DefaultTargets,
    HistoryFilter, NotificationAction, RuleError, RuleOptions, RuleUpdate, Severity, TestOutcome,
};
use crate::metrics::{MetricSample, MetricSummary, MetricsRegistry};

/// Application state shared across handlers
pub struct AppState {
    pub engine: Arc<AlertEngine>,
    pub metrics: Arc<MetricsRegistry>,
    /// Bearer token for admin routes; `None` leaves them open
    pub admin_token: Option<String>,
    /// Destinations used when seeding the built-in rules
    pub default_targets: DefaultTargets,
}

/// Success envelope
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        data,
    })
}

fn parse_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

// ============================================================================
// Health Check
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub rules: usize,
    pub metrics: usize,
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        rules: state.engine.rule_count(),
        metrics: state.metrics.metric_names().len(),
    })
}

// ============================================================================
// Admin Guard
// ============================================================================

pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(expected) = state.admin_token.as_deref() {
        let provided = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim);

        if provided != Some(expected) {
            return Err(ApiError::Unauthorized);
        }
    }

    Ok(next.run(request).await)
}

// ============================================================================
// Metrics
// ============================================================================

#[derive(Deserialize)]
pub struct MetricInput {
    pub name: String,
    pub value: f64,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    /// Unix millis; defaults to now
    #[serde(default)]
    pub timestamp: Option<i64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
pub enum RecordMetricsRequest {
    Batch { samples: Vec<MetricInput> },
    Single(MetricInput),
}

#[derive(Serialize)]
pub struct RecordMetricsResponse {
    pub recorded: usize,
}

pub async fn record_metrics(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RecordMetricsRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<RecordMetricsResponse>>, ApiError> {
    let inputs = match parse_body(payload)? {
        RecordMetricsRequest::Batch { samples } => samples,
        RecordMetricsRequest::Single(input) => vec![input],
    };

    if let Some(bad) = inputs.iter().find(|i| i.name.trim().is_empty()) {
        return Err(ApiError::BadRequest(format!(
            "Metric name is required (value {})",
            bad.value
        )));
    }

    let recorded = inputs.len();
    for input in inputs {
        match input.timestamp {
            Some(timestamp) => state.metrics.record_sample(MetricSample {
                name: input.name,
                value: input.value,
                tags: input.tags,
                timestamp,
            }),
            None => state.metrics.record(&input.name, input.value, input.tags),
        }
    }

    Ok(ok(RecordMetricsResponse { recorded }))
}

pub async fn list_metrics(
    State(state): State<Arc<AppState>>,
) -> Json<ApiResponse<BTreeMap<String, MetricSummary>>> {
    ok(state.metrics.summarize_all())
}

pub async fn metric_summary(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<ApiResponse<MetricSummary>>, ApiError> {
    state
        .metrics
        .summarize(&name)
        .map(ok)
        .ok_or_else(|| ApiError::NotFound(format!("Metric '{}' not found", name)))
}

// ============================================================================
// Alert History
// ============================================================================

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
    pub status: Option<String>,
    pub severity: Option<String>,
}

impl HistoryQuery {
    fn into_filter(self) -> Result<HistoryFilter, ApiError> {
        let mut filter = HistoryFilter::default();
        if let Some(limit) = self.limit {
            filter.limit = limit;
        }
        if let Some(status) = self.status {
            filter.status = Some(status.parse::<AlertStatus>().map_err(ApiError::BadRequest)?);
        }
        if let Some(severity) = self.severity {
            filter.severity = Some(severity.parse::<Severity>().map_err(ApiError::BadRequest)?);
        }
        Ok(filter)
    }
}

pub async fn alert_history(
    State(state): State<Arc<AppState>>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<Vec<AlertRecord>>>, ApiError> {
    let Query(query) = query.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let filter = query.into_filter()?;
    Ok(ok(state.engine.history(filter)))
}

pub async fn active_alerts(
    State(state): State<Arc<AppState>>,
) -> Json<ApiResponse<Vec<AlertRecord>>> {
    ok(state.engine.get_active_alerts())
}

pub async fn alert_stats(State(state): State<Arc<AppState>>) -> Json<ApiResponse<AlertStats>> {
    ok(state.engine.get_alert_stats())
}

#[derive(Deserialize)]
pub struct StatusChangeRequest {
    #[serde(rename = "userId")]
    pub user_id: String,
}

#[derive(Serialize)]
pub struct StatusChangeResponse {
    pub id: String,
    pub status: AlertStatus,
}

pub async fn acknowledge_alert(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<StatusChangeRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<StatusChangeResponse>>, ApiError> {
    let request = parse_body(payload)?;
    if !state.engine.acknowledge_alert(&id, &request.user_id) {
        return Err(ApiError::NotFound(format!("Alert '{}' not found", id)));
    }
    Ok(ok(StatusChangeResponse {
        id,
        status: AlertStatus::Acknowledged,
    }))
}

pub async fn resolve_alert(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<StatusChangeRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<StatusChangeResponse>>, ApiError> {
    let request = parse_body(payload)?;
    if !state.engine.resolve_alert(&id, &request.user_id) {
        return Err(ApiError::NotFound(format!("Alert '{}' not found", id)));
    }
    Ok(ok(StatusChangeResponse {
        id,
        status: AlertStatus::Resolved,
    }))
}

// ============================================================================
// Rule Management
// ============================================================================

#[derive(Deserialize)]
pub struct DefineRuleRequest {
    pub name: String,
    pub condition: AlertCondition,
    #[serde(default)]
    pub actions: Vec<NotificationAction>,
    #[serde(default)]
    pub options: RuleOptions,
}

pub async fn define_rule(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<DefineRuleRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<AlertRule>>), ApiError> {
    let request = parse_body(payload)?;
    state
        .engine
        .define(&request.name, request.condition, request.actions, request.options)?;

    let rule = state
        .engine
        .get_rule(&request.name)
        .ok_or_else(|| ApiError::Internal(format!("Rule '{}' vanished after define", request.name)))?;
    Ok((StatusCode::CREATED, ok(rule)))
}

pub async fn list_rules(State(state): State<Arc<AppState>>) -> Json<ApiResponse<Vec<AlertRule>>> {
    ok(state.engine.list_rules())
}

pub async fn update_rule(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    payload: Result<Json<RuleUpdate>, JsonRejection>,
) -> Result<Json<ApiResponse<AlertRule>>, ApiError> {
    let update = parse_body(payload)?;
    state
        .engine
        .update_rule(&name, update)?
        .map(ok)
        .ok_or_else(|| ApiError::NotFound(format!("Alert rule '{}' not found", name)))
}

pub async fn delete_rule(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    state
        .engine
        .remove_rule(&name)
        .ok_or_else(|| ApiError::NotFound(format!("Alert rule '{}' not found", name)))?;
    Ok(ok(serde_json::json!({ "deleted": name })))
}

#[derive(Serialize)]
pub struct ToggleResponse {
    pub name: String,
    pub enabled: bool,
}

pub async fn toggle_rule(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<ApiResponse<ToggleResponse>>, ApiError> {
    let enabled = state
        .engine
        .toggle_rule(&name)
        .ok_or_else(|| ApiError::NotFound(format!("Alert rule '{}' not found", name)))?;
    Ok(ok(ToggleResponse { name, enabled }))
}

pub async fn test_alert(
    State(state): State<Arc<AppState>>,
    Path(rule_name): Path<String>,
) -> Result<Json<ApiResponse<TestOutcome>>, ApiError> {
    let outcome = state.engine.test_alert(&rule_name).await;
    if !outcome.success {
        return Err(ApiError::NotFound(
            outcome
                .error
                .unwrap_or_else(|| format!("Alert rule '{}' not found", rule_name)),
        ));
    }
    Ok(ok(outcome))
}

#[derive(Serialize)]
pub struct InitializeDefaultsResponse {
    pub rules: Vec<String>,
}

pub async fn initialize_defaults(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<InitializeDefaultsResponse>>, ApiError> {
    let rules = state.engine.initialize_defaults(&state.default_targets)?;
    Ok(ok(InitializeDefaultsResponse { rules }))
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized,
    NotFound(String),
    Internal(String),
}

impl From<RuleError> for ApiError {
    fn from(err: RuleError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Admin credentials required".to_string(),
            ),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({
            "success": false,
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
