use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::alerts::{Alert, AlertStoreStats, Severity};
use crate::engine::{ExecutionOutcome, ExecutionResult, Scheduler, StartError, StatsSnapshot};
use crate::queries::QueryDefinition;

const DEFAULT_ALERT_LIMIT: usize = 100;

/// Application state shared across handlers
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
}

// ============================================================================
// Health Check
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub connected: bool,
    pub monitoring: bool,
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let connected = state.scheduler.source().is_connected();
    Json(HealthResponse {
        status: if connected { "healthy" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        connected,
        monitoring: state.scheduler.is_running(),
    })
}

// ============================================================================
// Alerts
// ============================================================================

#[derive(Deserialize)]
pub struct AlertsQuery {
    pub limit: Option<usize>,
    pub severity: Option<String>,
    pub since: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
pub struct AlertView {
    #[serde(flatten)]
    pub alert: Alert,
    pub color: &'static str,
    pub age: String,
}

impl AlertView {
    fn new(alert: Alert, now: DateTime<Utc>) -> Self {
        Self {
            color: alert.severity.color(),
            age: alert.age_text(now),
            alert,
        }
    }
}

#[derive(Serialize)]
pub struct AlertsResponse {
    pub alerts: Vec<AlertView>,
    pub count: usize,
}

/// Newest first, optionally filtered by severity and creation time
pub async fn list_alerts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AlertsQuery>,
) -> Result<Json<AlertsResponse>, ApiError> {
    let store = state.scheduler.store();
    let limit = params.limit.unwrap_or(DEFAULT_ALERT_LIMIT);

    let severity = params
        .severity
        .as_deref()
        .map(str::parse::<Severity>)
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let alerts: Vec<Alert> = match (severity, params.since) {
        (_, Some(since)) => store
            .alerts_since(since)
            .into_iter()
            .filter(|a| severity.map_or(true, |s| a.severity == s))
            .take(limit)
            .collect(),
        (Some(severity), None) => store.alerts_by_severity(severity, limit),
        (None, None) => store.recent_alerts(limit),
    };

    let now = Utc::now();
    let alerts: Vec<AlertView> = alerts.into_iter().map(|a| AlertView::new(a, now)).collect();

    Ok(Json(AlertsResponse {
        count: alerts.len(),
        alerts,
    }))
}

pub async fn clear_alerts(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let store = state.scheduler.store();
    let cleared = store.alert_count();
    store.clear();
    tracing::info!(cleared, "Alerts cleared");

    Json(serde_json::json!({ "cleared": cleared }))
}

pub async fn alert_stats(State(state): State<Arc<AppState>>) -> Json<AlertStoreStats> {
    Json(state.scheduler.store().stats())
}

// ============================================================================
// Queries
// ============================================================================

#[derive(Serialize)]
pub struct QueriesResponse {
    pub queries: Vec<QueryDefinition>,
    pub enabled: usize,
}

pub async fn list_queries(State(state): State<Arc<AppState>>) -> Json<QueriesResponse> {
    let registry = state.scheduler.registry();
    Json(QueriesResponse {
        queries: registry.list_all(),
        enabled: registry.enabled_count(),
    })
}

#[derive(Deserialize)]
pub struct SetEnabledRequest {
    pub enabled: bool,
}

pub async fn set_query_enabled(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<SetEnabledRequest>,
) -> Result<Json<QueryDefinition>, ApiError> {
    let registry = state.scheduler.registry();
    if !registry.set_enabled(&id, request.enabled) {
        return Err(ApiError::NotFound(format!("Query '{}' not found", id)));
    }

    registry
        .get(&id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Query '{}' not found", id)))
}

// ============================================================================
// Monitoring
// ============================================================================

#[derive(Serialize)]
pub struct StatsResponse {
    pub running: bool,
    pub connected: bool,
    pub interval_ms: u64,
    pub max_concurrent_queries: usize,
    pub in_flight: Vec<String>,
    pub execution: StatsSnapshot,
}

pub async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let scheduler = &state.scheduler;
    Json(StatsResponse {
        running: scheduler.is_running(),
        connected: scheduler.source().is_connected(),
        interval_ms: scheduler.interval().as_millis() as u64,
        max_concurrent_queries: scheduler.max_concurrent_queries(),
        in_flight: scheduler.in_flight(),
        execution: scheduler.stats().snapshot(),
    })
}

#[derive(Serialize)]
pub struct MonitoringResponse {
    pub running: bool,
}

pub async fn start_monitoring(
    State(state): State<Arc<AppState>>,
) -> Result<Json<MonitoringResponse>, ApiError> {
    state.scheduler.start()?;
    Ok(Json(MonitoringResponse { running: true }))
}

pub async fn stop_monitoring(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let stopped = state.scheduler.stop();
    Json(serde_json::json!({ "running": false, "stopped": stopped }))
}

#[derive(Serialize)]
pub struct RunSummary {
    pub query_id: String,
    pub outcome: ExecutionOutcome,
    pub error: Option<String>,
    pub rows: usize,
    pub elapsed_ms: u64,
}

impl From<ExecutionResult> for RunSummary {
    fn from(result: ExecutionResult) -> Self {
        Self {
            rows: result.data.row_count(),
            elapsed_ms: result.elapsed.as_millis() as u64,
            query_id: result.query_id,
            outcome: result.outcome,
            error: result.error,
        }
    }
}

#[derive(Serialize)]
pub struct RunResponse {
    pub results: Vec<RunSummary>,
}

/// Execute every enabled query once, outside the timer
pub async fn run_now(State(state): State<Arc<AppState>>) -> Result<Json<RunResponse>, ApiError> {
    if !state.scheduler.source().is_connected() {
        return Err(StartError::NotConnected.into());
    }

    let mut results: Vec<RunSummary> = state
        .scheduler
        .execute_all_now()
        .await
        .into_iter()
        .map(RunSummary::from)
        .collect();
    results.sort_by(|a, b| a.query_id.cmp(&b.query_id));

    Ok(Json(RunResponse { results }))
}

pub async fn reconnect_source(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let source = Arc::clone(state.scheduler.source());
    tokio::task::spawn_blocking(move || source.reconnect())
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(|e| ApiError::Unavailable(e.to_string()))?;

    Ok(Json(serde_json::json!({ "connected": true })))
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Unavailable(String),
    Internal(String),
}

impl From<StartError> for ApiError {
    fn from(e: StartError) -> Self {
        match e {
            StartError::AlreadyRunning => ApiError::Conflict(e.to_string()),
            StartError::NotConnected => ApiError::Unavailable(e.to_string()),
            StartError::NoQueries => ApiError::BadRequest(e.to_string()),
            StartError::NoRuntime => ApiError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
