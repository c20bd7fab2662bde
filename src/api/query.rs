use crate::api::{ApiError, ApiState};
use crate::controller::HealthSnapshot;
use crate::metric::MetricValue;
use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Metric value response
#[derive(Serialize)]
pub struct MetricResponse {
    pub id: String,
    pub value: MetricValue,
}

/// Indicator state response
#[derive(Serialize)]
pub struct IndicatorResponse {
    pub id: String,
    pub state: String,
}

/// Body for an explicit indicator evaluation
#[derive(Deserialize)]
pub struct EvaluateRequest {
    #[serde(default)]
    pub value: Value,
}

/// Create metrics/indicators/health router
pub fn create_query_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/metrics", get(list_metrics))
        .route("/api/metrics/:id", get(get_metric))
        .route("/api/indicators/:id", get(get_indicator))
        .route("/api/indicators/:id/evaluate", post(evaluate_indicator))
        .route("/api/health", get(health))
        .with_state(state)
}

/// GET /api/metrics - Every configured metric, N/A where not computable
async fn list_metrics(
    State(state): State<ApiState>,
) -> Result<Json<BTreeMap<String, MetricValue>>, ApiError> {
    Ok(Json(state.controller.metric_values().await?))
}

/// GET /api/metrics/:id
async fn get_metric(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<MetricResponse>, ApiError> {
    let value = state
        .controller
        .metric_value(id.clone())
        .await?
        .ok_or(ApiError::NotFound("Metric"))?;

    Ok(Json(MetricResponse { id, value }))
}

/// GET /api/indicators/:id - State for the set's bound live value
async fn get_indicator(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<IndicatorResponse>, ApiError> {
    let current = state
        .controller
        .current_state(id.clone())
        .await?
        .ok_or(ApiError::NotFound("Indicator"))?;

    Ok(Json(IndicatorResponse { id, state: current }))
}

/// POST /api/indicators/:id/evaluate - State for an explicit value
async fn evaluate_indicator(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(request): Json<EvaluateRequest>,
) -> Result<Json<IndicatorResponse>, ApiError> {
    let active = state
        .controller
        .active_state(id.clone(), request.value)
        .await?
        .ok_or(ApiError::NotFound("Indicator"))?;

    Ok(Json(IndicatorResponse { id, state: active }))
}

/// GET /api/health
async fn health(State(state): State<ApiState>) -> Result<Json<HealthSnapshot>, ApiError> {
    Ok(Json(state.controller.health().await?))
}
