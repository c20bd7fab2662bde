// HTTP diagnostics and live update APIs

pub mod query;
pub mod websocket;

use crate::controller::ControllerHandle;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Router,
};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tracing::error;

pub use query::create_query_router;
pub use websocket::create_ws_router;

/// Shared state for all API routes
#[derive(Clone)]
pub struct ApiState {
    pub controller: ControllerHandle,
}

/// Full API router with permissive CORS for the browser dashboard
pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .merge(create_query_router(state.clone()))
        .merge(create_ws_router(state))
        .layer(CorsLayer::permissive())
}

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// API error types
#[derive(Debug)]
pub enum ApiError {
    NotFound(&'static str),
    /// Controller task is gone
    Unavailable(anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Unavailable(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ApiError::NotFound(what) => (StatusCode::NOT_FOUND, format!("{} not found", what)),
            ApiError::Unavailable(e) => {
                error!(error = %e, "Controller unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Controller unavailable".to_string(),
                )
            }
        };

        (status, Json(ErrorResponse { error: error_message })).into_response()
    }
}
